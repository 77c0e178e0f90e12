//! Error types for channel configuration.

use crate::option::ValueKind;
use std::borrow::Cow;
use std::fmt;
use std::io;
use thiserror::Error;

/// Option store errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// Value payload does not match the kind the option is declared with
    #[error("option {option} expects a {expected} value, got {actual}")]
    TypeMismatch {
        /// Option name
        option: &'static str,
        /// Kind declared by the option
        expected: ValueKind,
        /// Kind of the rejected value
        actual: ValueKind,
    },

    /// Value rejected by the validation hook
    #[error("invalid value for option {option}: {reason}")]
    InvalidValue {
        /// Option name
        option: &'static str,
        /// Why the value was rejected
        reason: Cow<'static, str>,
    },
}

/// One step of the fixed apply sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApplyStep {
    /// Reuse-address flag
    ReuseAddress,
    /// Allocator-tier send buffer size
    SendBufferSize,
    /// Linger on close
    Linger,
    /// Protocol-tier receive window
    ProtocolReceiveBufferSize,
    /// Protocol-tier send window
    ProtocolSendBufferSize,
    /// System-tier receive buffer
    SystemReceiveBufferSize,
    /// System-tier send buffer
    SystemSendBufferSize,
}

impl ApplyStep {
    /// All steps in the order `apply` executes them
    pub const SEQUENCE: [ApplyStep; 7] = [
        ApplyStep::ReuseAddress,
        ApplyStep::SendBufferSize,
        ApplyStep::Linger,
        ApplyStep::ProtocolReceiveBufferSize,
        ApplyStep::ProtocolSendBufferSize,
        ApplyStep::SystemReceiveBufferSize,
        ApplyStep::SystemSendBufferSize,
    ];

    /// Short name used in logs and error messages
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReuseAddress => "reuse-address",
            Self::SendBufferSize => "send-buffer-size",
            Self::Linger => "linger",
            Self::ProtocolReceiveBufferSize => "protocol-receive-buffer-size",
            Self::ProtocolSendBufferSize => "protocol-send-buffer-size",
            Self::SystemReceiveBufferSize => "system-receive-buffer-size",
            Self::SystemSendBufferSize => "system-send-buffer-size",
        }
    }
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while pushing a config onto a socket handle
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A native socket call failed; the remaining steps were skipped
    #[error("failed to apply {step}: {source}")]
    Io {
        /// Step that failed
        step: ApplyStep,
        /// Error returned by the socket handle, unchanged
        #[source]
        source: io::Error,
    },

    /// The config was already applied once
    #[error("channel config has already been applied")]
    AlreadyApplied,
}

impl ApplyError {
    /// Step that failed, if the failure came from the socket
    #[must_use]
    pub fn step(&self) -> Option<ApplyStep> {
        match self {
            Self::Io { step, .. } => Some(*step),
            Self::AlreadyApplied => None,
        }
    }

    /// Underlying socket error, if any
    #[must_use]
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::AlreadyApplied => None,
        }
    }
}

/// Channel construction and operation errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Config could not be applied to the socket
    #[error("channel construction failed: {0}")]
    Apply(#[from] ApplyError),

    /// Settings could not be loaded into the channel config
    #[error("channel settings rejected: {0}")]
    Settings(#[from] SettingsError),
}

/// Errors loading or applying channel settings files
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read or written
    #[error("settings I/O error: {0}")]
    Io(#[from] io::Error),

    /// Settings file is not valid TOML for this schema
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings could not be encoded
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A setting was rejected by the option store
    #[error("setting rejected: {0}")]
    Option(#[from] OptionError),

    /// No store in the chain supports the option
    #[error("unsupported option: {0}")]
    Unsupported(&'static str),
}
