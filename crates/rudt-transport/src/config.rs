//! Transport channel configuration.
//!
//! [`TransportChannelConfig`] holds the mutable per-channel state (three
//! buffer-size tiers, backlog, linger, reuse-address) and exposes it through
//! typed accessors and the generic [`OptionStore`] contract. Keys outside the
//! closed [`TransportOption`] set are delegated to the host's base store.
//!
//! [`TransportChannelConfig::apply`] pushes the socket-relevant subset onto a
//! [`SocketHandle`] exactly once, at channel construction. Later writes only
//! change the in-memory values; they never reach an already-open socket.

use crate::error::{ApplyError, ApplyStep, OptionError};
use crate::option::{ChannelOption, DefaultChannelConfig, OptionStore, OptionValue, ValueKind};
use crate::socket::{NativeOption, SocketHandle};
use crate::{KIB, MIB};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use tracing::{debug, trace, warn};

/// Default protocol-tier window size (10 MiB)
pub const DEFAULT_PROTOCOL_BUFFER_SIZE: usize = 10 * MIB;

/// Default system-tier buffer size (1 MiB)
pub const DEFAULT_SYSTEM_BUFFER_SIZE: usize = MIB;

/// Default allocator-tier buffer size (128 KiB)
pub const DEFAULT_ALLOCATOR_BUFFER_SIZE: usize = 128 * KIB;

/// Default accept backlog
pub const DEFAULT_BACKLOG: usize = 64;

/// Receive window inside the transport protocol
pub const PROTOCOL_RECEIVE_BUFFER_SIZE: ChannelOption =
    ChannelOption::new("PROTOCOL_RECEIVE_BUFFER_SIZE", ValueKind::Size);

/// Send window inside the transport protocol
pub const PROTOCOL_SEND_BUFFER_SIZE: ChannelOption =
    ChannelOption::new("PROTOCOL_SEND_BUFFER_SIZE", ValueKind::Size);

/// OS receive buffer requested for the underlying UDP socket
pub const SYSTEM_RECEIVE_BUFFER_SIZE: ChannelOption =
    ChannelOption::new("SYSTEM_RECEIVE_BUFFER_SIZE", ValueKind::Size);

/// OS send buffer requested for the underlying UDP socket
pub const SYSTEM_SEND_BUFFER_SIZE: ChannelOption =
    ChannelOption::new("SYSTEM_SEND_BUFFER_SIZE", ValueKind::Size);

/// Which layer a recognized key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionFamily {
    /// Framework socket keys (allocator tier, reuse-address, linger, backlog)
    Host,
    /// Transport buffer tiers, applied only to the native socket
    Native,
}

/// The closed set of keys the transport config handles itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportOption {
    /// Protocol-tier receive window
    ProtocolReceiveBufferSize,
    /// Protocol-tier send window
    ProtocolSendBufferSize,
    /// System-tier receive buffer
    SystemReceiveBufferSize,
    /// System-tier send buffer
    SystemSendBufferSize,
    /// Allocator-tier receive size (`SO_RCVBUF`)
    ReceiveBufferSize,
    /// Allocator-tier send size (`SO_SNDBUF`)
    SendBufferSize,
    /// `SO_REUSEADDR`
    ReuseAddress,
    /// `SO_LINGER`
    Linger,
    /// `SO_BACKLOG`
    Backlog,
}

impl TransportOption {
    /// Every recognized key
    pub const ALL: [TransportOption; 9] = [
        TransportOption::ProtocolReceiveBufferSize,
        TransportOption::ProtocolSendBufferSize,
        TransportOption::SystemReceiveBufferSize,
        TransportOption::SystemSendBufferSize,
        TransportOption::ReceiveBufferSize,
        TransportOption::SendBufferSize,
        TransportOption::ReuseAddress,
        TransportOption::Linger,
        TransportOption::Backlog,
    ];

    /// Option key addressed by this variant
    #[must_use]
    pub const fn key(self) -> ChannelOption {
        match self {
            Self::ProtocolReceiveBufferSize => PROTOCOL_RECEIVE_BUFFER_SIZE,
            Self::ProtocolSendBufferSize => PROTOCOL_SEND_BUFFER_SIZE,
            Self::SystemReceiveBufferSize => SYSTEM_RECEIVE_BUFFER_SIZE,
            Self::SystemSendBufferSize => SYSTEM_SEND_BUFFER_SIZE,
            Self::ReceiveBufferSize => ChannelOption::SO_RCVBUF,
            Self::SendBufferSize => ChannelOption::SO_SNDBUF,
            Self::ReuseAddress => ChannelOption::SO_REUSEADDR,
            Self::Linger => ChannelOption::SO_LINGER,
            Self::Backlog => ChannelOption::SO_BACKLOG,
        }
    }

    /// Recognize a key, `None` for anything the base store should handle
    #[must_use]
    pub fn from_key(key: &ChannelOption) -> Option<Self> {
        Self::ALL.into_iter().find(|option| option.key() == *key)
    }

    /// Layer this key belongs to
    #[must_use]
    pub const fn family(self) -> OptionFamily {
        match self {
            Self::ProtocolReceiveBufferSize
            | Self::ProtocolSendBufferSize
            | Self::SystemReceiveBufferSize
            | Self::SystemSendBufferSize => OptionFamily::Native,
            Self::ReceiveBufferSize
            | Self::SendBufferSize
            | Self::ReuseAddress
            | Self::Linger
            | Self::Backlog => OptionFamily::Host,
        }
    }
}

/// Per-channel transport configuration.
///
/// Every field is an independent atomic cell. Single-field reads and writes
/// are atomic; nothing is promised across fields.
#[derive(Debug)]
pub struct TransportChannelConfig<B = DefaultChannelConfig> {
    base: B,

    protocol_receive_buffer_size: AtomicUsize,
    protocol_send_buffer_size: AtomicUsize,

    system_receive_buffer_size: AtomicUsize,
    system_send_buffer_size: AtomicUsize,

    allocator_receive_buffer_size: AtomicUsize,
    allocator_send_buffer_size: AtomicUsize,

    backlog: AtomicUsize,
    so_linger: AtomicI32,
    reuse_address: AtomicBool,

    applied: AtomicBool,
}

impl TransportChannelConfig {
    /// Create a config over the default base store and, if `apply` is set,
    /// push it onto `socket` before returning.
    ///
    /// # Errors
    /// Returns [`ApplyError`] if any socket call fails; the config is dropped
    pub fn new<S: SocketHandle + ?Sized>(socket: &S, apply: bool) -> Result<Self, ApplyError> {
        Self::with_base(DefaultChannelConfig::new(), socket, apply)
    }

    /// Create a config with defaults that is not bound to any socket
    #[must_use]
    pub fn detached() -> Self {
        Self::detached_with_base(DefaultChannelConfig::new())
    }
}

impl<B: OptionStore> TransportChannelConfig<B> {
    /// Create a config over `base` and optionally apply it to `socket`.
    ///
    /// # Errors
    /// Returns [`ApplyError`] if any socket call fails; the config is dropped
    pub fn with_base<S: SocketHandle + ?Sized>(
        base: B,
        socket: &S,
        apply: bool,
    ) -> Result<Self, ApplyError> {
        let config = Self::detached_with_base(base);
        if apply {
            config.apply(socket)?;
        }
        Ok(config)
    }

    /// Create a config over `base` that is not bound to any socket
    #[must_use]
    pub fn detached_with_base(base: B) -> Self {
        Self {
            base,
            protocol_receive_buffer_size: AtomicUsize::new(DEFAULT_PROTOCOL_BUFFER_SIZE),
            protocol_send_buffer_size: AtomicUsize::new(DEFAULT_PROTOCOL_BUFFER_SIZE),
            system_receive_buffer_size: AtomicUsize::new(DEFAULT_SYSTEM_BUFFER_SIZE),
            system_send_buffer_size: AtomicUsize::new(DEFAULT_SYSTEM_BUFFER_SIZE),
            allocator_receive_buffer_size: AtomicUsize::new(DEFAULT_ALLOCATOR_BUFFER_SIZE),
            allocator_send_buffer_size: AtomicUsize::new(DEFAULT_ALLOCATOR_BUFFER_SIZE),
            backlog: AtomicUsize::new(DEFAULT_BACKLOG),
            so_linger: AtomicI32::new(0),
            reuse_address: AtomicBool::new(true),
            applied: AtomicBool::new(false),
        }
    }

    /// Base store receiving every key this config does not recognize
    pub fn base(&self) -> &B {
        &self.base
    }

    /// Push the in-memory state onto `socket`.
    ///
    /// Runs, in order: reuse-address, allocator send size, linger, the two
    /// protocol-tier windows, the two system-tier buffers. The first failing
    /// call aborts the sequence. At most one apply runs per config, whether it
    /// succeeds or not.
    ///
    /// # Errors
    /// - [`ApplyError::AlreadyApplied`] on every call after the first
    /// - [`ApplyError::Io`] with the failing step and the socket error unchanged
    pub fn apply<S: SocketHandle + ?Sized>(&self, socket: &S) -> Result<(), ApplyError> {
        if self.applied.swap(true, Ordering::AcqRel) {
            return Err(ApplyError::AlreadyApplied);
        }

        let linger = self.so_linger();
        let result = step(ApplyStep::ReuseAddress, || {
            socket.set_reuse_address(self.is_reuse_address())
        })
        .and_then(|()| {
            step(ApplyStep::SendBufferSize, || {
                socket.set_send_buffer_size(self.send_buffer_size())
            })
        })
        .and_then(|()| {
            step(ApplyStep::Linger, || match u32::try_from(linger) {
                Ok(seconds) if seconds > 0 => socket.set_so_linger(true, seconds),
                _ => socket.set_so_linger(false, 0),
            })
        })
        .and_then(|()| {
            step(ApplyStep::ProtocolReceiveBufferSize, || {
                socket.set_option(
                    NativeOption::ProtocolReceiveBufferSize,
                    self.protocol_receive_buffer_size(),
                )
            })
        })
        .and_then(|()| {
            step(ApplyStep::ProtocolSendBufferSize, || {
                socket.set_option(
                    NativeOption::ProtocolSendBufferSize,
                    self.protocol_send_buffer_size(),
                )
            })
        })
        .and_then(|()| {
            step(ApplyStep::SystemReceiveBufferSize, || {
                socket.set_option(
                    NativeOption::SystemReceiveBufferSize,
                    self.system_receive_buffer_size(),
                )
            })
        })
        .and_then(|()| {
            step(ApplyStep::SystemSendBufferSize, || {
                socket.set_option(
                    NativeOption::SystemSendBufferSize,
                    self.system_send_buffer_size(),
                )
            })
        });

        if let Err(ref e) = result {
            warn!("Channel config apply aborted: {}", e);
        } else {
            debug!("Channel config applied");
        }
        result
    }

    /// Whether [`apply`](Self::apply) has been attempted
    pub fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }

    /// Protocol-tier receive window in bytes
    pub fn protocol_receive_buffer_size(&self) -> usize {
        self.protocol_receive_buffer_size.load(Ordering::Acquire)
    }

    /// Set the protocol-tier receive window
    pub fn set_protocol_receive_buffer_size(&self, bytes: usize) {
        self.protocol_receive_buffer_size.store(bytes, Ordering::Release);
    }

    /// Protocol-tier send window in bytes
    pub fn protocol_send_buffer_size(&self) -> usize {
        self.protocol_send_buffer_size.load(Ordering::Acquire)
    }

    /// Set the protocol-tier send window
    pub fn set_protocol_send_buffer_size(&self, bytes: usize) {
        self.protocol_send_buffer_size.store(bytes, Ordering::Release);
    }

    /// System-tier receive buffer in bytes
    pub fn system_receive_buffer_size(&self) -> usize {
        self.system_receive_buffer_size.load(Ordering::Acquire)
    }

    /// Set the system-tier receive buffer
    pub fn set_system_receive_buffer_size(&self, bytes: usize) {
        self.system_receive_buffer_size.store(bytes, Ordering::Release);
    }

    /// System-tier send buffer in bytes
    pub fn system_send_buffer_size(&self) -> usize {
        self.system_send_buffer_size.load(Ordering::Acquire)
    }

    /// Set the system-tier send buffer
    pub fn set_system_send_buffer_size(&self, bytes: usize) {
        self.system_send_buffer_size.store(bytes, Ordering::Release);
    }

    /// Allocator-tier receive size (`SO_RCVBUF`)
    pub fn receive_buffer_size(&self) -> usize {
        self.allocator_receive_buffer_size.load(Ordering::Acquire)
    }

    /// Set the allocator-tier receive size
    pub fn set_receive_buffer_size(&self, bytes: usize) {
        self.allocator_receive_buffer_size.store(bytes, Ordering::Release);
    }

    /// Allocator-tier send size (`SO_SNDBUF`)
    pub fn send_buffer_size(&self) -> usize {
        self.allocator_send_buffer_size.load(Ordering::Acquire)
    }

    /// Set the allocator-tier send size
    pub fn set_send_buffer_size(&self, bytes: usize) {
        self.allocator_send_buffer_size.store(bytes, Ordering::Release);
    }

    /// Pending-connection queue depth
    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::Acquire)
    }

    /// Set the pending-connection queue depth
    pub fn set_backlog(&self, backlog: usize) {
        self.backlog.store(backlog, Ordering::Release);
    }

    /// Linger seconds; `<= 0` means lingering is disabled
    pub fn so_linger(&self) -> i32 {
        self.so_linger.load(Ordering::Acquire)
    }

    /// Set the linger seconds; `<= 0` disables lingering
    pub fn set_so_linger(&self, seconds: i32) {
        self.so_linger.store(seconds, Ordering::Release);
    }

    /// Whether the bound address may be reused
    pub fn is_reuse_address(&self) -> bool {
        self.reuse_address.load(Ordering::Acquire)
    }

    /// Allow or forbid reuse of the bound address
    pub fn set_reuse_address(&self, reuse: bool) {
        self.reuse_address.store(reuse, Ordering::Release);
    }

    fn recognized(&self, option: TransportOption) -> OptionValue {
        match option {
            TransportOption::ProtocolReceiveBufferSize => {
                self.protocol_receive_buffer_size().into()
            }
            TransportOption::ProtocolSendBufferSize => self.protocol_send_buffer_size().into(),
            TransportOption::SystemReceiveBufferSize => self.system_receive_buffer_size().into(),
            TransportOption::SystemSendBufferSize => self.system_send_buffer_size().into(),
            TransportOption::ReceiveBufferSize => self.receive_buffer_size().into(),
            TransportOption::SendBufferSize => self.send_buffer_size().into(),
            TransportOption::ReuseAddress => self.is_reuse_address().into(),
            TransportOption::Linger => self.so_linger().into(),
            TransportOption::Backlog => self.backlog().into(),
        }
    }

    /// Store a value for a recognized key.
    ///
    /// # Errors
    /// Returns [`OptionError::TypeMismatch`] if the payload kind does not fit
    /// the key
    fn store_recognized(
        &self,
        option: TransportOption,
        value: OptionValue,
    ) -> Result<(), OptionError> {
        match (option, value) {
            (TransportOption::ProtocolReceiveBufferSize, OptionValue::Size(v)) => {
                self.set_protocol_receive_buffer_size(v);
            }
            (TransportOption::ProtocolSendBufferSize, OptionValue::Size(v)) => {
                self.set_protocol_send_buffer_size(v);
            }
            (TransportOption::SystemReceiveBufferSize, OptionValue::Size(v)) => {
                self.set_system_receive_buffer_size(v);
            }
            (TransportOption::SystemSendBufferSize, OptionValue::Size(v)) => {
                self.set_system_send_buffer_size(v);
            }
            (TransportOption::ReceiveBufferSize, OptionValue::Size(v)) => {
                self.set_receive_buffer_size(v);
            }
            (TransportOption::SendBufferSize, OptionValue::Size(v)) => {
                self.set_send_buffer_size(v);
            }
            (TransportOption::ReuseAddress, OptionValue::Bool(v)) => self.set_reuse_address(v),
            (TransportOption::Linger, OptionValue::Int(v)) => self.set_so_linger(v),
            (TransportOption::Backlog, OptionValue::Size(v)) => self.set_backlog(v),
            _ => {
                let key = option.key();
                return Err(OptionError::TypeMismatch {
                    option: key.name(),
                    expected: key.kind(),
                    actual: value.kind(),
                });
            }
        }
        Ok(())
    }
}

impl Default for TransportChannelConfig {
    fn default() -> Self {
        Self::detached()
    }
}

impl<B: OptionStore> OptionStore for TransportChannelConfig<B> {
    fn option(&self, key: &ChannelOption) -> Option<OptionValue> {
        match TransportOption::from_key(key) {
            Some(option) => Some(self.recognized(option)),
            None => self.base.option(key),
        }
    }

    fn set_option(&self, key: &ChannelOption, value: OptionValue) -> Result<bool, OptionError> {
        self.validate(key, &value)?;
        match TransportOption::from_key(key) {
            Some(option) => {
                self.store_recognized(option, value)?;
                trace!("Set transport option {} = {}", key, value);
                if self.is_applied() && option != TransportOption::Backlog {
                    debug!(
                        "Option {} changed after apply; the open socket keeps its value",
                        key
                    );
                }
                Ok(true)
            }
            None => self.base.set_option(key, value),
        }
    }

    fn validate(&self, key: &ChannelOption, value: &OptionValue) -> Result<(), OptionError> {
        // Own keys are kind-checked here whatever the base hook does.
        if TransportOption::from_key(key).is_some() {
            key.check(value)?;
        }
        self.base.validate(key, value)
    }

    fn options(&self) -> BTreeMap<ChannelOption, OptionValue> {
        let mut options = self.base.options();
        options.extend(
            TransportOption::ALL
                .into_iter()
                .map(|option| (option.key(), self.recognized(option))),
        );
        options
    }
}

fn step(step: ApplyStep, call: impl FnOnce() -> io::Result<()>) -> Result<(), ApplyError> {
    debug!("Applying {}", step);
    call().map_err(|source| ApplyError::Io { step, source })
}
