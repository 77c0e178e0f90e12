//! Generic channel option store.
//!
//! Options are keyed by [`ChannelOption`], an open key type: the host framework
//! and the transport declare well-known keys as constants, and callers may mint
//! their own with [`ChannelOption::new`]. Values travel as [`OptionValue`], a
//! tagged payload whose kind is checked against the key before any store
//! mutates state.
//!
//! [`DefaultChannelConfig`] is the host framework's base store. Transport
//! configs wrap it and delegate every key they do not recognize.

use crate::error::OptionError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use tracing::trace;

/// Kind of payload an option carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    /// Signed 32-bit integer
    Int,
    /// Byte count or queue depth
    Size,
    /// Flag
    Bool,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "int",
            Self::Size => "size",
            Self::Bool => "bool",
        })
    }
}

/// Typed option payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionValue {
    /// Signed integer (linger seconds, timeouts)
    Int(i32),
    /// Byte count or queue depth
    Size(usize),
    /// Flag
    Bool(bool),
}

impl OptionValue {
    /// Kind of this payload
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Size(_) => ValueKind::Size,
            Self::Bool(_) => ValueKind::Bool,
        }
    }

    /// Integer payload, if this is an `Int`
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Size payload, if this is a `Size`
    #[must_use]
    pub fn as_size(&self) -> Option<usize> {
        match *self {
            Self::Size(v) => Some(v),
            _ => None,
        }
    }

    /// Flag payload, if this is a `Bool`
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Size(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for OptionValue {
    fn from(v: usize) -> Self {
        Self::Size(v)
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl TryFrom<OptionValue> for i32 {
    type Error = OptionValue;

    fn try_from(value: OptionValue) -> Result<Self, Self::Error> {
        value.as_int().ok_or(value)
    }
}

impl TryFrom<OptionValue> for usize {
    type Error = OptionValue;

    fn try_from(value: OptionValue) -> Result<Self, Self::Error> {
        value.as_size().ok_or(value)
    }
}

impl TryFrom<OptionValue> for bool {
    type Error = OptionValue;

    fn try_from(value: OptionValue) -> Result<Self, Self::Error> {
        value.as_bool().ok_or(value)
    }
}

/// Channel option key.
///
/// Keys compare by name and kind, so two independently declared keys with the
/// same name and kind address the same option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelOption {
    name: &'static str,
    kind: ValueKind,
}

impl ChannelOption {
    /// Connect timeout in milliseconds (0 = no timeout)
    pub const CONNECT_TIMEOUT_MILLIS: Self = Self::new("CONNECT_TIMEOUT_MILLIS", ValueKind::Int);
    /// Maximum write attempts per flush
    pub const WRITE_SPIN_COUNT: Self = Self::new("WRITE_SPIN_COUNT", ValueKind::Int);
    /// Read automatically after each completed read
    pub const AUTO_READ: Self = Self::new("AUTO_READ", ValueKind::Bool);
    /// Pending outbound bytes above which the channel reports unwritable
    pub const WRITE_BUFFER_HIGH_WATER_MARK: Self =
        Self::new("WRITE_BUFFER_HIGH_WATER_MARK", ValueKind::Size);
    /// Pending outbound bytes below which the channel reports writable again
    pub const WRITE_BUFFER_LOW_WATER_MARK: Self =
        Self::new("WRITE_BUFFER_LOW_WATER_MARK", ValueKind::Size);
    /// Receive buffer size hint
    pub const SO_RCVBUF: Self = Self::new("SO_RCVBUF", ValueKind::Size);
    /// Send buffer size hint
    pub const SO_SNDBUF: Self = Self::new("SO_SNDBUF", ValueKind::Size);
    /// Reuse the bound local address
    pub const SO_REUSEADDR: Self = Self::new("SO_REUSEADDR", ValueKind::Bool);
    /// Linger on close, in seconds (<= 0 = disabled)
    pub const SO_LINGER: Self = Self::new("SO_LINGER", ValueKind::Int);
    /// Pending-connection queue depth
    pub const SO_BACKLOG: Self = Self::new("SO_BACKLOG", ValueKind::Size);

    /// Declare an option key
    #[must_use]
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind }
    }

    /// Option name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Kind of value this option carries
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Check that `value` has the kind this option is declared with.
    ///
    /// # Errors
    /// Returns [`OptionError::TypeMismatch`] on a kind mismatch
    pub fn check(&self, value: &OptionValue) -> Result<(), OptionError> {
        if value.kind() == self.kind {
            Ok(())
        } else {
            Err(OptionError::TypeMismatch {
                option: self.name,
                expected: self.kind,
                actual: value.kind(),
            })
        }
    }
}

impl fmt::Display for ChannelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Key/value configuration store attached to a channel.
///
/// Stores are shared between the event-loop thread and application threads,
/// so every method takes `&self`.
pub trait OptionStore: Send + Sync {
    /// Current value of `key`, or `None` if this store does not support it
    fn option(&self, key: &ChannelOption) -> Option<OptionValue>;

    /// Set `key` to `value`.
    ///
    /// Returns `Ok(true)` when the value was stored and `Ok(false)` when the
    /// store does not support `key`.
    ///
    /// # Errors
    /// Returns [`OptionError`] when validation rejects the value; no state
    /// changes in that case
    fn set_option(&self, key: &ChannelOption, value: OptionValue) -> Result<bool, OptionError>;

    /// Validation hook run before any mutation.
    ///
    /// # Errors
    /// Returns [`OptionError`] if the pair is rejected
    fn validate(&self, key: &ChannelOption, value: &OptionValue) -> Result<(), OptionError> {
        key.check(value)
    }

    /// Snapshot of every option this store supports
    fn options(&self) -> BTreeMap<ChannelOption, OptionValue>;
}

impl<T: OptionStore + ?Sized> OptionStore for std::sync::Arc<T> {
    fn option(&self, key: &ChannelOption) -> Option<OptionValue> {
        (**self).option(key)
    }

    fn set_option(&self, key: &ChannelOption, value: OptionValue) -> Result<bool, OptionError> {
        (**self).set_option(key, value)
    }

    fn validate(&self, key: &ChannelOption, value: &OptionValue) -> Result<(), OptionError> {
        (**self).validate(key, value)
    }

    fn options(&self) -> BTreeMap<ChannelOption, OptionValue> {
        (**self).options()
    }
}

/// Default connect timeout (30 seconds)
pub const DEFAULT_CONNECT_TIMEOUT_MILLIS: i32 = 30_000;

/// Default write spin count
pub const DEFAULT_WRITE_SPIN_COUNT: i32 = 16;

/// Default write buffer high water mark (64 KiB)
pub const DEFAULT_WRITE_BUFFER_HIGH_WATER_MARK: usize = 64 * 1024;

/// Default write buffer low water mark (32 KiB)
pub const DEFAULT_WRITE_BUFFER_LOW_WATER_MARK: usize = 32 * 1024;

/// Base option store of the host framework.
///
/// Knows only the framework-level keys; socket and transport keys are left to
/// the transport config layered on top.
#[derive(Debug)]
pub struct DefaultChannelConfig {
    connect_timeout_millis: AtomicI32,
    write_spin_count: AtomicI32,
    auto_read: AtomicBool,
    write_buffer_high_water_mark: AtomicUsize,
    write_buffer_low_water_mark: AtomicUsize,
}

impl Default for DefaultChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout_millis: AtomicI32::new(DEFAULT_CONNECT_TIMEOUT_MILLIS),
            write_spin_count: AtomicI32::new(DEFAULT_WRITE_SPIN_COUNT),
            auto_read: AtomicBool::new(true),
            write_buffer_high_water_mark: AtomicUsize::new(DEFAULT_WRITE_BUFFER_HIGH_WATER_MARK),
            write_buffer_low_water_mark: AtomicUsize::new(DEFAULT_WRITE_BUFFER_LOW_WATER_MARK),
        }
    }
}

impl DefaultChannelConfig {
    /// Create a store holding the framework defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect timeout in milliseconds
    pub fn connect_timeout_millis(&self) -> i32 {
        self.connect_timeout_millis.load(Ordering::Acquire)
    }

    /// Set the connect timeout in milliseconds.
    ///
    /// # Errors
    /// Negative timeouts are rejected
    pub fn set_connect_timeout_millis(&self, millis: i32) -> Result<(), OptionError> {
        if millis < 0 {
            return Err(invalid(
                ChannelOption::CONNECT_TIMEOUT_MILLIS,
                format!("must be >= 0, got {millis}"),
            ));
        }
        self.connect_timeout_millis.store(millis, Ordering::Release);
        Ok(())
    }

    /// Maximum write attempts per flush
    pub fn write_spin_count(&self) -> i32 {
        self.write_spin_count.load(Ordering::Acquire)
    }

    /// Set the write spin count.
    ///
    /// # Errors
    /// Counts below 1 are rejected
    pub fn set_write_spin_count(&self, count: i32) -> Result<(), OptionError> {
        if count <= 0 {
            return Err(invalid(
                ChannelOption::WRITE_SPIN_COUNT,
                format!("must be > 0, got {count}"),
            ));
        }
        self.write_spin_count.store(count, Ordering::Release);
        Ok(())
    }

    /// Whether reads are issued automatically
    pub fn is_auto_read(&self) -> bool {
        self.auto_read.load(Ordering::Acquire)
    }

    /// Enable or disable automatic reads
    pub fn set_auto_read(&self, auto_read: bool) {
        self.auto_read.store(auto_read, Ordering::Release);
    }

    /// Write buffer high water mark in bytes
    pub fn write_buffer_high_water_mark(&self) -> usize {
        self.write_buffer_high_water_mark.load(Ordering::Acquire)
    }

    /// Set the write buffer high water mark.
    ///
    /// # Errors
    /// Rejected when below the current low water mark
    pub fn set_write_buffer_high_water_mark(&self, bytes: usize) -> Result<(), OptionError> {
        let low = self.write_buffer_low_water_mark();
        if bytes < low {
            return Err(invalid(
                ChannelOption::WRITE_BUFFER_HIGH_WATER_MARK,
                format!("must be >= low water mark ({low}), got {bytes}"),
            ));
        }
        self.write_buffer_high_water_mark.store(bytes, Ordering::Release);
        Ok(())
    }

    /// Write buffer low water mark in bytes
    pub fn write_buffer_low_water_mark(&self) -> usize {
        self.write_buffer_low_water_mark.load(Ordering::Acquire)
    }

    /// Set the write buffer low water mark.
    ///
    /// # Errors
    /// Rejected when above the current high water mark
    pub fn set_write_buffer_low_water_mark(&self, bytes: usize) -> Result<(), OptionError> {
        let high = self.write_buffer_high_water_mark();
        if bytes > high {
            return Err(invalid(
                ChannelOption::WRITE_BUFFER_LOW_WATER_MARK,
                format!("must be <= high water mark ({high}), got {bytes}"),
            ));
        }
        self.write_buffer_low_water_mark.store(bytes, Ordering::Release);
        Ok(())
    }
}

impl OptionStore for DefaultChannelConfig {
    fn option(&self, key: &ChannelOption) -> Option<OptionValue> {
        let value = match *key {
            ChannelOption::CONNECT_TIMEOUT_MILLIS => self.connect_timeout_millis().into(),
            ChannelOption::WRITE_SPIN_COUNT => self.write_spin_count().into(),
            ChannelOption::AUTO_READ => self.is_auto_read().into(),
            ChannelOption::WRITE_BUFFER_HIGH_WATER_MARK => {
                self.write_buffer_high_water_mark().into()
            }
            ChannelOption::WRITE_BUFFER_LOW_WATER_MARK => self.write_buffer_low_water_mark().into(),
            _ => return None,
        };
        Some(value)
    }

    fn set_option(&self, key: &ChannelOption, value: OptionValue) -> Result<bool, OptionError> {
        self.validate(key, &value)?;
        match (*key, value) {
            (ChannelOption::CONNECT_TIMEOUT_MILLIS, OptionValue::Int(v)) => {
                self.set_connect_timeout_millis(v)?;
            }
            (ChannelOption::WRITE_SPIN_COUNT, OptionValue::Int(v)) => {
                self.set_write_spin_count(v)?;
            }
            (ChannelOption::AUTO_READ, OptionValue::Bool(v)) => self.set_auto_read(v),
            (ChannelOption::WRITE_BUFFER_HIGH_WATER_MARK, OptionValue::Size(v)) => {
                self.set_write_buffer_high_water_mark(v)?;
            }
            (ChannelOption::WRITE_BUFFER_LOW_WATER_MARK, OptionValue::Size(v)) => {
                self.set_write_buffer_low_water_mark(v)?;
            }
            _ => {
                trace!("Base store does not support option {}", key);
                return Ok(false);
            }
        }
        trace!("Set base option {} = {}", key, value);
        Ok(true)
    }

    fn validate(&self, key: &ChannelOption, value: &OptionValue) -> Result<(), OptionError> {
        key.check(value)?;
        match (*key, *value) {
            (ChannelOption::CONNECT_TIMEOUT_MILLIS, OptionValue::Int(v)) if v < 0 => {
                Err(invalid(*key, format!("must be >= 0, got {v}")))
            }
            (ChannelOption::WRITE_SPIN_COUNT, OptionValue::Int(v)) if v <= 0 => {
                Err(invalid(*key, format!("must be > 0, got {v}")))
            }
            _ => Ok(()),
        }
    }

    fn options(&self) -> BTreeMap<ChannelOption, OptionValue> {
        [
            ChannelOption::CONNECT_TIMEOUT_MILLIS,
            ChannelOption::WRITE_SPIN_COUNT,
            ChannelOption::AUTO_READ,
            ChannelOption::WRITE_BUFFER_HIGH_WATER_MARK,
            ChannelOption::WRITE_BUFFER_LOW_WATER_MARK,
        ]
        .into_iter()
        .filter_map(|key| self.option(&key).map(|value| (key, value)))
        .collect()
    }
}

fn invalid(option: ChannelOption, reason: String) -> OptionError {
    OptionError::InvalidValue {
        option: option.name(),
        reason: reason.into(),
    }
}
