//! File-based channel settings.
//!
//! Settings are read from TOML and pushed into a channel config through the
//! generic option API, so every value passes the same validation hook as a
//! programmatic `set_option`.
//!
//! ```toml
//! [transport]
//! protocol_receive_buffer_size = 20971520
//! system_send_buffer_size = 2097152
//! so_linger = 5
//!
//! [channel]
//! connect_timeout_millis = 10000
//! ```

use crate::config::{
    DEFAULT_ALLOCATOR_BUFFER_SIZE, DEFAULT_BACKLOG, DEFAULT_PROTOCOL_BUFFER_SIZE,
    DEFAULT_SYSTEM_BUFFER_SIZE, TransportOption,
};
use crate::error::{OptionError, SettingsError};
use crate::option::{
    ChannelOption, DEFAULT_CONNECT_TIMEOUT_MILLIS, DEFAULT_WRITE_BUFFER_HIGH_WATER_MARK,
    DEFAULT_WRITE_BUFFER_LOW_WATER_MARK, DEFAULT_WRITE_SPIN_COUNT, OptionStore, OptionValue,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Channel settings file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ChannelSettings {
    /// Transport buffer tiers and socket options
    #[serde(default)]
    pub transport: TransportSettings,
    /// Host framework options
    #[serde(default)]
    pub channel: HostSettings,
}

/// Transport-level settings, one per recognized option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    /// Protocol-tier receive window in bytes
    pub protocol_receive_buffer_size: usize,
    /// Protocol-tier send window in bytes
    pub protocol_send_buffer_size: usize,
    /// System-tier receive buffer in bytes
    pub system_receive_buffer_size: usize,
    /// System-tier send buffer in bytes
    pub system_send_buffer_size: usize,
    /// Allocator-tier receive size in bytes
    pub receive_buffer_size: usize,
    /// Allocator-tier send size in bytes
    pub send_buffer_size: usize,
    /// Accept backlog
    pub backlog: usize,
    /// Linger seconds, `<= 0` disables
    pub so_linger: i32,
    /// Reuse the bound address
    pub reuse_address: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            protocol_receive_buffer_size: DEFAULT_PROTOCOL_BUFFER_SIZE,
            protocol_send_buffer_size: DEFAULT_PROTOCOL_BUFFER_SIZE,
            system_receive_buffer_size: DEFAULT_SYSTEM_BUFFER_SIZE,
            system_send_buffer_size: DEFAULT_SYSTEM_BUFFER_SIZE,
            receive_buffer_size: DEFAULT_ALLOCATOR_BUFFER_SIZE,
            send_buffer_size: DEFAULT_ALLOCATOR_BUFFER_SIZE,
            backlog: DEFAULT_BACKLOG,
            so_linger: 0,
            reuse_address: true,
        }
    }
}

/// Host framework settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostSettings {
    /// Connect timeout in milliseconds
    pub connect_timeout_millis: i32,
    /// Write attempts per flush
    pub write_spin_count: i32,
    /// Issue reads automatically
    pub auto_read: bool,
    /// Write buffer high water mark in bytes
    pub write_buffer_high_water_mark: usize,
    /// Write buffer low water mark in bytes
    pub write_buffer_low_water_mark: usize,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            connect_timeout_millis: DEFAULT_CONNECT_TIMEOUT_MILLIS,
            write_spin_count: DEFAULT_WRITE_SPIN_COUNT,
            auto_read: true,
            write_buffer_high_water_mark: DEFAULT_WRITE_BUFFER_HIGH_WATER_MARK,
            write_buffer_low_water_mark: DEFAULT_WRITE_BUFFER_LOW_WATER_MARK,
        }
    }
}

impl ChannelSettings {
    /// Load settings from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let settings = Self::from_toml_str(&contents)?;
        debug!("Loaded channel settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    /// Returns [`SettingsError::Parse`] for malformed TOML or unknown fields
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(s)?)
    }

    /// Encode settings as TOML
    ///
    /// # Errors
    /// Returns [`SettingsError::Encode`] if encoding fails
    pub fn to_toml_string(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write settings to a TOML file, creating parent directories
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let contents = self.to_toml_string()?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Every setting as an option key and value
    #[must_use]
    pub fn entries(&self) -> Vec<(ChannelOption, OptionValue)> {
        let t = &self.transport;
        let c = &self.channel;
        vec![
            (
                TransportOption::ProtocolReceiveBufferSize.key(),
                t.protocol_receive_buffer_size.into(),
            ),
            (
                TransportOption::ProtocolSendBufferSize.key(),
                t.protocol_send_buffer_size.into(),
            ),
            (
                TransportOption::SystemReceiveBufferSize.key(),
                t.system_receive_buffer_size.into(),
            ),
            (
                TransportOption::SystemSendBufferSize.key(),
                t.system_send_buffer_size.into(),
            ),
            (ChannelOption::SO_RCVBUF, t.receive_buffer_size.into()),
            (ChannelOption::SO_SNDBUF, t.send_buffer_size.into()),
            (ChannelOption::SO_BACKLOG, t.backlog.into()),
            (ChannelOption::SO_LINGER, t.so_linger.into()),
            (ChannelOption::SO_REUSEADDR, t.reuse_address.into()),
            (
                ChannelOption::CONNECT_TIMEOUT_MILLIS,
                c.connect_timeout_millis.into(),
            ),
            (ChannelOption::WRITE_SPIN_COUNT, c.write_spin_count.into()),
            (ChannelOption::AUTO_READ, c.auto_read.into()),
            (
                ChannelOption::WRITE_BUFFER_HIGH_WATER_MARK,
                c.write_buffer_high_water_mark.into(),
            ),
            (
                ChannelOption::WRITE_BUFFER_LOW_WATER_MARK,
                c.write_buffer_low_water_mark.into(),
            ),
        ]
    }

    /// Push every setting into `store` through `set_option`.
    ///
    /// Every entry is checked before anything is written: the key must be
    /// known to the store, the value must pass its validation hook and the
    /// water marks must not cross. A rejected file leaves the store untouched.
    /// Water marks are then written in the order that keeps the pair valid.
    ///
    /// # Errors
    /// - [`SettingsError::Option`] if validation rejects a value
    /// - [`SettingsError::Unsupported`] if no store in the chain knows a key
    pub fn apply_to<S: OptionStore + ?Sized>(&self, store: &S) -> Result<(), SettingsError> {
        let mut entries = self.entries();

        for (key, value) in &entries {
            if store.option(key).is_none() {
                return Err(SettingsError::Unsupported(key.name()));
            }
            store.validate(key, value)?;
        }

        let high = self.channel.write_buffer_high_water_mark;
        let low = self.channel.write_buffer_low_water_mark;
        if low > high {
            return Err(OptionError::InvalidValue {
                option: ChannelOption::WRITE_BUFFER_LOW_WATER_MARK.name(),
                reason: format!("must be <= high water mark ({high}), got {low}").into(),
            }
            .into());
        }

        let current_high = store
            .option(&ChannelOption::WRITE_BUFFER_HIGH_WATER_MARK)
            .and_then(|v| v.as_size());
        let raises_high = current_high.is_some_and(|current| low > current);
        if !raises_high {
            // Lower the low mark before the high mark.
            let len = entries.len();
            entries.swap(len - 2, len - 1);
        }

        for (key, value) in entries {
            if !store.set_option(&key, value)? {
                return Err(SettingsError::Unsupported(key.name()));
            }
        }
        debug!("Applied channel settings");
        Ok(())
    }
}
