//! # RUDT Transport
//!
//! Channel configuration for the RUDT reliable transport, a connection-oriented
//! protocol that runs its own congestion control and retransmission over UDP
//! datagrams.
//!
//! This crate provides:
//! - A generic option store (`ChannelOption` keys, typed `OptionValue` payloads)
//! - The transport channel config with its three buffer-size tiers
//! - One-shot application of that config onto a native socket handle
//! - A socket2-backed UDP socket handle
//! - File-based channel settings (TOML)
//!
//! ## Buffer tiers
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  protocol tier   (engine window, 10 MiB)      native option │
//! ├──────────────────────────────────────────────────────────────┤
//! │  system tier     (OS socket buffers, 1 MiB)   native option │
//! ├──────────────────────────────────────────────────────────────┤
//! │  allocator tier  (SO_RCVBUF/SO_SNDBUF hints, 128 KiB)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tiers are independent: writing one never updates another.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod error;
pub mod option;
pub mod settings;
pub mod socket;
pub mod udp;

pub use channel::{ChannelKind, UdtChannel};
pub use config::{OptionFamily, TransportChannelConfig, TransportOption};
pub use error::{ApplyError, ApplyStep, ChannelError, OptionError, SettingsError};
pub use option::{ChannelOption, DefaultChannelConfig, OptionStore, OptionValue, ValueKind};
pub use settings::ChannelSettings;
pub use socket::{NativeOption, SocketHandle};
pub use udp::UdpSocketHandle;

/// One kibibyte
pub const KIB: usize = 1024;

/// One mebibyte
pub const MIB: usize = KIB * KIB;
