//! Transport channel construction.
//!
//! A channel owns its socket handle and shares its config with whichever
//! threads hold the channel. The config is applied while the channel is being
//! built, so a constructed channel always carries an applied config (or was
//! explicitly built without one). Settings files are loaded into the config
//! before that apply, never after.

use crate::config::TransportChannelConfig;
use crate::error::ChannelError;
use crate::settings::ChannelSettings;
use crate::socket::SocketHandle;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Role and framing of a transport channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Listening channel for byte-stream connections
    ByteAcceptor,
    /// Outbound byte-stream connection
    ByteConnector,
    /// Listening channel for message connections
    MessageAcceptor,
    /// Outbound message connection
    MessageConnector,
    /// Symmetric byte-stream connection set up by rendezvous
    ByteRendezvous,
    /// Symmetric message connection set up by rendezvous
    MessageRendezvous,
}

impl ChannelKind {
    /// Whether this channel accepts connections (and uses the backlog)
    #[must_use]
    pub fn is_acceptor(self) -> bool {
        matches!(self, Self::ByteAcceptor | Self::MessageAcceptor)
    }

    /// Whether this channel preserves message boundaries
    #[must_use]
    pub fn is_message(self) -> bool {
        matches!(
            self,
            Self::MessageAcceptor | Self::MessageConnector | Self::MessageRendezvous
        )
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ByteAcceptor => "byte-acceptor",
            Self::ByteConnector => "byte-connector",
            Self::MessageAcceptor => "message-acceptor",
            Self::MessageConnector => "message-connector",
            Self::ByteRendezvous => "byte-rendezvous",
            Self::MessageRendezvous => "message-rendezvous",
        })
    }
}

/// A transport channel bound to one socket handle
pub struct UdtChannel<S> {
    kind: ChannelKind,
    socket: S,
    config: Arc<TransportChannelConfig>,
}

impl<S: SocketHandle> UdtChannel<S> {
    /// Build a channel and apply its default config to `socket`.
    ///
    /// # Errors
    /// Returns [`ChannelError::Apply`] if any socket call fails
    ///
    /// # Examples
    /// ```no_run
    /// use rudt_transport::{ChannelKind, UdtChannel, UdpSocketHandle};
    /// use std::net::SocketAddr;
    ///
    /// let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
    /// let socket = UdpSocketHandle::for_addr(&addr).unwrap();
    /// let channel = UdtChannel::new(ChannelKind::ByteAcceptor, socket).unwrap();
    /// channel.socket().bind(addr).unwrap();
    /// ```
    pub fn new(kind: ChannelKind, socket: S) -> Result<Self, ChannelError> {
        Self::with_options(kind, socket, true)
    }

    /// Build a channel, applying the config only if `apply` is set.
    ///
    /// # Errors
    /// Returns [`ChannelError::Apply`] if any socket call fails; the socket is
    /// dropped with the failed channel
    pub fn with_options(kind: ChannelKind, socket: S, apply: bool) -> Result<Self, ChannelError> {
        let config = TransportChannelConfig::new(&socket, apply).map_err(|e| {
            warn!("Failed to construct {} channel: {}", kind, e);
            e
        })?;
        debug!("Constructed {} channel (applied: {})", kind, apply);

        Ok(Self {
            kind,
            socket,
            config: Arc::new(config),
        })
    }

    /// Build a channel whose config is loaded from `settings` and then
    /// applied to `socket`.
    ///
    /// Settings are fully checked before the socket is touched, so a rejected
    /// file leaves the socket as it was.
    ///
    /// # Errors
    /// - [`ChannelError::Settings`] if a setting is rejected
    /// - [`ChannelError::Apply`] if any socket call fails
    pub fn with_settings(
        kind: ChannelKind,
        socket: S,
        settings: &ChannelSettings,
    ) -> Result<Self, ChannelError> {
        let config = TransportChannelConfig::detached();
        settings.apply_to(&config)?;
        config.apply(&socket).map_err(|e| {
            warn!("Failed to construct {} channel: {}", kind, e);
            e
        })?;
        debug!("Constructed {} channel from settings", kind);

        Ok(Self {
            kind,
            socket,
            config: Arc::new(config),
        })
    }

    /// Channel role and framing
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Shared channel config
    pub fn config(&self) -> &Arc<TransportChannelConfig> {
        &self.config
    }

    /// Underlying socket handle
    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Tear the channel down, keeping the socket handle
    pub fn into_socket(self) -> S {
        self.socket
    }
}

impl<S> fmt::Debug for UdtChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdtChannel")
            .field("kind", &self.kind)
            .field("applied", &self.config.is_applied())
            .finish_non_exhaustive()
    }
}
