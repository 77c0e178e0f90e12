//! Native socket handle abstraction.
//!
//! The transport engine owns congestion control, retransmission and the
//! handshakes; this crate only reaches it through [`SocketHandle`]. Every
//! mutating call is a real socket-option call that may fail, and failures are
//! returned as `io::Error` without retry.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Engine-specific tunables reachable only through [`SocketHandle::set_option`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NativeOption {
    /// Receive window inside the transport protocol
    ProtocolReceiveBufferSize,
    /// Send window inside the transport protocol
    ProtocolSendBufferSize,
    /// OS socket receive buffer
    SystemReceiveBufferSize,
    /// OS socket send buffer
    SystemSendBufferSize,
}

impl NativeOption {
    /// All native options
    pub const ALL: [NativeOption; 4] = [
        NativeOption::ProtocolReceiveBufferSize,
        NativeOption::ProtocolSendBufferSize,
        NativeOption::SystemReceiveBufferSize,
        NativeOption::SystemSendBufferSize,
    ];
}

impl fmt::Display for NativeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProtocolReceiveBufferSize => "Protocol_Receive_Buffer_Size",
            Self::ProtocolSendBufferSize => "Protocol_Send_Buffer_Size",
            Self::SystemReceiveBufferSize => "System_Receive_Buffer_Size",
            Self::SystemSendBufferSize => "System_Send_Buffer_Size",
        })
    }
}

/// One open transport socket.
///
/// Implementations must be usable from several threads; setters take `&self`
/// like the underlying setsockopt calls.
pub trait SocketHandle: Send + Sync {
    /// Allow reuse of the bound local address
    ///
    /// # Errors
    /// Returns the socket-option error unchanged
    fn set_reuse_address(&self, reuse: bool) -> io::Result<()>;

    /// Current reuse-address flag
    ///
    /// # Errors
    /// Returns the socket-option error unchanged
    fn reuse_address(&self) -> io::Result<bool>;

    /// Set the send buffer size in bytes
    ///
    /// # Errors
    /// Returns the socket-option error unchanged, including out-of-range sizes
    fn set_send_buffer_size(&self, size: usize) -> io::Result<()>;

    /// Current send buffer size in bytes
    ///
    /// # Errors
    /// Returns the socket-option error unchanged
    fn send_buffer_size(&self) -> io::Result<usize>;

    /// Set the receive buffer size in bytes
    ///
    /// # Errors
    /// Returns the socket-option error unchanged, including out-of-range sizes
    fn set_receive_buffer_size(&self, size: usize) -> io::Result<()>;

    /// Current receive buffer size in bytes
    ///
    /// # Errors
    /// Returns the socket-option error unchanged
    fn receive_buffer_size(&self) -> io::Result<usize>;

    /// Enable lingering on close for `seconds`, or disable it
    ///
    /// # Errors
    /// Returns the socket-option error unchanged
    fn set_so_linger(&self, enabled: bool, seconds: u32) -> io::Result<()>;

    /// Current linger setting, `None` when disabled
    ///
    /// # Errors
    /// Returns the socket-option error unchanged
    fn so_linger(&self) -> io::Result<Option<Duration>>;

    /// Set an engine-specific option
    ///
    /// # Errors
    /// Returns the engine error unchanged, including out-of-range values
    fn set_option(&self, option: NativeOption, value: usize) -> io::Result<()>;

    /// Read an engine-specific option
    ///
    /// # Errors
    /// Returns the engine error unchanged
    fn option(&self, option: NativeOption) -> io::Result<usize>;
}

macro_rules! forward_socket_handle {
    ($($ty:ty),*) => {$(
        impl<T: SocketHandle + ?Sized> SocketHandle for $ty {
            fn set_reuse_address(&self, reuse: bool) -> io::Result<()> {
                (**self).set_reuse_address(reuse)
            }

            fn reuse_address(&self) -> io::Result<bool> {
                (**self).reuse_address()
            }

            fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
                (**self).set_send_buffer_size(size)
            }

            fn send_buffer_size(&self) -> io::Result<usize> {
                (**self).send_buffer_size()
            }

            fn set_receive_buffer_size(&self, size: usize) -> io::Result<()> {
                (**self).set_receive_buffer_size(size)
            }

            fn receive_buffer_size(&self) -> io::Result<usize> {
                (**self).receive_buffer_size()
            }

            fn set_so_linger(&self, enabled: bool, seconds: u32) -> io::Result<()> {
                (**self).set_so_linger(enabled, seconds)
            }

            fn so_linger(&self) -> io::Result<Option<Duration>> {
                (**self).so_linger()
            }

            fn set_option(&self, option: NativeOption, value: usize) -> io::Result<()> {
                (**self).set_option(option, value)
            }

            fn option(&self, option: NativeOption) -> io::Result<usize> {
                (**self).option(option)
            }
        }
    )*};
}

forward_socket_handle!(&T, Box<T>, Arc<T>);

#[cfg(test)]
pub(crate) mod testing {
    //! Recording socket handle for unit tests.

    use super::*;
    use std::sync::Mutex;

    /// A call made against [`RecordingSocket`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Call {
        ReuseAddress(bool),
        SendBufferSize(usize),
        ReceiveBufferSize(usize),
        Linger(bool, u32),
        Native(NativeOption, usize),
    }

    /// Socket handle that records every mutating call and can fail on demand
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSocket {
        calls: Mutex<Vec<Call>>,
        fail_at: Option<usize>,
    }

    impl RecordingSocket {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Fail the `index`-th mutating call (0-based) with `ErrorKind::InvalidInput`
        pub(crate) fn failing_at(index: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_at: Some(index),
            }
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        /// Log `call`, then fail it if it is the injected one. A failed call
        /// stays in the log but never shows up in read-backs.
        fn record(&self, call: Call) -> io::Result<()> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push(call);
            if self.fail_at == Some(index) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("injected failure on {call:?}"),
                ));
            }
            Ok(())
        }

        fn last<T>(&self, pick: impl Fn(&Call) -> Option<T>) -> Option<T> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .enumerate()
                .rev()
                .filter(|(index, _)| self.fail_at != Some(*index))
                .find_map(|(_, call)| pick(call))
        }
    }

    impl SocketHandle for RecordingSocket {
        fn set_reuse_address(&self, reuse: bool) -> io::Result<()> {
            self.record(Call::ReuseAddress(reuse))
        }

        fn reuse_address(&self) -> io::Result<bool> {
            Ok(self
                .last(|c| match c {
                    Call::ReuseAddress(v) => Some(*v),
                    _ => None,
                })
                .unwrap_or(false))
        }

        fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
            self.record(Call::SendBufferSize(size))
        }

        fn send_buffer_size(&self) -> io::Result<usize> {
            Ok(self
                .last(|c| match c {
                    Call::SendBufferSize(v) => Some(*v),
                    _ => None,
                })
                .unwrap_or(0))
        }

        fn set_receive_buffer_size(&self, size: usize) -> io::Result<()> {
            self.record(Call::ReceiveBufferSize(size))
        }

        fn receive_buffer_size(&self) -> io::Result<usize> {
            Ok(self
                .last(|c| match c {
                    Call::ReceiveBufferSize(v) => Some(*v),
                    _ => None,
                })
                .unwrap_or(0))
        }

        fn set_so_linger(&self, enabled: bool, seconds: u32) -> io::Result<()> {
            self.record(Call::Linger(enabled, seconds))
        }

        fn so_linger(&self) -> io::Result<Option<Duration>> {
            Ok(self
                .last(|c| match c {
                    Call::Linger(enabled, secs) => Some(
                        enabled.then(|| Duration::from_secs(u64::from(*secs))),
                    ),
                    _ => None,
                })
                .flatten())
        }

        fn set_option(&self, option: NativeOption, value: usize) -> io::Result<()> {
            self.record(Call::Native(option, value))
        }

        fn option(&self, option: NativeOption) -> io::Result<usize> {
            Ok(self
                .last(|c| match c {
                    Call::Native(o, v) if *o == option => Some(*v),
                    _ => None,
                })
                .unwrap_or(0))
        }
    }
}
