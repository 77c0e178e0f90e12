//! UDP socket handle backed by socket2.
//!
//! The transport runs over a plain UDP socket. OS-level options (reuse-address,
//! buffer sizes, linger) go straight to the socket through socket2; the
//! protocol-tier windows live in the handle, where the engine reads them when
//! it sizes its send and receive queues.
//!
//! Values the kernel cannot represent are rejected with
//! `io::ErrorKind::InvalidInput` rather than clamped.

use crate::socket::{NativeOption, SocketHandle};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Largest linger accepted on every supported platform
pub const MAX_LINGER_SECONDS: u32 = u16::MAX as u32;

/// Socket handle for one transport socket over UDP.
///
/// The allocator send tier (`set_send_buffer_size`) and the system send tier
/// (`NativeOption::SystemSendBufferSize`) both land on `SO_SNDBUF`, as do the
/// two receive counterparts on `SO_RCVBUF`. During apply the system tier is
/// written last, so its value is the one the kernel keeps.
#[derive(Debug)]
pub struct UdpSocketHandle {
    socket: Socket,
    protocol_receive_buffer_size: AtomicUsize,
    protocol_send_buffer_size: AtomicUsize,
}

impl UdpSocketHandle {
    /// Create an unbound, non-blocking UDP socket for `domain`
    ///
    /// # Errors
    /// Returns the OS error if the socket cannot be created
    pub fn new(domain: Domain) -> io::Result<Self> {
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket,
            protocol_receive_buffer_size: AtomicUsize::new(0),
            protocol_send_buffer_size: AtomicUsize::new(0),
        })
    }

    /// Create an unbound socket in the address family of `addr`
    ///
    /// # Errors
    /// Returns the OS error if the socket cannot be created
    ///
    /// # Examples
    /// ```no_run
    /// use rudt_transport::udp::UdpSocketHandle;
    /// use std::net::SocketAddr;
    ///
    /// let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    /// let handle = UdpSocketHandle::for_addr(&addr).unwrap();
    /// handle.bind(addr).unwrap();
    /// println!("Bound to {}", handle.local_addr().unwrap());
    /// ```
    pub fn for_addr(addr: &SocketAddr) -> io::Result<Self> {
        Self::new(Domain::for_address(*addr))
    }

    /// Bind the socket to a local address
    ///
    /// # Errors
    /// Returns the OS error if binding fails
    pub fn bind(&self, addr: SocketAddr) -> io::Result<()> {
        self.socket.bind(&addr.into())?;
        debug!("UDP socket bound to {}", addr);
        Ok(())
    }

    /// Local address the socket is bound to
    ///
    /// # Errors
    /// Returns the OS error, or `InvalidInput` for a non-IP address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "socket has no IP address")
        })
    }

    /// Convert into a standard library UDP socket
    #[must_use]
    pub fn into_udp_socket(self) -> UdpSocket {
        self.socket.into()
    }
}

fn checked_size(size: usize) -> io::Result<usize> {
    if i32::try_from(size).is_err() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("buffer size {size} exceeds the native limit of {}", i32::MAX),
        ));
    }
    Ok(size)
}

fn checked_window(option: NativeOption, size: usize) -> io::Result<usize> {
    if size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{option} must be positive"),
        ));
    }
    checked_size(size)
}

impl SocketHandle for UdpSocketHandle {
    fn set_reuse_address(&self, reuse: bool) -> io::Result<()> {
        self.socket.set_reuse_address(reuse)
    }

    fn reuse_address(&self) -> io::Result<bool> {
        self.socket.reuse_address()
    }

    fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
        self.socket.set_send_buffer_size(checked_size(size)?)
    }

    fn send_buffer_size(&self) -> io::Result<usize> {
        self.socket.send_buffer_size()
    }

    fn set_receive_buffer_size(&self, size: usize) -> io::Result<()> {
        self.socket.set_recv_buffer_size(checked_size(size)?)
    }

    fn receive_buffer_size(&self) -> io::Result<usize> {
        self.socket.recv_buffer_size()
    }

    fn set_so_linger(&self, enabled: bool, seconds: u32) -> io::Result<()> {
        if !enabled {
            return self.socket.set_linger(None);
        }
        if seconds > MAX_LINGER_SECONDS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("linger of {seconds}s exceeds {MAX_LINGER_SECONDS}s"),
            ));
        }
        self.socket
            .set_linger(Some(Duration::from_secs(u64::from(seconds))))
    }

    fn so_linger(&self) -> io::Result<Option<Duration>> {
        self.socket.linger()
    }

    fn set_option(&self, option: NativeOption, value: usize) -> io::Result<()> {
        match option {
            NativeOption::ProtocolReceiveBufferSize => {
                let value = checked_window(option, value)?;
                self.protocol_receive_buffer_size
                    .store(value, Ordering::Release);
            }
            NativeOption::ProtocolSendBufferSize => {
                let value = checked_window(option, value)?;
                self.protocol_send_buffer_size.store(value, Ordering::Release);
            }
            NativeOption::SystemReceiveBufferSize => {
                self.socket.set_recv_buffer_size(checked_size(value)?)?;
            }
            NativeOption::SystemSendBufferSize => {
                self.socket.set_send_buffer_size(checked_size(value)?)?;
            }
        }
        debug!("Native option {} set to {}", option, value);
        Ok(())
    }

    fn option(&self, option: NativeOption) -> io::Result<usize> {
        match option {
            NativeOption::ProtocolReceiveBufferSize => {
                Ok(self.protocol_receive_buffer_size.load(Ordering::Acquire))
            }
            NativeOption::ProtocolSendBufferSize => {
                Ok(self.protocol_send_buffer_size.load(Ordering::Acquire))
            }
            NativeOption::SystemReceiveBufferSize => self.socket.recv_buffer_size(),
            NativeOption::SystemSendBufferSize => self.socket.send_buffer_size(),
        }
    }
}
