//! TCP channel wrapper for mio-based I/O.
//!
//! Provides a thin wrapper around [`mio::net::TcpStream`] with
//! `WouldBlock`-tolerant read/write helpers, socket buffer tuning, and
//! integration with mio's polling infrastructure.

use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsFd, BorrowedFd};

use mio::event::Source;
use mio::net::TcpStream as MioTcpStream;
use mio::{Interest, Registry, Token};

use super::Endpoint;

/// A connected, non-blocking TCP channel.
///
/// Produced by the connection strategy once a host accepts the connection.
/// Use with mio's [`Poll`] for readiness notification, or drive it directly
/// through a [`BufferPipeline`].
///
/// [`Poll`]: mio::Poll
/// [`BufferPipeline`]: crate::pipeline::BufferPipeline
#[derive(Debug)]
pub struct TcpChannel {
    inner: MioTcpStream,
}

impl TcpChannel {
    /// Wraps an already connected std stream, switching it to non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be made non-blocking.
    pub fn from_std(stream: std::net::TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            inner: MioTcpStream::from_std(stream),
        })
    }

    /// Returns the remote endpoint of this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer address cannot be retrieved.
    pub fn peer_addr(&self) -> io::Result<Endpoint> {
        self.inner.peer_addr().map(Endpoint::from)
    }

    /// Returns the local endpoint of this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<Endpoint> {
        self.inner.local_addr().map(Endpoint::from)
    }

    /// Attempts to read, returning `Ok(None)` instead of `WouldBlock`.
    ///
    /// `Ok(Some(0))` means the peer closed its side of the connection.
    pub fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.inner.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempts to write, returning `Ok(None)` instead of `WouldBlock`.
    pub fn try_write(&mut self, buf: &[u8]) -> io::Result<Option<usize>> {
        match self.inner.write(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Disables Nagle's algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.set_nodelay(nodelay)
    }

    /// Sets the socket's send buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
        // mio doesn't expose buffer sizes, go through rustix
        let fd = self.inner.as_fd();
        rustix::net::sockopt::set_socket_send_buffer_size(fd, size)?;
        Ok(())
    }

    /// Sets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        let fd = self.inner.as_fd();
        rustix::net::sockopt::set_socket_recv_buffer_size(fd, size)?;
        Ok(())
    }

    /// Gets the socket's send buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be retrieved.
    pub fn send_buffer_size(&self) -> io::Result<usize> {
        let fd = self.inner.as_fd();
        Ok(rustix::net::sockopt::socket_send_buffer_size(fd)?)
    }

    /// Gets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be retrieved.
    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        let fd = self.inner.as_fd();
        Ok(rustix::net::sockopt::socket_recv_buffer_size(fd)?)
    }

    /// Shuts the connection down in both directions, ignoring any error.
    ///
    /// The descriptor itself is released when the channel is dropped.
    pub fn close_quietly(&self) {
        let _ = self.inner.shutdown(Shutdown::Both);
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl AsFd for TcpChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl Source for TcpChannel {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.deregister(registry)
    }
}
