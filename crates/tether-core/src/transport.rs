//! Transport abstraction for blocking, stream-oriented connections.
//!
//! The engine consumes a small capability set: dial out, accept one inbound
//! peer, read some bytes, write all bytes, and shut the handle down from
//! another thread. [`TcpTransport`] is the production implementation; the
//! test harness provides a deterministic in-memory one. Transport security,
//! if any, is layered underneath this seam.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Handle that can interrupt a connection from outside its I/O threads.
///
/// `shutdown` must cause a read blocked on the connection to return
/// (end-of-stream or an error) promptly; `close()` relies on this to never
/// hang. It must be safe to call more than once.
pub trait ShutdownHandle: Send + Sync {
    /// Tear down the connection, unblocking any pending read or write
    fn shutdown(&self);
}

/// A live connection split into independently-owned halves.
///
/// The engine hands the reader to the receive thread and the writer to the
/// send thread; the shutdown handle stays with the engine so `close()` can
/// interrupt both.
pub struct SplitConnection {
    /// Read half, exclusively owned by the receive thread
    pub reader: Box<dyn Read + Send>,
    /// Write half, exclusively owned by the send thread
    pub writer: Box<dyn Write + Send>,
    /// Out-of-band teardown handle
    pub shutdown: Arc<dyn ShutdownHandle>,
}

impl std::fmt::Debug for SplitConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitConnection").finish_non_exhaustive()
    }
}

/// Connection-establishment capability.
pub trait Transport: Send + Sync {
    /// Dial an outbound connection to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if resolution, connection, or the timeout
    /// bound fails.
    fn dial(&self, host: &str, port: u16, timeout: Duration) -> io::Result<SplitConnection>;

    /// Bind to `host:port` and accept exactly one inbound connection,
    /// blocking until a peer arrives.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the bind or accept fails.
    fn accept_once(&self, host: &str, port: u16) -> io::Result<SplitConnection>;
}

/// Production transport over TCP.
///
/// Nagle's algorithm is disabled on every stream: frames are small control
/// messages and latency matters more than packet efficiency here.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
        (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address found for {host}:{port}"),
                )
            })
    }

    fn split(stream: TcpStream) -> io::Result<SplitConnection> {
        let _ = stream.set_nodelay(true);

        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;

        Ok(SplitConnection {
            reader: Box::new(BufReader::new(reader)),
            writer: Box::new(BufWriter::new(writer)),
            shutdown: Arc::new(TcpShutdown(stream)),
        })
    }
}

impl Transport for TcpTransport {
    fn dial(&self, host: &str, port: u16, timeout: Duration) -> io::Result<SplitConnection> {
        let addr = Self::resolve(host, port)?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        Self::split(stream)
    }

    fn accept_once(&self, host: &str, port: u16) -> io::Result<SplitConnection> {
        let listener = TcpListener::bind((host, port))?;
        let (stream, _peer) = listener.accept()?;
        Self::split(stream)
    }
}

struct TcpShutdown(TcpStream);

impl ShutdownHandle for TcpShutdown {
    fn shutdown(&self) {
        // NotConnected after the peer already went away is expected
        let _ = self.0.shutdown(Shutdown::Both);
    }
}
