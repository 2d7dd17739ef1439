//! Deterministic in-memory transport.
//!
//! A [`MemoryNetwork`] is a process-local rendezvous of listeners and
//! dialers. Each established connection is a pair of byte pipes with the
//! same blocking semantics as a TCP stream: reads park until data arrives,
//! a clean shutdown drains to end-of-stream, and a severed link surfaces as
//! `ConnectionReset`. The sever path is what lets fault tests model a peer
//! dying abruptly, which plain loopback TCP cannot do reliably.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tether_core::{ShutdownHandle, SplitConnection, Transport};

// One directed byte stream between two endpoints.
struct PipeState {
    inner: Mutex<PipeBuf>,
    cond: Condvar,
}

struct PipeBuf {
    data: VecDeque<u8>,
    closed: bool,
    severed: bool,
}

impl PipeState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PipeBuf { data: VecDeque::new(), closed: false, severed: false }),
            cond: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PipeBuf> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clean close: readers drain what is buffered, then see end-of-stream
    fn close(&self) {
        self.lock().closed = true;
        self.cond.notify_all();
    }

    /// Abrupt kill: readers and writers fail immediately
    fn sever(&self) {
        let mut buf = self.lock();
        buf.severed = true;
        buf.data.clear();
        self.cond.notify_all();
    }
}

struct PipeReader(Arc<PipeState>);

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.0.lock();
        loop {
            if inner.severed {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "link severed"));
            }
            if !inner.data.is_empty() {
                let n = buf.len().min(inner.data.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = inner.data.pop_front().unwrap_or_default();
                }
                return Ok(n);
            }
            if inner.closed {
                return Ok(0);
            }
            inner = self.0.cond.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct PipeWriter(Arc<PipeState>);

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock();
        if inner.severed {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "link severed"));
        }
        if inner.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        inner.data.extend(buf.iter().copied());
        self.0.cond.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct MemoryShutdown {
    inbound: Arc<PipeState>,
    outbound: Arc<PipeState>,
}

impl ShutdownHandle for MemoryShutdown {
    fn shutdown(&self) {
        self.inbound.close();
        self.outbound.close();
    }
}

fn endpoint_pair() -> (SplitConnection, SplitConnection, [Arc<PipeState>; 2]) {
    let a_to_b = PipeState::new();
    let b_to_a = PipeState::new();

    let a = SplitConnection {
        reader: Box::new(PipeReader(Arc::clone(&b_to_a))),
        writer: Box::new(PipeWriter(Arc::clone(&a_to_b))),
        shutdown: Arc::new(MemoryShutdown {
            inbound: Arc::clone(&b_to_a),
            outbound: Arc::clone(&a_to_b),
        }),
    };

    let b = SplitConnection {
        reader: Box::new(PipeReader(Arc::clone(&a_to_b))),
        writer: Box::new(PipeWriter(Arc::clone(&b_to_a))),
        shutdown: Arc::new(MemoryShutdown {
            inbound: Arc::clone(&a_to_b),
            outbound: Arc::clone(&b_to_a),
        }),
    };

    (a, b, [a_to_b, b_to_a])
}

enum ListenSlot {
    Waiting,
    Ready(SplitConnection),
}

struct NetInner {
    listeners: Mutex<HashMap<(String, u16), ListenSlot>>,
    rendezvous: Condvar,
    links: Mutex<Vec<Arc<PipeState>>>,
}

/// A process-local network of in-memory connections.
///
/// Clone the network and hand it to several sockets via
/// [`Socket::with_transport`](tether_core::Socket::with_transport); a
/// `listen` on one socket then rendezvouses with a `connect` on another
/// using the same `(host, port)` key.
#[derive(Clone)]
pub struct MemoryNetwork(Arc<NetInner>);

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    /// Create an empty network
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(NetInner {
            listeners: Mutex::new(HashMap::new()),
            rendezvous: Condvar::new(),
            links: Mutex::new(Vec::new()),
        }))
    }

    fn lock_listeners(&self) -> MutexGuard<'_, HashMap<(String, u16), ListenSlot>> {
        self.0.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Abruptly kill every connection ever established on this network.
    ///
    /// Blocked reads and subsequent writes on both sides fail with
    /// `ConnectionReset`, as if the peer process died.
    pub fn sever_all(&self) {
        let links = self.0.links.lock().unwrap_or_else(PoisonError::into_inner);
        for pipe in links.iter() {
            pipe.sever();
        }
    }
}

impl Transport for MemoryNetwork {
    fn dial(&self, host: &str, port: u16, timeout: Duration) -> io::Result<SplitConnection> {
        let key = (host.to_string(), port);
        let deadline = Instant::now() + timeout;

        let mut listeners = self.lock_listeners();
        loop {
            if let Some(slot @ ListenSlot::Waiting) = listeners.get_mut(&key) {
                let (listener_end, dialer_end, pipes) = endpoint_pair();
                *slot = ListenSlot::Ready(listener_end);

                self.0
                    .links
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(pipes);

                self.0.rendezvous.notify_all();
                return Ok(dialer_end);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("no listener at {host}:{port}"),
                ));
            }
            let (guard, _timed_out) = self
                .0
                .rendezvous
                .wait_timeout(listeners, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            listeners = guard;
        }
    }

    fn accept_once(&self, host: &str, port: u16) -> io::Result<SplitConnection> {
        let key = (host.to_string(), port);

        let mut listeners = self.lock_listeners();
        if listeners.contains_key(&key) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{host}:{port} already has a listener"),
            ));
        }
        listeners.insert(key.clone(), ListenSlot::Waiting);
        self.0.rendezvous.notify_all();

        loop {
            if matches!(listeners.get(&key), Some(ListenSlot::Ready(_))) {
                let Some(ListenSlot::Ready(conn)) = listeners.remove(&key) else {
                    unreachable!("slot was just observed ready");
                };
                return Ok(conn);
            }
            listeners = self
                .0
                .rendezvous
                .wait(listeners)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn rendezvous_and_round_trip() {
        let net = MemoryNetwork::new();

        let server = {
            let net = net.clone();
            thread::spawn(move || {
                let mut conn = net.accept_once("hub", 1).unwrap();
                let mut buf = [0u8; 4];
                conn.reader.read_exact(&mut buf).unwrap();
                conn.writer.write_all(&buf).unwrap();
                buf
            })
        };

        let mut conn = net.dial("hub", 1, Duration::from_secs(1)).unwrap();
        conn.writer.write_all(b"ping").unwrap();

        let mut echo = [0u8; 4];
        conn.reader.read_exact(&mut echo).unwrap();

        assert_eq!(&echo, b"ping");
        assert_eq!(&server.join().unwrap(), b"ping");
    }

    #[test]
    fn dial_without_listener_times_out() {
        let net = MemoryNetwork::new();
        let err = net.dial("nowhere", 9, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn shutdown_gives_clean_eof() {
        let net = MemoryNetwork::new();

        let server = {
            let net = net.clone();
            thread::spawn(move || net.accept_once("hub", 2).unwrap())
        };
        let conn = net.dial("hub", 2, Duration::from_secs(1)).unwrap();
        let mut peer = server.join().unwrap();

        conn.shutdown.shutdown();

        let mut buf = [0u8; 1];
        assert_eq!(peer.reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn sever_breaks_blocked_read() {
        let net = MemoryNetwork::new();

        let server = {
            let net = net.clone();
            thread::spawn(move || net.accept_once("hub", 3).unwrap())
        };
        let _conn = net.dial("hub", 3, Duration::from_secs(1)).unwrap();
        let mut peer = server.join().unwrap();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 1];
            peer.reader.read(&mut buf)
        });

        thread::sleep(Duration::from_millis(20));
        net.sever_all();

        let outcome = reader.join().unwrap();
        assert_eq!(outcome.unwrap_err().kind(), io::ErrorKind::ConnectionReset);
    }
}
