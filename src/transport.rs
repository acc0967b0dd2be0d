//! Narrow abstractions the protocol engine depends on instead of talking
//! to sockets, files and the system clock directly. Keeping the state
//! machines behind `Clock`, `Transport` and `FileSink` is what lets the
//! test suite drive a full sender/receiver pair over an in-memory channel
//! with a controllable clock, deterministically.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::UdpSocket;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::StpError;

/// Milliseconds since some fixed but otherwise unspecified epoch. Only
/// differences between two calls are meaningful.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

/// A connected datagram channel: every `send` goes to the one peer this
/// transport was constructed against, and `recv_timeout` reads the next
/// datagram from that peer only.
pub trait Transport: Send + Sync {
    fn send(&self, bytes: &[u8]) -> Result<(), StpError>;

    /// Blocks until a datagram arrives or `timeout` elapses. `Ok(None)`
    /// signals a timeout, which callers treat as a `Timeout`, not an
    /// error.
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, StpError>;
}

/// A place the receiver appends decoded file bytes to, in `expct_seqno`
/// order.
pub trait FileSink: Send + Sync {
    fn append(&self, bytes: &[u8]) -> Result<(), StpError>;
}

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds to `(127.0.0.1, my_port)` and connects to `(127.0.0.1,
    /// peer_port)`, matching the loopback-only environment the driver
    /// operates in.
    pub fn connect(my_port: u16, peer_port: u16) -> Result<UdpTransport, StpError> {
        let socket = UdpSocket::bind(("127.0.0.1", my_port)).map_err(StpError::from_io)?;
        socket.connect(("127.0.0.1", peer_port)).map_err(StpError::from_io)?;
        Ok(UdpTransport { socket })
    }
}

impl Transport for UdpTransport {
    fn send(&self, bytes: &[u8]) -> Result<(), StpError> {
        self.socket.send(bytes).map_err(StpError::from_io)?;
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, StpError> {
        self.socket.set_read_timeout(Some(timeout)).map_err(StpError::from_io)?;

        let mut buf = [0u8; crate::codec::MSS + 4];
        match self.socket.recv(&mut buf) {
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(StpError::from_io(e)),
        }
    }
}

pub struct FileWriterSink {
    file: Mutex<std::fs::File>,
}

impl FileWriterSink {
    pub fn create(path: &str) -> Result<FileWriterSink, StpError> {
        let file = std::fs::File::create(path).map_err(StpError::from_io)?;
        Ok(FileWriterSink { file: Mutex::new(file) })
    }
}

impl FileSink for FileWriterSink {
    fn append(&self, bytes: &[u8]) -> Result<(), StpError> {
        let mut file = self.file.lock().unwrap();
        file.write_all(bytes).map_err(StpError::from_io)?;
        Ok(())
    }
}

/// An in-memory, lossless pipe between two endpoints' `Transport`
/// instances, used by deterministic unit and integration tests. Loss is
/// applied by the protocol engine itself via `LossSimulator`, not here.
pub struct ChannelTransport {
    inbox: Mutex<VecDeque<Vec<u8>>>,
    cvar: Condvar,
    peer: Mutex<Option<std::sync::Weak<ChannelTransport>>>,
}

impl ChannelTransport {
    /// Builds a connected pair, each half holding a weak reference to the
    /// other so drop order doesn't matter for tests.
    pub fn pair() -> (std::sync::Arc<ChannelTransport>, std::sync::Arc<ChannelTransport>) {
        let a = std::sync::Arc::new(ChannelTransport {
            inbox: Mutex::new(VecDeque::new()),
            cvar: Condvar::new(),
            peer: Mutex::new(None),
        });
        let b = std::sync::Arc::new(ChannelTransport {
            inbox: Mutex::new(VecDeque::new()),
            cvar: Condvar::new(),
            peer: Mutex::new(None),
        });
        *a.peer.lock().unwrap() = Some(std::sync::Arc::downgrade(&b));
        *b.peer.lock().unwrap() = Some(std::sync::Arc::downgrade(&a));
        (a, b)
    }

    fn deliver(&self, bytes: Vec<u8>) {
        self.inbox.lock().unwrap().push_back(bytes);
        self.cvar.notify_one();
    }
}

impl Transport for ChannelTransport {
    fn send(&self, bytes: &[u8]) -> Result<(), StpError> {
        let peer = self.peer.lock().unwrap().as_ref().and_then(|w| w.upgrade());
        if let Some(peer) = peer {
            peer.deliver(bytes.to_vec());
        }
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, StpError> {
        let mut inbox = self.inbox.lock().unwrap();
        if inbox.is_empty() {
            let (guard, result) =
                self.cvar.wait_timeout_while(inbox, timeout, |q| q.is_empty()).unwrap();
            inbox = guard;
            if result.timed_out() && inbox.is_empty() {
                return Ok(None);
            }
        }
        Ok(inbox.pop_front())
    }
}

/// An in-memory file sink that just accumulates bytes, for tests that
/// assert on the reassembled output without touching the filesystem.
pub struct MemorySink {
    buf: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink { buf: Mutex::new(Vec::new()) }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap().clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        MemorySink::new()
    }
}

impl FileSink for MemorySink {
    fn append(&self, bytes: &[u8]) -> Result<(), StpError> {
        self.buf.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}
