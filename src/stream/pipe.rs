//! In-memory duplex byte pipe.
//!
//! [`duplex`] returns two connected [`PipeEnd`]s: bytes written to one end
//! are read from the other, in order. The pipe carries the DTR level of each
//! end so a test can observe reset pulses. Closing either end shuts down
//! both directions and wakes every blocked reader.
//!
//! This is the transport that joins a driver to a simulator in-process, and
//! the stand-in for real hardware in the test suites.

use core::fmt;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::queue::relock;
use crate::stream::ByteStream;

#[derive(Default)]
struct Channel {
    bytes: VecDeque<u8>,
    closed: bool,
    dtr: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<Channel>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Channel> {
        relock(self.state.lock())
    }

    fn push(&self, bytes: &[u8]) -> io::Result<()> {
        let mut chan = self.lock();
        if chan.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe is closed"));
        }
        chan.bytes.extend(bytes);
        self.ready.notify_all();
        Ok(())
    }

    fn pull(&self) -> io::Result<u8> {
        let mut chan = self.lock();
        loop {
            if let Some(b) = chan.bytes.pop_front() {
                return Ok(b);
            }
            if chan.closed {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe is closed"));
            }
            chan = relock(self.ready.wait(chan));
        }
    }

    fn shutdown(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

/// One end of an in-memory duplex pipe.
pub struct PipeEnd {
    /// Bytes flowing out of this end, into the peer.
    tx: Arc<Shared>,
    /// Bytes flowing into this end, out of the peer.
    rx: Arc<Shared>,
}

/// Creates a connected pair of pipe ends.
pub fn duplex() -> (PipeEnd, PipeEnd) {
    let a_to_b = Arc::new(Shared::default());
    let b_to_a = Arc::new(Shared::default());
    (
        PipeEnd {
            tx: Arc::clone(&a_to_b),
            rx: Arc::clone(&b_to_a),
        },
        PipeEnd {
            tx: b_to_a,
            rx: a_to_b,
        },
    )
}

impl PipeEnd {
    /// The DTR level most recently set by the peer end.
    pub fn peer_dtr(&self) -> bool {
        self.rx.lock().dtr
    }
}

impl ByteStream for PipeEnd {
    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        self.tx.push(bytes)
    }

    fn read_one(&self) -> io::Result<u8> {
        self.rx.pull()
    }

    fn set_dtr(&self, level: bool) -> io::Result<()> {
        let mut chan = self.tx.lock();
        if chan.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe is closed"));
        }
        chan.dtr = level;
        Ok(())
    }

    fn close(&self) {
        self.tx.shutdown();
        self.rx.shutdown();
    }
}

impl Drop for PipeEnd {
    fn drop(&mut self) {
        // An abandoned end must never leave the peer blocked.
        self.close();
    }
}

impl fmt::Debug for PipeEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tx = self.tx.lock();
        let rx = self.rx.lock();
        f.debug_struct("PipeEnd")
            .field("tx_pending", &tx.bytes.len())
            .field("rx_pending", &rx.bytes.len())
            .field("closed", &(tx.closed || rx.closed))
            .finish()
    }
}
