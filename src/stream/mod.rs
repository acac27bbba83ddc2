//! Byte stream abstraction between the protocol logic and the transport.
//!
//! The driver and the simulator both talk to a [`ByteStream`]: an opaque
//! full-duplex byte pipe with a settable DTR line. Swapping the backend is
//! how the pair is tested: an in-memory [`duplex`](pipe::duplex) pipe joins
//! a driver to a simulator in-process, while `serial::SerialStream` (feature
//! `serial`) talks to real hardware.
//!
//! All capabilities take `&self`: the driver's reader thread and its command
//! writers share one stream, with the reader only ever reading and writers
//! only ever writing. Implementations serialize internally where the
//! underlying handle needs it.

use std::io;

pub mod pipe;

#[cfg(feature = "serial")]
pub mod serial;

/// A full-duplex byte pipe with a DTR reset line.
pub trait ByteStream: Send + Sync {
    /// Writes all of `bytes`, blocking up to the transport's write deadline.
    ///
    /// A deadline overrun surfaces as [`io::ErrorKind::TimedOut`]; any other
    /// error means the medium failed.
    fn write_all(&self, bytes: &[u8]) -> io::Result<()>;

    /// Blocks until one byte is available and returns it.
    ///
    /// Fails once the stream is closed, including a close that happens while
    /// the caller is already blocked.
    fn read_one(&self) -> io::Result<u8>;

    /// Asserts (`true`) or deasserts (`false`) the DTR line.
    fn set_dtr(&self, level: bool) -> io::Result<()>;

    /// Shuts the stream down. Idempotent; unblocks any in-progress
    /// [`read_one`](ByteStream::read_one).
    fn close(&self);
}
