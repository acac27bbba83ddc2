//! Error taxonomy of the 26A driver and simulator.
//!
//! Argument validation always happens before any I/O, so an
//! [`Error::InvalidArgument`] leaves the device untouched. Timeouts are
//! reported, never retried. An I/O failure on the reader thread closes the
//! driver and wakes blocked consumers with [`Error::Shutdown`]; an I/O
//! failure on a writer only reaches that caller.

use std::io;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong talking to a 26A.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument violated a precondition (ID range, message length,
    /// forbidden byte, empty range). No I/O was performed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The driver has been closed; create a new one instead of reusing it.
    #[error("driver is closed")]
    Closed,

    /// The driver shut down while the caller was blocked on it.
    #[error("driver is shutting down")]
    Shutdown,

    /// The byte stream refused the command bytes within the write deadline.
    #[error("timed out writing command to the device")]
    WriteTimeout,

    /// No acknowledge arrived within the response deadline.
    #[error("timed out waiting for the device to acknowledge")]
    ResponseTimeout,

    /// `next_button` elapsed with no press available.
    #[error("timed out waiting for a button press")]
    ButtonTimeout,

    /// The device answered, but the payload does not match the command's
    /// contract. The driver stays open; the response queue self-clears.
    #[error("unexpected response from device: {0}")]
    UnexpectedResponse(String),

    /// The underlying medium failed (closed, disconnected, OS error).
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
}
