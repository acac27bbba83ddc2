//! Serial-port implementation of [`ByteStream`].
//!
//! Opens the console's link at 10752 baud, 8 data bits, odd parity, one stop
//! bit, and drives the DTR line for resets. The write side carries the
//! 100 ms command deadline; the read side polls in 300 ms slices so that
//! [`close`](ByteStream::close) is observed even while no traffic arrives.

use core::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serialport::{DataBits, Parity, SerialPort, StopBits};

use crate::consts::{BAUD_RATE, WRITE_TIMEOUT};
use crate::queue::relock;
use crate::stream::ByteStream;

/// Poll interval of the blocking read loop between liveness checks.
const READ_POLL: Duration = Duration::from_millis(300);

/// A [`ByteStream`] backed by a local serial device.
///
/// The port is cloned into independent read and write handles so the
/// driver's reader thread can block on input while command writers transmit.
pub struct SerialStream {
    reader: Mutex<Box<dyn SerialPort>>,
    writer: Mutex<Box<dyn SerialPort>>,
    open: AtomicBool,
}

impl SerialStream {
    /// Opens the serial device at `path` with the console's line parameters.
    ///
    /// # Errors
    /// Any failure opening or configuring the device surfaces as an
    /// [`io::Error`].
    pub fn open(path: &str) -> io::Result<SerialStream> {
        let reader = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::Odd)
            .stop_bits(StopBits::One)
            .timeout(READ_POLL)
            .open()
            .map_err(io::Error::from)?;
        let mut writer = reader.try_clone().map_err(io::Error::from)?;
        writer.set_timeout(WRITE_TIMEOUT).map_err(io::Error::from)?;
        Ok(SerialStream {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            open: AtomicBool::new(true),
        })
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "serial stream is closed")
    }
}

impl ByteStream for SerialStream {
    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Self::closed_error());
        }
        let mut port = relock(self.writer.lock());
        port.write_all(bytes)?;
        port.flush()
    }

    fn read_one(&self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        let mut port = relock(self.reader.lock());
        loop {
            if !self.open.load(Ordering::Acquire) {
                return Err(Self::closed_error());
            }
            match port.read(&mut buf) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(_) => return Ok(buf[0]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn set_dtr(&self, level: bool) -> io::Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Self::closed_error());
        }
        relock(self.writer.lock())
            .write_data_terminal_ready(level)
            .map_err(io::Error::from)
    }

    fn close(&self) {
        // The read loop notices on its next poll slice; the handles close
        // when the stream is dropped.
        self.open.store(false, Ordering::Release);
    }
}

impl fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = relock(self.reader.lock()).name();
        f.debug_struct("SerialStream")
            .field("port", &name)
            .field("open", &self.open.load(Ordering::Acquire))
            .finish()
    }
}
