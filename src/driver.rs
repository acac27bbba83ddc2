//! Host-side driver for the AT&T 26A Direct Extension Selector Console.
//!
//! This module provides the [`Att26a`] struct, which speaks the console's
//! framed half-duplex protocol over any [`ByteStream`]: it encodes and
//! transmits commands, awaits the device's acknowledge, and demultiplexes
//! the inbound byte stream into button events and command responses.
//!
//! ## Receive path
//!
//! A single background reader thread owns all inbound traffic. Every byte it
//! reads falls into one of four categories:
//!
//! - high bit clear: a button event, un-rotated and queued for
//!   [`next_button`](Att26a::next_button)
//! - `0xFF`: keep-alive, discarded
//! - `0xFD`: acknowledge, delivering the accumulated response bytes to the
//!   writer blocked on the in-flight command
//! - anything else: a response payload byte, accumulated
//!
//! ## Send path
//!
//! Commands are serialized by an internal mutex: the driver writes one frame
//! and blocks up to 100 ms for the matching acknowledge. The protocol has no
//! correlation IDs, so there is never more than one command in flight.
//!
//! ## Lifecycle
//!
//! `Opened → Closed`, never back. [`close`](Att26a::close) (or an I/O
//! failure on the reader thread) interrupts both queues so every blocked
//! caller wakes with [`Error::Shutdown`]. [`reset`](Att26a::reset) pulses
//! DTR, replaces both queues, and starts a reader of a new generation; a
//! stale reader notices the generation change and exits on its own.
//!
//! ## Example
//!
//! ```rust
//! use att26a::consts::LedMode;
//! use att26a::driver::Att26a;
//! use att26a::simulator::{ConsoleState, Simulator};
//! use att26a::stream::pipe;
//!
//! let (host, device) = pipe::duplex();
//! let _sim = Simulator::spawn(device, ConsoleState::new())?;
//!
//! let driver = Att26a::open(host)?;
//! driver.set_led_state(LedMode::On, 5)?;
//! assert_eq!(driver.get_led_status(110)?, LedMode::Off);
//! driver.close();
//! # Ok::<(), att26a::error::Error>(())
//! ```

use core::fmt;
use core::mem;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::consts::{
    ACK_TIMEOUT, BUTTON_QUEUE_CAPACITY, CMD_READ, CMD_WRITE, LED_COUNT, LOWER_RANGE_START, LedMode,
    MAX_RANGE_STATES, MAX_RAW_RANGE, MSG_ACK, MSG_KA, PARAM_FACTORY_TEST_OFF,
    PARAM_FACTORY_TEST_ON, PARAM_IO_ENABLE_OFF, PARAM_IO_ENABLE_ON, READER_CLOSE_TIMEOUT,
    READER_STOP_TIMEOUT, RESET_HOLD, SUB_FACTORY_TEST_OFF, SUB_FACTORY_TEST_ON, SUB_IO_ENABLE_OFF,
    SUB_IO_ENABLE_ON, SUB_LED_RANGE, SUB_LED_STATE, UNSUPPORTED_RAW_RANGE, UPPER_RANGE_MAX,
};
use crate::encoding::{frame, pack_states, rotl7, rotr7};
use crate::error::{Error, Result};
use crate::queue::{InterruptibleQueue, PopError, relock};
use crate::stream::ByteStream;

/// The pair of inbound queues belonging to one reader generation.
struct Queues {
    buttons: Arc<InterruptibleQueue<u8>>,
    responses: Arc<InterruptibleQueue<Vec<u8>>>,
}

impl Queues {
    fn fresh() -> Queues {
        Queues {
            buttons: Arc::new(InterruptibleQueue::bounded(BUTTON_QUEUE_CAPACITY)),
            responses: Arc::new(InterruptibleQueue::unbounded()),
        }
    }

    fn clone_handles(&self) -> Queues {
        Queues {
            buttons: Arc::clone(&self.buttons),
            responses: Arc::clone(&self.responses),
        }
    }
}

/// State shared between the driver handle and its reader thread.
struct Shared {
    stream: Arc<dyn ByteStream>,
    open: AtomicBool,
    /// Bumped by every reset; a reader whose generation no longer matches
    /// discards its in-flight byte and exits.
    generation: AtomicU64,
    queues: Mutex<Queues>,
}

impl Shared {
    fn reader_live(&self, generation: u64) -> bool {
        self.open.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    /// Marks the driver closed, wakes all blocked consumers, and shuts the
    /// stream down. Safe to call from any thread, any number of times.
    fn shut_down(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let queues = relock(self.queues.lock());
            queues.responses.interrupt_all_consumers();
            queues.buttons.interrupt_all_consumers();
            drop(queues);
            self.stream.close();
        }
    }
}

/// Driver for the AT&T 26A Direct Extension Selector Console.
///
/// Provides functions to read button presses and set LED states on 26A
/// hardware reachable through any [`ByteStream`].
///
/// All methods take `&self`; the driver may be shared across threads, though
/// commands are serialized internally and callers must not rely on any
/// particular interleaving of concurrent commands.
///
/// Dropping the driver closes it.
pub struct Att26a {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Serializes command writers: one frame in flight, one acknowledge
    /// awaited, at a time.
    command: Mutex<()>,
}

impl Att26a {
    /// Opens a driver over `stream`, resetting the device and starting the
    /// background reader.
    ///
    /// # Errors
    /// [`Error::Io`] if the reset's DTR transitions fail or the reader
    /// thread cannot be spawned.
    pub fn open<S: ByteStream + 'static>(stream: S) -> Result<Att26a> {
        let stream: Arc<dyn ByteStream> = Arc::new(stream);
        let driver = Att26a {
            shared: Arc::new(Shared {
                stream,
                open: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                queues: Mutex::new(Queues::fresh()),
            }),
            reader: Mutex::new(None),
            command: Mutex::new(()),
        };
        driver.reset()?;
        Ok(driver)
    }

    /// Opens a driver on the serial device at `path`.
    ///
    /// The port is configured to the console's line parameters: 10752 baud,
    /// 8 data bits, odd parity, one stop bit.
    #[cfg(feature = "serial")]
    pub fn open_serial(path: &str) -> Result<Att26a> {
        let stream = crate::stream::serial::SerialStream::open(path)?;
        info!("opened 26A serial device {path}");
        Self::open(stream)
    }

    /// Whether the driver is still usable.
    ///
    /// Once this returns `false` it never returns `true` again; create a new
    /// driver instead of reusing a closed one.
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Executes a complete power-on reset of the 26A.
    ///
    /// Holds DTR low for 100 ms, replaces both inbound queues, and restarts
    /// the reader thread. Consumers blocked on the pre-reset queues keep
    /// waiting until their own timeouts; the reset itself never fails on
    /// their account. A previous reader that will not stop within 2 s is
    /// logged and abandoned.
    pub fn reset(&self) -> Result<()> {
        // Force the device into reset.
        self.shared.stream.set_dtr(false)?;
        thread::sleep(RESET_HOLD);

        // Invalidate the running reader and wait for it to notice.
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(handle) = relock(self.reader.lock()).take() {
            join_with_timeout(handle, READER_STOP_TIMEOUT);
        }

        // Fresh queues for the new generation.
        let queues = Queues::fresh();
        *relock(self.shared.queues.lock()) = queues.clone_handles();

        // Exit device reset.
        self.shared.stream.set_dtr(true)?;

        // (Re)start the reader.
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("att26a-reader".into())
            .spawn(move || reader_loop(&shared, generation, &queues))?;
        *relock(self.reader.lock()) = Some(handle);
        Ok(())
    }

    /// Closes the driver.
    ///
    /// Interrupts both queues so every blocked caller wakes with
    /// [`Error::Shutdown`], closes the byte stream, and stops the reader
    /// thread. Idempotent.
    pub fn close(&self) {
        self.shared.shut_down();
        if let Some(handle) = relock(self.reader.lock()).take() {
            join_with_timeout(handle, READER_CLOSE_TIMEOUT);
        }
    }

    /// Reads a single button press off of the button event queue.
    ///
    /// # Arguments
    /// - `timeout`: `None` blocks until a press arrives (or the driver
    ///   closes); `Some(d)` gives up after `d`.
    ///
    /// # Errors
    /// - [`Error::ButtonTimeout`] when the deadline elapses
    /// - [`Error::Shutdown`] when the driver closes while waiting
    pub fn next_button(&self, timeout: Option<Duration>) -> Result<u8> {
        let buttons = Arc::clone(&relock(self.shared.queues.lock()).buttons);
        match buttons.pop(timeout) {
            Ok(id) => Ok(id),
            Err(PopError::TimedOut) => Err(Error::ButtonTimeout),
            Err(PopError::Interrupted) => Err(Error::Shutdown),
        }
    }

    /// Sets an individual LED to one of the four supported states.
    ///
    /// Works on the full ID range 0..=119.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] for IDs past 119 (no I/O performed)
    /// - [`Error::UnexpectedResponse`] if the device returns data (this
    ///   command is acknowledged with an empty response)
    /// - the transaction errors of any command: [`Error::Closed`],
    ///   [`Error::Shutdown`], [`Error::WriteTimeout`],
    ///   [`Error::ResponseTimeout`], [`Error::Io`]
    pub fn set_led_state(&self, mode: LedMode, led_id: u8) -> Result<()> {
        if led_id >= LED_COUNT {
            return Err(Error::InvalidArgument(format!(
                "ledID must be smaller than {LED_COUNT}; not {led_id}"
            )));
        }
        let ret = self.transact(&[CMD_WRITE, SUB_LED_STATE | mode.wire(), rotl7(led_id)])?;
        if !ret.is_empty() {
            self.discard_responses();
            return Err(Error::UnexpectedResponse(format!(
                "set_led_state expects no return data, got {}",
                hex::encode(&ret)
            )));
        }
        Ok(())
    }

    /// Sets an individual LED to the OFF state.
    pub fn set_led_off(&self, led_id: u8) -> Result<()> {
        self.set_led_state(LedMode::Off, led_id)
    }

    /// Sets an individual LED to the BLINK1 state.
    pub fn set_led_blink1(&self, led_id: u8) -> Result<()> {
        self.set_led_state(LedMode::Blink1, led_id)
    }

    /// Sets an individual LED to the BLINK2 state.
    pub fn set_led_blink2(&self, led_id: u8) -> Result<()> {
        self.set_led_state(LedMode::Blink2, led_id)
    }

    /// Sets an individual LED to the ON state.
    pub fn set_led_on(&self, led_id: u8) -> Result<()> {
        self.set_led_state(LedMode::On, led_id)
    }

    /// Sets a range of upper-range LEDs (IDs 0..=99) to ON or OFF.
    ///
    /// Starting at `start`, applies one on/off state per entry of `states`
    /// (`true` means ON). If `start` plus the length runs past LED 99 the
    /// write wraps around to LED 0, as the hardware itself does.
    ///
    /// Up to 100 states may be written at a time. The device caps one
    /// message at 77 states and refuses exactly 71, so longer (and
    /// length-71) writes are split into two messages transparently.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a start past 99, an empty `states`, or
    /// more than 100 states; otherwise the transaction errors of any
    /// command.
    pub fn set_led_range(&self, start: u8, states: &[bool]) -> Result<()> {
        if start > UPPER_RANGE_MAX {
            return Err(Error::InvalidArgument(format!(
                "start must be between 0 and {UPPER_RANGE_MAX}; not {start}"
            )));
        }
        let count = states.len();
        if count == 0 {
            return Err(Error::InvalidArgument("states can not be empty".into()));
        }
        if count > MAX_RANGE_STATES {
            return Err(Error::InvalidArgument(format!(
                "only up to {MAX_RANGE_STATES} leds may be set at a time, not {count}"
            )));
        }

        let second = if count == UNSUPPORTED_RAW_RANGE {
            1
        } else if count > MAX_RAW_RANGE {
            count - MAX_RAW_RANGE
        } else {
            0
        };
        let first = count - second;

        self.write_led_range(start, &states[..first])?;
        if second > 0 {
            // The hardware wraps past LED 99 back to 0; the split mirrors
            // that.
            let wrapped = ((start as usize + first) % 100) as u8;
            self.write_led_range(wrapped, &states[first..])?;
        }
        Ok(())
    }

    /// Writes one raw range message. Lengths the device refuses (0, 71,
    /// more than 77) are rejected here; `set_led_range` never produces
    /// them.
    fn write_led_range(&self, start: u8, states: &[bool]) -> Result<()> {
        if start > UPPER_RANGE_MAX {
            return Err(Error::InvalidArgument(format!(
                "start must be between 0 and {UPPER_RANGE_MAX}; not {start}"
            )));
        }
        let count = states.len();
        if count == 0 {
            return Err(Error::InvalidArgument("states can not be empty".into()));
        }
        if count == UNSUPPORTED_RAW_RANGE {
            return Err(Error::InvalidArgument(
                "the device does not support setting 71 leds at once".into(),
            ));
        }
        if count > MAX_RAW_RANGE {
            return Err(Error::InvalidArgument(format!(
                "only up to {MAX_RAW_RANGE} leds may be set in one message, not {count}"
            )));
        }

        // The on-wire count is one less than the state count, except that a
        // count of 70 travels as 70.
        let wire_count = if count == 70 { 70 } else { (count - 1) as u8 };

        let mut payload = vec![CMD_WRITE, SUB_LED_RANGE, rotl7(start), wire_count];
        payload.extend_from_slice(&pack_states(states));
        let _ = self.transact(&payload)?;
        Ok(())
    }

    /// Enables or disables the factory test mode.
    ///
    /// The factory test mode blinks rows of LEDs on the 26A, and is good to
    /// quickly check that all the LEDs work. While it is on, LED states can
    /// still be set but are not displayed until the mode is disabled again.
    pub fn set_factory_test(&self, enable: bool) -> Result<()> {
        let payload = if enable {
            [CMD_WRITE, SUB_FACTORY_TEST_ON, PARAM_FACTORY_TEST_ON]
        } else {
            [CMD_WRITE, SUB_FACTORY_TEST_OFF, PARAM_FACTORY_TEST_OFF]
        };
        let _ = self.transact(&payload)?;
        Ok(())
    }

    /// Enables or disables the 26A's I/O controller (on by default after a
    /// reset).
    ///
    /// The I/O controller powers the LEDs and scans the buttons. While it is
    /// disabled, LED states can be set but are not displayed, and button
    /// presses are ignored completely rather than buffered.
    pub fn set_io_enable(&self, enable: bool) -> Result<()> {
        let payload = if enable {
            [CMD_WRITE, SUB_IO_ENABLE_ON, PARAM_IO_ENABLE_ON]
        } else {
            [CMD_WRITE, SUB_IO_ENABLE_OFF, PARAM_IO_ENABLE_OFF]
        };
        let _ = self.transact(&payload)?;
        Ok(())
    }

    /// Reads the state of an individual LED on the bottom two rows.
    ///
    /// Only the lower range (IDs 100..=119) is readable. This command is not
    /// terribly useful on real hardware; keeping track of the LED states on
    /// the host side is usually the better plan.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] for IDs outside 100..=119
    /// - [`Error::UnexpectedResponse`] if the reply is malformed or echoes a
    ///   different LED ID
    /// - the transaction errors of any command
    pub fn get_led_status(&self, led_id: u8) -> Result<LedMode> {
        if !(LOWER_RANGE_START..LED_COUNT).contains(&led_id) {
            return Err(Error::InvalidArgument(format!(
                "ledID must be {LOWER_RANGE_START} <= ledID < {LED_COUNT}; not {led_id}"
            )));
        }

        let ret = self.transact(&[CMD_READ, SUB_LED_STATE, rotl7(led_id)])?;
        match decode_led_status(&ret) {
            Some((id, mode)) if id == led_id => Ok(mode),
            Some((id, _)) => {
                self.discard_responses();
                Err(Error::UnexpectedResponse(format!(
                    "wrong ID; got {id}, expected {led_id}"
                )))
            }
            None => {
                self.discard_responses();
                Err(Error::UnexpectedResponse(format!(
                    "malformed status reply: {}",
                    hex::encode(&ret)
                )))
            }
        }
    }

    /// Frames `payload`, writes it, and returns the response bytes delivered
    /// with the device's acknowledge.
    fn transact(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        let framed = frame(payload)?;

        let _in_flight = relock(self.command.lock());
        let responses = Arc::clone(&relock(self.shared.queues.lock()).responses);

        debug!("TX: {}", hex::encode(&framed));
        self.shared.stream.write_all(&framed).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                Error::WriteTimeout
            } else {
                Error::Io(e)
            }
        })?;

        match responses.pop(Some(ACK_TIMEOUT)) {
            Ok(data) => Ok(data),
            Err(PopError::TimedOut) => Err(Error::ResponseTimeout),
            Err(PopError::Interrupted) => Err(Error::Shutdown),
        }
    }

    /// Throws away any queued responses after a contract violation, so a
    /// stray reply cannot poison the next transaction.
    fn discard_responses(&self) {
        relock(self.shared.queues.lock()).responses.drain();
    }
}

impl Drop for Att26a {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Att26a {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Att26a")
            .field("open", &self.is_open())
            .field("generation", &self.shared.generation.load(Ordering::Acquire))
            .finish()
    }
}

/// Decodes a status reply into the echoed LED ID and mode.
///
/// One-byte replies cover IDs 100..=107 (offset in bits 0..=2, bit 3
/// clear); two-byte replies cover 108..=119 (bit 3 set, offset in the
/// second byte). Returns `None` when the reply fits neither form.
fn decode_led_status(ret: &[u8]) -> Option<(u8, LedMode)> {
    let first = *ret.first()?;
    let id = if first & 0x08 != 0 {
        if ret.len() != 2 {
            return None;
        }
        (ret[1] & 0x1F) + LOWER_RANGE_START
    } else {
        if ret.len() != 1 {
            return None;
        }
        (first & 0x07) + LOWER_RANGE_START
    };
    Some((id, LedMode::from_index((first >> 4) & 3)))
}

/// Body of the background reader thread for one generation.
fn reader_loop(shared: &Shared, generation: u64, queues: &Queues) {
    let mut response: Vec<u8> = Vec::new();
    while shared.reader_live(generation) {
        let byte = match shared.stream.read_one() {
            Ok(byte) => byte,
            Err(e) => {
                if shared.reader_live(generation) {
                    error!("26A closing due to error on receiver thread: {e}");
                    shared.shut_down();
                }
                break;
            }
        };
        // A byte that arrives across a reset belongs to the next generation's
        // queues; drop it and leave.
        if !shared.reader_live(generation) {
            break;
        }

        if byte & 0x80 == 0 {
            let id = rotr7(byte);
            info!("26A btn {id} pressed");
            if !queues.buttons.push(id) {
                debug!("button queue full, dropping press {id}");
            }
        } else if byte == MSG_KA {
            // Keep-alive; proves the device is up.
        } else if byte == MSG_ACK {
            debug!("response: {}", hex::encode(&response));
            let _ = queues.responses.push(mem::take(&mut response));
        } else {
            response.push(byte);
        }
    }
}

/// Joins `handle`, giving up after `limit`. A thread that will not stop is
/// logged and abandoned rather than blocking shutdown.
fn join_with_timeout(handle: JoinHandle<()>, limit: Duration) {
    let deadline = Instant::now() + limit;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            log::warn!("26A reader thread did not stop in time; abandoning it");
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    let _ = handle.join();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FRAME_END;
    use crate::stream::pipe::{PipeEnd, duplex};
    use std::sync::Mutex as StdMutex;

    /// Plays the device side of the link: records every received byte and
    /// answers each complete frame with the next scripted reply (a bare ACK
    /// once the script runs out).
    fn scripted_device(
        end: PipeEnd,
        replies: Vec<Vec<u8>>,
    ) -> (Arc<StdMutex<Vec<u8>>>, JoinHandle<()>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let handle = {
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let mut replies = replies.into_iter();
                while let Ok(byte) = end.read_one() {
                    seen.lock().unwrap().push(byte);
                    if byte == FRAME_END {
                        let reply = replies.next().unwrap_or_else(|| vec![MSG_ACK]);
                        if end.write_all(&reply).is_err() {
                            break;
                        }
                    }
                }
            })
        };
        (seen, handle)
    }

    fn open_with_device(replies: Vec<Vec<u8>>) -> (Att26a, Arc<StdMutex<Vec<u8>>>, JoinHandle<()>) {
        let (host, device) = duplex();
        let (seen, handle) = scripted_device(device, replies);
        let driver = Att26a::open(host).unwrap();
        (driver, seen, handle)
    }

    #[test]
    fn test_lifecycle_open_then_close() {
        let (driver, _seen, device) = open_with_device(Vec::new());
        assert!(driver.is_open());
        driver.close();
        assert!(!driver.is_open());
        // Idempotent.
        driver.close();
        assert!(matches!(
            driver.set_led_state(LedMode::On, 0),
            Err(Error::Closed)
        ));
        assert!(matches!(driver.next_button(None), Err(Error::Shutdown)));
        device.join().unwrap();
    }

    #[test]
    fn test_set_led_state_wire_bytes() {
        let (driver, seen, device) = open_with_device(Vec::new());
        driver.set_led_state(LedMode::On, 5).unwrap();
        driver.close();
        device.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0x85, 0x2F, 0x0A, 0x5A, 0xFF]);
    }

    #[test]
    fn test_set_led_state_rejects_bad_id() {
        let (driver, seen, device) = open_with_device(Vec::new());
        assert!(matches!(
            driver.set_led_state(LedMode::Off, 120),
            Err(Error::InvalidArgument(_))
        ));
        driver.close();
        device.join().unwrap();
        // Validation failed before any I/O.
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_led_state_rejects_unexpected_data() {
        let (driver, _seen, device) = open_with_device(vec![vec![0x99, MSG_ACK]]);
        assert!(matches!(
            driver.set_led_state(LedMode::Off, 3),
            Err(Error::UnexpectedResponse(_))
        ));
        driver.close();
        device.join().unwrap();
    }

    #[test]
    fn test_response_timeout_without_device() {
        let (host, _device) = duplex();
        let driver = Att26a::open(host).unwrap();
        let start = Instant::now();
        assert!(matches!(
            driver.set_led_state(LedMode::On, 0),
            Err(Error::ResponseTimeout)
        ));
        assert!(start.elapsed() >= ACK_TIMEOUT);
    }

    #[test]
    fn test_toggle_commands_wire_bytes() {
        let (driver, seen, device) = open_with_device(Vec::new());
        driver.set_factory_test(true).unwrap();
        driver.set_factory_test(false).unwrap();
        driver.set_io_enable(true).unwrap();
        driver.set_io_enable(false).unwrap();
        driver.close();
        device.join().unwrap();
        let seen = seen.lock().unwrap();
        let frames: Vec<&[u8]> = seen.split_inclusive(|&b| b == 0xFF).collect();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], [0x85, 0x10, 0x6F, 0x00, 0xFF]);
        assert_eq!(frames[1], [0x85, 0x30, 0x4F, 0x00, 0xFF]);
        assert_eq!(frames[2], [0x85, 0x40, 0x3F, 0x00, 0xFF]);
        assert_eq!(frames[3], [0x85, 0x50, 0x2F, 0x00, 0xFF]);
    }

    #[test]
    fn test_get_led_status_one_byte_form() {
        // LED 103, mode BLINK2: 0x80 | (2 << 4) | 3.
        let (driver, seen, device) = open_with_device(vec![vec![0xA3, MSG_ACK]]);
        assert_eq!(driver.get_led_status(103).unwrap(), LedMode::Blink2);
        driver.close();
        device.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0xA5, 0x20, 0x4F, 0x10, 0xFF]);
    }

    #[test]
    fn test_get_led_status_two_byte_form() {
        // LED 115, mode ON: [0x80 | (3 << 4) | 0x08, 0x80 | 15].
        let (driver, _seen, device) = open_with_device(vec![vec![0xB8, 0x8F, MSG_ACK]]);
        assert_eq!(driver.get_led_status(115).unwrap(), LedMode::On);
        driver.close();
        device.join().unwrap();
    }

    #[test]
    fn test_get_led_status_id_mismatch() {
        // Reply echoes LED 101 against a query for 100.
        let (driver, _seen, device) = open_with_device(vec![vec![0x81, MSG_ACK]]);
        assert!(matches!(
            driver.get_led_status(100),
            Err(Error::UnexpectedResponse(_))
        ));
        driver.close();
        device.join().unwrap();
    }

    #[test]
    fn test_get_led_status_malformed_reply() {
        // Two-byte form announced but only one byte delivered.
        let (driver, _seen, device) = open_with_device(vec![vec![0xB8, MSG_ACK]]);
        assert!(matches!(
            driver.get_led_status(110),
            Err(Error::UnexpectedResponse(_))
        ));
        driver.close();
        device.join().unwrap();
    }

    #[test]
    fn test_get_led_status_rejects_upper_range() {
        let (driver, _seen, device) = open_with_device(Vec::new());
        assert!(matches!(
            driver.get_led_status(99),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            driver.get_led_status(120),
            Err(Error::InvalidArgument(_))
        ));
        driver.close();
        device.join().unwrap();
    }

    #[test]
    fn test_button_events_in_wire_order() {
        let (host, device) = duplex();
        let driver = Att26a::open(host).unwrap();
        device
            .write_all(&[rotl7(3), MSG_KA, rotl7(77), rotl7(119)])
            .unwrap();
        assert_eq!(driver.next_button(Some(Duration::from_secs(1))).unwrap(), 3);
        assert_eq!(
            driver.next_button(Some(Duration::from_secs(1))).unwrap(),
            77
        );
        assert_eq!(
            driver.next_button(Some(Duration::from_secs(1))).unwrap(),
            119
        );
        assert!(matches!(
            driver.next_button(Some(Duration::from_millis(20))),
            Err(Error::ButtonTimeout)
        ));
    }

    #[test]
    fn test_range_split_at_71() {
        let (driver, seen, device) = open_with_device(Vec::new());
        driver.set_led_range(0, &[true; 71]).unwrap();
        driver.close();
        device.join().unwrap();
        let seen = seen.lock().unwrap();
        let frames: Vec<&[u8]> = seen.split_inclusive(|&b| b == 0xFF).collect();
        assert_eq!(frames.len(), 2);
        // First message: 70 states from LED 0, on-wire count 70 (the quirk).
        assert_eq!(&frames[0][..4], [0x85, 0x07, rotl7(0), 70]);
        assert_eq!(frames[0].len(), 4 + 10 + 2);
        // Second message: the final state from LED 70, on-wire count 0.
        assert_eq!(&frames[1][..4], [0x85, 0x07, rotl7(70), 0]);
        assert_eq!(frames[1].len(), 4 + 1 + 2);
    }

    #[test]
    fn test_range_77_is_a_single_message() {
        let (driver, seen, device) = open_with_device(Vec::new());
        driver.set_led_range(10, &[false; 77]).unwrap();
        driver.close();
        device.join().unwrap();
        let seen = seen.lock().unwrap();
        let frames: Vec<&[u8]> = seen.split_inclusive(|&b| b == 0xFF).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..4], [0x85, 0x07, rotl7(10), 76]);
    }

    #[test]
    fn test_range_100_splits_and_wraps() {
        let (driver, seen, device) = open_with_device(Vec::new());
        driver.set_led_range(50, &[true; 100]).unwrap();
        driver.close();
        device.join().unwrap();
        let seen = seen.lock().unwrap();
        let frames: Vec<&[u8]> = seen.split_inclusive(|&b| b == 0xFF).collect();
        assert_eq!(frames.len(), 2);
        // 100 = 77 + 23; the second write starts at (50 + 77) % 100 = 27.
        assert_eq!(&frames[0][..4], [0x85, 0x07, rotl7(50), 76]);
        assert_eq!(&frames[1][..4], [0x85, 0x07, rotl7(27), 22]);
    }

    #[test]
    fn test_range_rejects_bad_arguments() {
        let (driver, seen, device) = open_with_device(Vec::new());
        assert!(matches!(
            driver.set_led_range(100, &[true]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            driver.set_led_range(0, &[]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            driver.set_led_range(0, &[true; 101]),
            Err(Error::InvalidArgument(_))
        ));
        driver.close();
        device.join().unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_close_unblocks_blocked_button_consumer() {
        let (host, _device) = duplex();
        let driver = Arc::new(Att26a::open(host).unwrap());
        let waiter = {
            let driver = Arc::clone(&driver);
            thread::spawn(move || driver.next_button(None))
        };
        thread::sleep(Duration::from_millis(30));
        driver.close();
        assert!(matches!(waiter.join().unwrap(), Err(Error::Shutdown)));
    }

    #[test]
    fn test_reader_error_closes_the_driver() {
        let (host, device) = duplex();
        let driver = Att26a::open(host).unwrap();
        assert!(driver.is_open());
        device.close();
        // The reader notices the dead stream and shuts the driver down.
        let deadline = Instant::now() + Duration::from_secs(1);
        while driver.is_open() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!driver.is_open());
        assert!(matches!(driver.next_button(None), Err(Error::Shutdown)));
    }

    #[test]
    fn test_reset_clears_pending_buttons() {
        let (host, device) = duplex();
        let device = Arc::new(device);
        // A chattering device keeps the stale reader unblocked so it notices
        // the reset quickly.
        let chatter = {
            let device = Arc::clone(&device);
            thread::spawn(move || {
                while device.write_all(&[MSG_KA]).is_ok() {
                    thread::sleep(Duration::from_millis(3));
                }
            })
        };
        let driver = Att26a::open(host).unwrap();

        // Park a button press, then reset: the press dies with the old queue.
        device.write_all(&[rotl7(9)]).unwrap();
        thread::sleep(Duration::from_millis(50));
        driver.reset().unwrap();
        assert!(matches!(
            driver.next_button(Some(Duration::from_millis(50))),
            Err(Error::ButtonTimeout)
        ));

        driver.close();
        chatter.join().unwrap();
    }
}
