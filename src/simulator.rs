//! Device-side simulator for the AT&T 26A console.
//!
//! The simulator is the reference decoder for the wire protocol: it
//! reassembles the frames the driver emits, verifies their checksums, and
//! dispatches semantic callbacks through the [`ConsoleHooks`] capability
//! trait. In the other direction it produces everything a real console
//! produces — keep-alives every 26 ms, one acknowledge per command, status
//! replies, and injected button presses.
//!
//! Driver and simulator form a testable pair: joined by an in-memory
//! [`duplex`](crate::stream::pipe::duplex) pipe, each side validates the
//! other's framing byte for byte.
//!
//! ## Embedding
//!
//! Behavior is supplied by the embedder as a [`ConsoleHooks`]
//! implementation. [`ConsoleState`] is the stock implementation that models
//! a real console's LED memory; the default trait methods merely log, which
//! is handy for protocol tracing.
//!
//! ```rust
//! use att26a::simulator::{ConsoleState, Simulator};
//! use att26a::stream::pipe;
//!
//! let (host, device) = pipe::duplex();
//! let sim = Simulator::spawn(device, ConsoleState::new())?;
//! // ... connect a driver (or a test) to `host` ...
//! sim.send_button_press(17)?;
//! # drop(host);
//! # Ok::<(), att26a::error::Error>(())
//! ```

use core::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use heapless::Deque;
use log::{debug, error, info, warn};

use crate::consts::{
    CMD_READ, CMD_WRITE, FRAME_END, KEEPALIVE_INTERVAL, LED_COUNT, LOWER_RANGE_START, LedMode,
    MSG_ACK, MSG_KA, PARAM_FACTORY_TEST_OFF, PARAM_FACTORY_TEST_ON, PARAM_IO_ENABLE_OFF,
    PARAM_IO_ENABLE_ON, SIM_ACCUMULATOR_LEN, SUB_FACTORY_TEST_OFF, SUB_FACTORY_TEST_ON,
    SUB_IO_ENABLE_OFF, SUB_IO_ENABLE_ON, SUB_LED_RANGE, SUB_LED_STATE, UPPER_RANGE_MAX,
};
use crate::encoding::{checksum, rotl7, rotr7, unpack_states};
use crate::error::{Error, Result};
use crate::stream::ByteStream;

/// Semantic callbacks of the simulated console.
///
/// Every method has a logging default, so a unit struct already makes a
/// usable protocol tracer. Implementations run on the simulator's reader
/// thread.
pub trait ConsoleHooks: Send {
    /// A validated bulk write arrived for `states.len()` LEDs starting at
    /// `start` (upper range, wrapping past 99).
    fn on_set_led_range(&mut self, start: u8, states: &[bool]) {
        info!("setting led range starting at {start}: {states:?}");
    }

    /// A validated single-LED write arrived.
    fn on_set_led_state(&mut self, mode: LedMode, led_id: u8) {
        info!("setting led {led_id}'s state to {mode:?}");
    }

    /// The factory test mode was toggled.
    fn on_set_factory_test(&mut self, enable: bool) {
        info!(
            "{} factory test",
            if enable { "enable" } else { "disable" }
        );
    }

    /// The I/O controller was toggled.
    fn on_set_io_enable(&mut self, enable: bool) {
        info!("{} IO driver", if enable { "enable" } else { "disable" });
    }

    /// A status query arrived for `led_id` (lower range only); the returned
    /// mode is encoded into the reply.
    fn on_get_led_status(&mut self, led_id: u8) -> LedMode {
        info!("reading led {led_id} state");
        LedMode::Off
    }
}

/// A [`ConsoleHooks`] implementation that models the console's LED memory.
///
/// Stores one mode per LED plus the factory-test and I/O-enable flags, which
/// is all the state a real 26A retains between resets.
#[derive(Debug, Clone)]
pub struct ConsoleState {
    led_states: [LedMode; LED_COUNT as usize],
    factory_test: bool,
    io_enabled: bool,
}

impl ConsoleState {
    /// A console fresh out of reset: all LEDs off, factory test off, I/O
    /// enabled.
    pub fn new() -> ConsoleState {
        ConsoleState {
            led_states: [LedMode::Off; LED_COUNT as usize],
            factory_test: false,
            io_enabled: true,
        }
    }

    /// The stored mode of `led_id`.
    ///
    /// # Panics
    /// If `led_id` is 120 or larger.
    pub fn led_state(&self, led_id: u8) -> LedMode {
        self.led_states[led_id as usize]
    }

    /// Whether factory test mode is currently enabled.
    pub fn factory_test(&self) -> bool {
        self.factory_test
    }

    /// Whether the I/O controller is currently enabled.
    pub fn io_enabled(&self) -> bool {
        self.io_enabled
    }
}

impl Default for ConsoleState {
    fn default() -> ConsoleState {
        ConsoleState::new()
    }
}

impl ConsoleHooks for ConsoleState {
    fn on_set_led_range(&mut self, start: u8, states: &[bool]) {
        for (i, &on) in states.iter().enumerate() {
            // Bulk writes wrap within the upper range, like the hardware.
            let led_id = (start as usize + i) % 100;
            self.led_states[led_id] = if on { LedMode::On } else { LedMode::Off };
        }
    }

    fn on_set_led_state(&mut self, mode: LedMode, led_id: u8) {
        self.led_states[led_id as usize] = mode;
    }

    fn on_set_factory_test(&mut self, enable: bool) {
        self.factory_test = enable;
    }

    fn on_set_io_enable(&mut self, enable: bool) {
        self.io_enabled = enable;
    }

    fn on_get_led_status(&mut self, led_id: u8) -> LedMode {
        self.led_states[led_id as usize]
    }
}

/// Reassembles inbound frames from the raw byte stream.
///
/// Holds the 16 most recent bytes; a `0x85`/`0xA5` restarts accumulation and
/// a `0xFF` attempts checksum validation, yielding the frame payload
/// (without its checksum) on success.
struct FrameDecoder {
    buff: Deque<u8, SIM_ACCUMULATOR_LEN>,
}

impl FrameDecoder {
    fn new() -> FrameDecoder {
        FrameDecoder { buff: Deque::new() }
    }

    fn feed(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == FRAME_END {
            let mut payload = None;
            if self.buff.len() >= 2 {
                let msg: Vec<u8> = self.buff.iter().copied().collect();
                let (body, check) = msg.split_at(msg.len() - 1);
                if checksum(&body[1..]) == check[0] {
                    payload = Some(body.to_vec());
                } else {
                    warn!("message failed verification, dropping {}", hex::encode(&msg));
                }
            }
            self.buff.clear();
            payload
        } else {
            if byte == CMD_WRITE || byte == CMD_READ {
                // A fresh command start; whatever came before was noise.
                self.buff.clear();
            } else if self.buff.is_full() {
                let _ = self.buff.pop_front();
            }
            let _ = self.buff.push_back(byte);
            None
        }
    }
}

/// The console proper: decoder, hooks, and the response side of the stream.
struct Device<H: ConsoleHooks> {
    stream: Arc<dyn ByteStream>,
    hooks: H,
    decoder: FrameDecoder,
}

impl<H: ConsoleHooks> Device<H> {
    fn new(stream: Arc<dyn ByteStream>, hooks: H) -> Device<H> {
        Device {
            stream,
            hooks,
            decoder: FrameDecoder::new(),
        }
    }

    fn handle_byte(&mut self, byte: u8) -> io::Result<()> {
        match self.decoder.feed(byte) {
            Some(msg) => self.dispatch(&msg),
            None => Ok(()),
        }
    }

    /// Acts on one verified frame payload `[category, subtype, params...]`.
    ///
    /// Every frame is answered: either with a status reply (which carries
    /// its own trailing acknowledge) or with a single acknowledge byte, even
    /// when the frame was unknown or invalid — a silent simulator would
    /// stall the driver.
    fn dispatch(&mut self, msg: &[u8]) -> io::Result<()> {
        debug!("message: {}", hex::encode(msg));
        if msg.len() < 3 {
            return self.send_ack();
        }
        let (cat, sub, params) = (msg[0], msg[1], &msg[2..]);

        if cat == CMD_WRITE {
            if sub == SUB_LED_RANGE {
                if params.len() >= 3 {
                    self.handle_led_range(params);
                }
            } else if sub & 0xF0 == SUB_LED_STATE {
                let led_id = rotr7(params[0]);
                if let Some(mode) = LedMode::from_wire(sub & 0x0F)
                    && led_id < LED_COUNT
                {
                    self.hooks.on_set_led_state(mode, led_id);
                }
            } else if sub == SUB_FACTORY_TEST_ON && params[0] == PARAM_FACTORY_TEST_ON {
                self.hooks.on_set_factory_test(true);
            } else if sub == SUB_FACTORY_TEST_OFF && params[0] == PARAM_FACTORY_TEST_OFF {
                self.hooks.on_set_factory_test(false);
            } else if sub == SUB_IO_ENABLE_ON && params[0] == PARAM_IO_ENABLE_ON {
                self.hooks.on_set_io_enable(true);
            } else if sub == SUB_IO_ENABLE_OFF && params[0] == PARAM_IO_ENABLE_OFF {
                self.hooks.on_set_io_enable(false);
            }
        } else if cat == CMD_READ && sub == SUB_LED_STATE {
            let led_id = rotr7(params[0]);
            if (LOWER_RANGE_START..LED_COUNT).contains(&led_id) {
                return self.send_status(led_id);
            }
            warn!("status query for unreadable LED {led_id}");
        } else {
            warn!("unknown command category {cat:#04x}");
        }

        self.send_ack()
    }

    /// Validates and applies one bulk range write.
    ///
    /// The on-wire count 70 means 70 states; every other value means one
    /// more than written. Counts of 71 cannot be expressed, and counts of 77
    /// and up are refused like the hardware refuses them.
    fn handle_led_range(&mut self, params: &[u8]) {
        let start = rotr7(params[0]);
        let wire_count = params[1];
        let data = &params[2..];

        let count = if wire_count == 70 {
            70
        } else {
            wire_count as usize + 1
        };
        let count_ok = (1..=70).contains(&count) || (72..=76).contains(&count);
        if start > UPPER_RANGE_MAX || !count_ok || data.len() != count.div_ceil(7) {
            debug!("invalid led range message (start {start}, count {count})");
            return;
        }
        match unpack_states(data, count) {
            Some(states) => self.hooks.on_set_led_range(start, &states),
            None => debug!("invalid set led range data byte"),
        }
    }

    /// Emits the one- or two-byte status reply plus its acknowledge.
    fn send_status(&mut self, led_id: u8) -> io::Result<()> {
        let index = self.hooks.on_get_led_status(led_id).index() & 0x03;
        let offset = led_id - LOWER_RANGE_START;
        let two_byte = led_id > 107;

        let mut reply = Vec::with_capacity(3);
        if two_byte {
            reply.push(0x80 | (index << 4) | 0x08);
            reply.push(0x80 | (offset & 0x1F));
        } else {
            reply.push(0x80 | (index << 4) | (offset & 0x07));
        }
        reply.push(MSG_ACK);
        // One write, so the keep-alive emitter cannot interleave bytes into
        // the middle of the reply.
        self.stream.write_all(&reply)
    }

    fn send_ack(&mut self) -> io::Result<()> {
        self.stream.write_all(&[MSG_ACK])
    }
}

/// A running 26A console simulator.
///
/// [`spawn`](Simulator::spawn) starts a reader thread (frame reassembly and
/// dispatch) and a keep-alive emitter. Dropping the simulator, or calling
/// [`shutdown`](Simulator::shutdown), stops both and closes the stream.
pub struct Simulator {
    stream: Arc<dyn ByteStream>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
}

impl Simulator {
    /// Starts a simulator on `stream`, dispatching into `hooks`.
    ///
    /// # Errors
    /// [`Error::Io`] if a background thread cannot be spawned.
    pub fn spawn<S, H>(stream: S, hooks: H) -> Result<Simulator>
    where
        S: ByteStream + 'static,
        H: ConsoleHooks + 'static,
    {
        let stream: Arc<dyn ByteStream> = Arc::new(stream);
        let running = Arc::new(AtomicBool::new(true));

        let reader = {
            let device = Device::new(Arc::clone(&stream), hooks);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("att26a-sim-reader".into())
                .spawn(move || reader_loop(device, &running))?
        };
        let keepalive = {
            let stream = Arc::clone(&stream);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("att26a-sim-keepalive".into())
                .spawn(move || keepalive_loop(&*stream, &running))?
        };

        Ok(Simulator {
            stream,
            running,
            reader: Some(reader),
            keepalive: Some(keepalive),
        })
    }

    /// Injects a physical button press: the console emits the rotated ID as
    /// a single byte.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for IDs past 119; [`Error::Io`] if the
    /// stream is down.
    pub fn send_button_press(&self, button_id: u8) -> Result<()> {
        if button_id >= LED_COUNT {
            return Err(Error::InvalidArgument(format!(
                "button ID must be smaller than {LED_COUNT}; not {button_id}"
            )));
        }
        self.stream.write_all(&[rotl7(button_id)])?;
        Ok(())
    }

    /// Stops both background threads and closes the stream. Idempotent.
    pub fn shutdown(&mut self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.stream.close();
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.keepalive.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("running", &self.running.load(Ordering::Acquire))
            .finish()
    }
}

fn reader_loop<H: ConsoleHooks>(mut device: Device<H>, running: &AtomicBool) {
    while running.load(Ordering::Acquire) {
        let byte = match device.stream.read_one() {
            Ok(byte) => byte,
            Err(e) => {
                if running.load(Ordering::Acquire) {
                    error!("simulator reader terminating: {e}");
                }
                break;
            }
        };
        if let Err(e) = device.handle_byte(byte) {
            if running.load(Ordering::Acquire) {
                error!("simulator failed to respond: {e}");
            }
            break;
        }
    }
}

fn keepalive_loop(stream: &dyn ByteStream, running: &AtomicBool) {
    info!("simulator keep-alive emitter starting");
    while running.load(Ordering::Acquire) {
        if stream.write_all(&[MSG_KA]).is_err() {
            break;
        }
        thread::sleep(KEEPALIVE_INTERVAL);
    }
    info!("simulator keep-alive emitter terminating");
}
