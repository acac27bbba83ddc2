//! Constants used across the 26A protocol implementation.
//!
//! This module defines the wire sentinels, command bytes, size limits, and
//! timing parameters shared by the driver and the simulator, along with the
//! [`LedMode`] type that carries the four LED states the hardware supports.
//!
//! ## Key Concepts
//!
//! - **Sentinels**: `0xFF` terminates outbound frames and doubles as the
//!   device's keep-alive byte; `0xFD` acknowledges every command.
//! - **Categories**: each command payload starts with `0x85` (write) or
//!   `0xA5` (read), followed by a subtype byte and parameters.
//! - **LED ranges**: IDs 0..=99 form the upper range (bulk-writable); IDs
//!   100..=119 form the lower range (the only range that can be queried).
//! - **Timing**: the device emits a keep-alive roughly every 26 ms and
//!   answers commands well within the 100 ms acknowledge deadline.

use core::time::Duration;

/// Keep-alive byte sent periodically by the device.
///
/// Also used as the end-of-frame sentinel on outbound frames, which is why a
/// command payload may never contain a `0xFF` byte.
pub const MSG_KA: u8 = 0xFF;

/// Acknowledge byte; terminates the device's response to every command.
pub const MSG_ACK: u8 = 0xFD;

/// End-of-frame sentinel appended to every outbound frame.
pub const FRAME_END: u8 = MSG_KA;

/// Seed of the XOR checksum folded over frame bytes 1..end.
pub const CHECKSUM_SEED: u8 = 0x7F;

/// Command category byte for write commands.
pub const CMD_WRITE: u8 = 0x85;

/// Command category byte for read commands.
pub const CMD_READ: u8 = 0xA5;

/// Subtype for the bulk LED range write (upper range only).
pub const SUB_LED_RANGE: u8 = 0x07;

/// Subtype base for single-LED state commands; the low nibble carries the
/// mode on writes, and the same subtype selects the status query on reads.
pub const SUB_LED_STATE: u8 = 0x20;

/// Subtype enabling factory test mode.
pub const SUB_FACTORY_TEST_ON: u8 = 0x10;
/// Parameter byte paired with [`SUB_FACTORY_TEST_ON`].
pub const PARAM_FACTORY_TEST_ON: u8 = 0x6F;
/// Subtype disabling factory test mode.
pub const SUB_FACTORY_TEST_OFF: u8 = 0x30;
/// Parameter byte paired with [`SUB_FACTORY_TEST_OFF`].
pub const PARAM_FACTORY_TEST_OFF: u8 = 0x4F;
/// Subtype enabling the I/O controller.
pub const SUB_IO_ENABLE_ON: u8 = 0x40;
/// Parameter byte paired with [`SUB_IO_ENABLE_ON`].
pub const PARAM_IO_ENABLE_ON: u8 = 0x3F;
/// Subtype disabling the I/O controller.
pub const SUB_IO_ENABLE_OFF: u8 = 0x50;
/// Parameter byte paired with [`SUB_IO_ENABLE_OFF`].
pub const PARAM_IO_ENABLE_OFF: u8 = 0x2F;

/// Total number of addressable LEDs (and buttons) on the console.
pub const LED_COUNT: u8 = 120;

/// First LED ID of the lower range (the two special bottom rows).
pub const LOWER_RANGE_START: u8 = 100;

/// Highest LED ID addressable by a bulk range write.
pub const UPPER_RANGE_MAX: u8 = 99;

/// Maximum number of payload bytes in one outbound frame (before checksum
/// and end sentinel).
pub const MAX_FRAME_PAYLOAD: usize = 15;

/// Maximum number of LED states one raw range-write frame can carry.
pub const MAX_RAW_RANGE: usize = 77;

/// Range-write length the device refuses outright; the driver splits it.
pub const UNSUPPORTED_RAW_RANGE: usize = 71;

/// Maximum number of LED states accepted by the splitting range write.
pub const MAX_RANGE_STATES: usize = 100;

/// Capacity of the driver's button event queue; presses beyond this are
/// dropped until a consumer catches up.
pub const BUTTON_QUEUE_CAPACITY: usize = 100;

/// Baud rate of the console's serial link (8 data bits, odd parity, one
/// stop bit).
pub const BAUD_RATE: u32 = 10752;

/// Deadline for writing one frame to the byte stream.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Deadline for the acknowledge byte after a command has been written.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(100);

/// How long DTR is held low during a reset.
pub const RESET_HOLD: Duration = Duration::from_millis(100);

/// How long `reset` waits for the previous reader thread to stop before
/// abandoning it.
pub const READER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `close` waits for the reader thread to stop.
pub const READER_CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Cadence of the simulator's keep-alive emitter.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(26);

/// Capacity of the simulator's inbound byte accumulator; the oldest byte is
/// evicted once a malformed frame overruns it.
pub const SIM_ACCUMULATOR_LEN: usize = 16;

/// One of the four display states a 26A LED supports.
///
/// The discriminants are the wire encoding: the low nibble of a set-LED-state
/// command carries the value directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LedMode {
    /// LED dark.
    Off = 0x0,
    /// First blink cadence.
    Blink1 = 0x8,
    /// Second blink cadence.
    Blink2 = 0xD,
    /// LED lit steadily.
    On = 0xF,
}

impl LedMode {
    /// The canonical mode ordering; status replies encode a mode as an index
    /// into this table.
    pub const MODES: [LedMode; 4] = [LedMode::Off, LedMode::Blink1, LedMode::Blink2, LedMode::On];

    /// The nibble transmitted on the wire for this mode.
    pub const fn wire(self) -> u8 {
        self as u8
    }

    /// Position of this mode in [`LedMode::MODES`].
    pub const fn index(self) -> u8 {
        match self {
            LedMode::Off => 0,
            LedMode::Blink1 => 1,
            LedMode::Blink2 => 2,
            LedMode::On => 3,
        }
    }

    /// Decodes a wire nibble back into a mode.
    ///
    /// Returns `None` for the twelve nibble values the hardware does not
    /// define.
    pub const fn from_wire(nibble: u8) -> Option<LedMode> {
        match nibble {
            0x0 => Some(LedMode::Off),
            0x8 => Some(LedMode::Blink1),
            0xD => Some(LedMode::Blink2),
            0xF => Some(LedMode::On),
            _ => None,
        }
    }

    /// Looks up a mode by its index in [`LedMode::MODES`].
    ///
    /// Only the low two bits are significant, matching how status replies
    /// encode the index.
    pub const fn from_index(index: u8) -> LedMode {
        Self::MODES[(index & 3) as usize]
    }
}
