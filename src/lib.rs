//! # att26a
//!
//! A host-side Rust driver for the AT&T 26A Direct Extension Selector
//! Console, a serial-attached panel of 120 buttons and 120 addressable LEDs,
//! together with a byte-accurate simulator of the device.
//!
//! The driver implements the console's framed half-duplex protocol:
//! - outbound frames with a seeded XOR checksum and a `0xFF` terminator
//! - 7-bit-rotated LED and button IDs on the wire
//! - one acknowledge (`0xFD`) per command, awaited synchronously
//! - asynchronous button events and periodic keep-alives, demultiplexed by a
//!   background reader thread
//!
//! ## Crate features
//! | Feature            | Description |
//! |--------------------|-------------|
//! | `serial` (default) | Serial-port transport via the `serialport` crate |
//!
//! ## Software Features
//!
//! - **Driver and simulator** as a testable pair: the simulator is the
//!   reference decoder for the driver's encoder, and vice versa
//! - Set LED states (off, on, two blink cadences), bulk-write on/off
//!   bitmaps, query lower-range LED state, toggle factory test and I/O
//!   enable, receive button presses
//! - Transport-agnostic: any [`stream::ByteStream`] works, from a real
//!   serial device to the in-memory [`stream::pipe::duplex`] pipe
//! - Shutdown-aware blocking: closing the driver wakes every blocked caller
//!
//! ## Usage
//!
//! ```rust
//! use att26a::driver::Att26a;
//! use att26a::simulator::{ConsoleState, Simulator};
//! use att26a::stream::pipe;
//! use std::time::Duration;
//!
//! let (host, device) = pipe::duplex();
//! let sim = Simulator::spawn(device, ConsoleState::new())?;
//! let driver = Att26a::open(host)?;
//!
//! driver.set_led_on(7)?;
//! sim.send_button_press(7)?;
//! assert_eq!(driver.next_button(Some(Duration::from_secs(1)))?, 7);
//! # Ok::<(), att26a::error::Error>(())
//! ```
//!
//! On real hardware, replace the pipe with
//! `Att26a::open_serial("/dev/ttyUSB0")` (feature `serial`).
//!
//! ## Integration Notes
//!
//! - One driver per device: the protocol has no correlation IDs, so a second
//!   writer on the same link corrupts request/response matching.
//! - The serial link runs at 10752 baud, 8 data bits, odd parity, one stop
//!   bit; DTR is the reset line.
//! - A closed driver never reopens. Create a new one instead.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]

pub mod consts;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod queue;
pub mod simulator;
pub mod stream;

#[cfg(test)]
mod tests {
    //! Round-trip coverage of the driver/simulator pair: every command the
    //! driver can emit is decoded by the simulator and dispatched with the
    //! driver's original arguments.

    use crate::consts::LedMode;
    use crate::driver::Att26a;
    use crate::error::Error;
    use crate::simulator::{ConsoleHooks, ConsoleState, Simulator};
    use crate::stream::pipe::duplex;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        State(LedMode, u8),
        Range(u8, Vec<bool>),
        Factory(bool),
        Io(bool),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ConsoleHooks for Recorder {
        fn on_set_led_range(&mut self, start: u8, states: &[bool]) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Range(start, states.to_vec()));
        }

        fn on_set_led_state(&mut self, mode: LedMode, led_id: u8) {
            self.events.lock().unwrap().push(Event::State(mode, led_id));
        }

        fn on_set_factory_test(&mut self, enable: bool) {
            self.events.lock().unwrap().push(Event::Factory(enable));
        }

        fn on_set_io_enable(&mut self, enable: bool) {
            self.events.lock().unwrap().push(Event::Io(enable));
        }
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A driver and a recording simulator joined by an in-memory pipe.
    ///
    /// The simulator acknowledges only after dispatching, so once a driver
    /// call returns, its event has been recorded.
    fn recording_pair() -> (Att26a, Simulator, Recorder) {
        init_logs();
        let recorder = Recorder::default();
        let (host, device) = duplex();
        let sim = Simulator::spawn(device, recorder.clone()).unwrap();
        let driver = Att26a::open(host).unwrap();
        (driver, sim, recorder)
    }

    /// A driver joined to a simulator that models console LED memory.
    fn stateful_pair() -> (Att26a, Simulator) {
        init_logs();
        let (host, device) = duplex();
        let sim = Simulator::spawn(device, ConsoleState::new()).unwrap();
        let driver = Att26a::open(host).unwrap();
        (driver, sim)
    }

    #[test]
    fn test_round_trip_set_led_state() {
        let (driver, _sim, recorder) = recording_pair();
        driver.set_led_state(LedMode::On, 5).unwrap();
        driver.set_led_state(LedMode::Blink2, 100).unwrap();
        driver.set_led_off(119).unwrap();
        assert_eq!(
            recorder.events(),
            vec![
                Event::State(LedMode::On, 5),
                Event::State(LedMode::Blink2, 100),
                Event::State(LedMode::Off, 119),
            ]
        );
    }

    #[test]
    fn test_round_trip_toggles() {
        let (driver, _sim, recorder) = recording_pair();
        driver.set_factory_test(true).unwrap();
        driver.set_factory_test(false).unwrap();
        driver.set_io_enable(false).unwrap();
        driver.set_io_enable(true).unwrap();
        assert_eq!(
            recorder.events(),
            vec![
                Event::Factory(true),
                Event::Factory(false),
                Event::Io(false),
                Event::Io(true),
            ]
        );
    }

    #[test]
    fn test_round_trip_led_range() {
        let (driver, _sim, recorder) = recording_pair();
        let states: Vec<bool> = (0..10).map(|i| i % 2 == 0).collect();
        driver.set_led_range(3, &states).unwrap();
        assert_eq!(recorder.events(), vec![Event::Range(3, states)]);
    }

    #[test]
    fn test_round_trip_led_range_split_71() {
        let (driver, _sim, recorder) = recording_pair();
        driver.set_led_range(0, &[true; 71]).unwrap();
        assert_eq!(
            recorder.events(),
            vec![
                Event::Range(0, vec![true; 70]),
                Event::Range(70, vec![true; 1]),
            ]
        );
    }

    #[test]
    fn test_round_trip_led_range_length_77_is_dropped_by_the_device() {
        // The splitter sends 77 states as one frame (on-wire count 76), and
        // the device refuses that count while still acknowledging, so the
        // driver call succeeds without a dispatch.
        let (driver, _sim, recorder) = recording_pair();
        driver.set_led_range(0, &[true; 77]).unwrap();
        assert_eq!(recorder.events(), Vec::new());

        // A length-78 write splits into 77 + 1; the 77-state first chunk is
        // refused just the same, so only the remainder lands.
        driver.set_led_range(0, &[true; 78]).unwrap();
        assert_eq!(recorder.events(), vec![Event::Range(77, vec![true; 1])]);

        // Length 76 stays within the accepted counts and lands whole.
        driver.set_led_range(0, &[true; 76]).unwrap();
        assert_eq!(
            recorder.events(),
            vec![Event::Range(77, vec![true; 1]), Event::Range(0, vec![true; 76])]
        );
    }

    #[test]
    fn test_round_trip_query_reflects_set_state() {
        let (driver, _sim) = stateful_pair();
        assert_eq!(driver.get_led_status(100).unwrap(), LedMode::Off);

        driver.set_led_state(LedMode::Blink2, 110).unwrap();
        driver.set_led_blink1(103).unwrap();
        driver.set_led_on(119).unwrap();

        // Both reply forms: one byte for 100..=107, two bytes above.
        assert_eq!(driver.get_led_status(103).unwrap(), LedMode::Blink1);
        assert_eq!(driver.get_led_status(110).unwrap(), LedMode::Blink2);
        assert_eq!(driver.get_led_status(119).unwrap(), LedMode::On);
    }

    #[test]
    fn test_round_trip_button_presses() {
        let (driver, sim) = stateful_pair();
        sim.send_button_press(0).unwrap();
        sim.send_button_press(42).unwrap();
        sim.send_button_press(119).unwrap();
        let timeout = Some(Duration::from_secs(1));
        assert_eq!(driver.next_button(timeout).unwrap(), 0);
        assert_eq!(driver.next_button(timeout).unwrap(), 42);
        assert_eq!(driver.next_button(timeout).unwrap(), 119);
    }

    #[test]
    fn test_commands_work_among_keepalive_traffic() {
        let (driver, _sim, recorder) = recording_pair();
        // Let a few keep-alive periods pass before and between commands.
        thread::sleep(Duration::from_millis(80));
        driver.set_led_on(1).unwrap();
        thread::sleep(Duration::from_millis(80));
        driver.set_led_off(1).unwrap();
        assert_eq!(
            recorder.events(),
            vec![
                Event::State(LedMode::On, 1),
                Event::State(LedMode::Off, 1),
            ]
        );
    }

    #[test]
    fn test_closed_driver_fails_every_operation() {
        let (driver, _sim) = stateful_pair();
        let driver = Arc::new(driver);
        let blocked = {
            let driver = Arc::clone(&driver);
            thread::spawn(move || driver.next_button(None))
        };
        thread::sleep(Duration::from_millis(30));
        driver.close();

        assert!(matches!(blocked.join().unwrap(), Err(Error::Shutdown)));
        assert!(matches!(
            driver.set_led_state(LedMode::On, 1),
            Err(Error::Closed)
        ));
        assert!(matches!(driver.get_led_status(100), Err(Error::Closed)));
        assert!(matches!(
            driver.next_button(Some(Duration::from_millis(10))),
            Err(Error::Shutdown)
        ));
    }

    #[test]
    fn test_simulator_shutdown_closes_the_driver() {
        let (driver, mut sim) = stateful_pair();
        sim.shutdown();
        // The dead stream closes the driver from the reader side.
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while driver.is_open() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!driver.is_open());
    }
}
