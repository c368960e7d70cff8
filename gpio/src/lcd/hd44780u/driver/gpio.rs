use crate::delay::{Delay, SpinDelay};
use crate::lcd::hd44780u::driver::{HD44780UDriver, InitState};
use crate::lcd::hd44780u::{Instruction, Timing};
use crate::{GpioBus, GpioOutput, GpioResult};
use log::{debug, trace};

/// GpioHD44780U driver for the HD44780U controller, using GPIO lines and the 8-bit interface.
///
/// The R/W line is required, since every instruction is paced by reading the busy flag instead
/// of waiting a fixed worst-case time.
///
/// The driver borrows the lines for its whole lifetime and needs `&mut self` for every
/// transaction, so two transactions can never overlap on the same bus. Sharing a display between
/// threads means wrapping the driver in a mutex.
#[derive(Debug)]
pub struct GpioHD44780UDriver<'a, D: Delay = SpinDelay> {
    pin_e: &'a dyn GpioOutput,
    pin_rw: &'a dyn GpioOutput,
    pin_rs: &'a dyn GpioOutput,
    data_bus: &'a mut dyn GpioBus<8>,
    delay: D,

    timing: Timing,
    busy_poll_limit: Option<u32>,
    state: InitState,
}

impl<'a, D: Delay> GpioHD44780UDriver<'a, D> {
    /// Creates a new GpioHD44780UDriver instance.
    ///
    /// # Parameters
    ///
    /// - `pin_e`: Enable output pin.
    /// - `pin_rw`: Read/write output pin.
    /// - `pin_rs`: Register select output pin.
    /// - `data_bus`: The data lines, `D0` first.
    /// - `delay`: Delay source for the strobe timing. It is enabled during [Self::init].
    ///
    /// The display isn't usable until [HD44780UDriver::init] has run.
    pub fn new(
        pin_e: &'a dyn GpioOutput,
        pin_rw: &'a dyn GpioOutput,
        pin_rs: &'a dyn GpioOutput,
        data_bus: &'a mut dyn GpioBus<8>,
        delay: D,
    ) -> Self {
        GpioHD44780UDriver {
            pin_e,
            pin_rw,
            pin_rs,
            data_bus,
            delay,
            timing: Timing::default(),
            busy_poll_limit: None,
            state: InitState::PowerOn,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Makes [HD44780UDriver::await_ready] give up after `polls` status reads.
    ///
    /// The flag is always read at least once, so a limit of 0 acts as 1.
    pub fn with_busy_poll_limit(mut self, polls: u32) -> Self {
        self.busy_poll_limit = Some(polls.max(1));
        self
    }

    /// Gets how far the initialization sequence got.
    pub fn state(&self) -> InitState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == InitState::Ready
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Strobes `E` with the data lines as inputs and samples them.
    ///
    /// Leaves the lines as inputs; the caller restores them. `E` is brought low again even if
    /// sampling fails.
    fn sample_data_bus(&mut self) -> GpioResult<u8> {
        let input = self.data_bus.as_input()?;
        self.delay.delay_ns(self.timing.address_setup_ns);

        let sampled = match self.pin_e.write(true) {
            Ok(()) => {
                // Covers the minimum E pulse width too
                self.delay.delay_ns(self.timing.data_delay_ns);
                input.read_byte()
            }
            Err(err) => Err(err),
        };

        let released = self.pin_e.write(false);
        self.delay.delay_ns(self.timing.hold_ns);

        let data = sampled?;
        released?;
        Ok(data)
    }
}

impl<D: Delay> HD44780UDriver for GpioHD44780UDriver<'_, D> {
    /// Initializes the display for a 16x2 module.
    ///
    /// 1. Waits for the controller's internal reset. The busy flag isn't polled here, since it
    ///    isn't valid yet.
    /// 2. Enables the delay source.
    /// 3. Function set: 8-bit interface, two lines, 5x8 font.
    /// 4. Display on, cursor on, blink off.
    /// 5. Entry mode: increment, no shift.
    /// 6. Clear display, then wait for it to finish.
    ///
    /// Every instruction is preceded by a busy-flag poll.
    fn init(&mut self) -> GpioResult<()> {
        self.state = InitState::PowerOn;

        while let Some(next) = self.state.next() {
            match next {
                InitState::FunctionConfigured => {
                    self.delay.delay_ms(self.timing.startup_ms);
                    self.delay.enable();
                    self.function_set(true, true, false)?;
                }
                InitState::DisplayConfigured => self.set_display_control(true, true, false)?,
                InitState::EntryConfigured => self.set_entry_mode(true, false)?,
                InitState::Cleared => self.clear_display()?,
                InitState::Ready => self.await_ready()?,
                // Never a successor
                InitState::PowerOn => {}
            }
            debug!("LCD init: {:?} -> {:?}", self.state, next);
            self.state = next;
        }

        Ok(())
    }

    fn write_transaction(&mut self, instruction: Instruction) -> GpioResult<()> {
        trace!("Writing {:?}", instruction);

        self.pin_rs.write(instruction.rs())?;
        self.pin_rw.write(instruction.rw())?;

        let bus = self.data_bus.as_output()?;
        bus.write_byte(instruction.data())?;
        self.delay.delay_ns(self.timing.address_setup_ns);

        self.pin_e.write(true)?;
        self.delay.delay_ns(self.timing.enable_pulse_ns);
        self.pin_e.write(false)?;

        // Keep the data lines driven through the hold time
        self.delay.delay_ns(self.timing.hold_ns);
        drop(bus);

        Ok(())
    }

    fn read_transaction(&mut self, rs: bool, rw: bool) -> GpioResult<u8> {
        self.pin_rs.write(rs)?;
        self.pin_rw.write(rw)?;

        let sampled = self.sample_data_bus();
        let restored = self.data_bus.as_output().map(drop);

        let data = sampled?;
        restored?;

        trace!("Read data: {:08b}, RS: {}, RW: {}", data, rs, rw);
        Ok(data)
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    fn timing(&self) -> Timing {
        self.timing
    }

    fn busy_poll_limit(&self) -> Option<u32> {
        self.busy_poll_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpioError;
    use crate::lcd::hd44780u::driver::{BUSY_FLAG, ShiftDirection};
    use crate::lcd::hd44780u::sim::{
        BusDirection, DelayRequest, RecordingDelay, SimEvent, SimulatedHD44780U,
    };
    use crate::lcd::hd44780u::DisplayLine;

    macro_rules! sim_driver {
        ($chip:ident, $lcd:ident) => {
            let $chip = SimulatedHD44780U::new();
            let pins = ($chip.pin_e(), $chip.pin_rw(), $chip.pin_rs());
            let mut bus = $chip.data_bus();
            #[allow(unused_mut)]
            let mut $lcd =
                GpioHD44780UDriver::new(&pins.0, &pins.1, &pins.2, &mut bus, RecordingDelay::new());
        };
    }

    #[test]
    fn init_runs_the_fixed_sequence() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();

        assert_eq!(
            chip.instructions(),
            vec![
                Instruction::function_set(true, true, false),
                Instruction::display_control(true, true, false),
                Instruction::entry_mode_set(true, false),
                Instruction::clear_display(),
            ]
        );
        assert_eq!(lcd.state(), InitState::Ready);
        assert!(lcd.is_ready());
        assert!(!chip.is_busy());
        assert!(chip.violations().is_empty());

        assert!(chip.is_two_line());
        assert!(chip.is_eight_bit());
        assert!(!chip.is_font_5x10());
        assert!(chip.is_display_on());
        assert!(chip.is_cursor_on());
        assert!(!chip.is_blink_on());
        assert!(chip.is_incrementing());
    }

    #[test]
    fn init_waits_for_reset_before_enabling_the_counter() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();

        let delay = lcd.delay();
        assert_eq!(delay.requests()[0], DelayRequest::Millis(12));
        assert!(delay.is_enabled());
        assert_eq!(delay.micros_before_enable(), 0);
        // Nothing is read before the startup wait is over
        assert!(matches!(chip.events()[0], SimEvent::Direction(BusDirection::Input)));
    }

    #[test]
    fn every_write_follows_a_clear_busy_flag() {
        sim_driver!(chip, lcd);
        chip.set_busy_polls(3);
        lcd.init().unwrap();
        lcd.write_string("Hi").unwrap();
        lcd.move_cursor(2, 1).unwrap();

        let events = chip.events();
        let mut writes = 0;
        for (i, event) in events.iter().enumerate() {
            if let SimEvent::Write(instruction) = event {
                writes += 1;
                let previous = events[..i]
                    .iter()
                    .rev()
                    .find(|event| !matches!(event, SimEvent::Direction(_)));
                match previous {
                    Some(SimEvent::Read { rs: false, value }) => {
                        assert_eq!(
                            value & BUSY_FLAG,
                            0,
                            "{:?} not preceded by ready",
                            instruction
                        )
                    }
                    other => panic!("{:?} preceded by {:?}", instruction, other),
                }
            }
        }
        assert_eq!(writes, 7);
        assert!(chip.violations().is_empty());
    }

    #[test]
    fn await_ready_stops_at_the_first_clear_read() {
        sim_driver!(chip, lcd);
        chip.hold_busy(3);
        lcd.await_ready().unwrap();
        assert_eq!(chip.status_reads(), 4);
        assert!(!chip.is_busy());
    }

    #[test]
    fn bounded_poll_reports_unresponsive() {
        let chip = SimulatedHD44780U::new();
        let pins = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
        let mut bus = chip.data_bus();
        let mut lcd =
            GpioHD44780UDriver::new(&pins.0, &pins.1, &pins.2, &mut bus, RecordingDelay::new())
                .with_busy_poll_limit(2);

        chip.hold_busy(5);
        assert_eq!(lcd.await_ready(), Err(GpioError::Unresponsive { polls: 2 }));
        assert_eq!(chip.status_reads(), 2);
        assert!(chip.instructions().is_empty());

        // Writes give up the same way, without touching the bus
        assert_eq!(lcd.clear_display(), Err(GpioError::Unresponsive { polls: 2 }));
        assert!(chip.instructions().is_empty());
    }

    #[test]
    fn zero_poll_limit_still_reads_the_flag_once() {
        let chip = SimulatedHD44780U::new();
        let pins = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
        let mut bus = chip.data_bus();
        let mut lcd =
            GpioHD44780UDriver::new(&pins.0, &pins.1, &pins.2, &mut bus, RecordingDelay::new())
                .with_busy_poll_limit(0);
        assert_eq!(lcd.busy_poll_limit(), Some(1));

        chip.hold_busy(3);
        assert_eq!(lcd.await_ready(), Err(GpioError::Unresponsive { polls: 1 }));
        assert_eq!(chip.status_reads(), 1);
    }

    #[test]
    fn is_busy_reads_the_flag() {
        sim_driver!(chip, lcd);
        chip.hold_busy(1);
        assert!(lcd.is_busy().unwrap());
        assert!(!lcd.is_busy().unwrap());
    }

    #[test]
    fn write_transaction_honors_strobe_minimums() {
        sim_driver!(chip, lcd);
        lcd.write_transaction(Instruction::clear_display()).unwrap();

        // Setup, pulse width and hold, each rounded up to 1 µs
        assert_eq!(lcd.delay().requests(), &[DelayRequest::Micros(1); 3]);
        assert_eq!(chip.instructions(), vec![Instruction::clear_display()]);
    }

    #[test]
    fn stretched_timing_rounds_up() {
        let chip = SimulatedHD44780U::new();
        let pins = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
        let mut bus = chip.data_bus();
        let timing = Timing {
            address_setup_ns: 1500,
            enable_pulse_ns: 2000,
            ..Timing::default()
        };
        let mut lcd =
            GpioHD44780UDriver::new(&pins.0, &pins.1, &pins.2, &mut bus, RecordingDelay::new())
                .with_timing(timing);

        lcd.write_transaction(Instruction::return_home()).unwrap();
        assert_eq!(
            lcd.delay().requests(),
            &[
                DelayRequest::Micros(2),
                DelayRequest::Micros(2),
                DelayRequest::Micros(1)
            ]
        );
    }

    #[test]
    fn read_transaction_switches_and_restores_the_bus() {
        sim_driver!(chip, lcd);
        let status = lcd.read_transaction(false, true).unwrap();
        assert_eq!(status, 0);
        assert_eq!(
            chip.events(),
            vec![
                SimEvent::Direction(BusDirection::Input),
                SimEvent::Read { rs: false, value: 0 },
                SimEvent::Direction(BusDirection::Output),
            ]
        );
        // Setup, data delay and hold
        assert_eq!(lcd.delay().requests(), &[DelayRequest::Micros(1); 3]);
    }

    #[test]
    fn failed_read_still_restores_the_bus() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();
        chip.fail_next_reads(1);

        assert!(matches!(lcd.read_byte(), Err(GpioError::Other(_))));
        assert_eq!(chip.direction(), BusDirection::Output);

        // The bus is still usable
        lcd.write_string("ok").unwrap();
        assert!(chip.violations().is_empty());
        assert_eq!(chip.visible_text(DisplayLine::First, 2), "ok");
    }

    #[test]
    fn written_byte_reads_back() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();
        lcd.move_cursor(1, 6).unwrap();
        lcd.write_byte(b'Q').unwrap();
        lcd.set_ddram_address(0x05).unwrap();
        assert_eq!(lcd.read_byte().unwrap(), b'Q');
        assert_eq!(chip.ddram(0x05), b'Q');
    }

    #[test]
    fn data_writes_wait_for_the_address_counter() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();
        let before = lcd.delay().requests().len();
        lcd.write_byte(b'x').unwrap();

        let after = &lcd.delay().requests()[before..];
        assert_eq!(after.last(), Some(&DelayRequest::Micros(4)));
        assert_eq!(lcd.read_address_counter().unwrap(), 1);
    }

    #[test]
    fn shift_display_right_issues_one_instruction_per_step() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();
        chip.set_busy_polls(0);
        chip.clear_events();

        lcd.shift_display_right(3).unwrap();
        assert_eq!(
            chip.instructions(),
            vec![Instruction::cursor_shift(true, ShiftDirection::Right); 3]
        );
        assert_eq!(chip.status_reads(), 3);
        assert_eq!(chip.display_offset(), 3);

        chip.clear_events();
        lcd.shift_display_left(0).unwrap();
        assert!(chip.events().is_empty());

        lcd.shift_display_left(4).unwrap();
        assert_eq!(
            chip.instructions(),
            vec![Instruction::cursor_shift(true, ShiftDirection::Left); 4]
        );
        assert_eq!(chip.display_offset(), 39);
    }

    #[test]
    fn shift_cursor_moves_the_address_counter() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();
        lcd.shift_cursor(ShiftDirection::Right).unwrap();
        lcd.shift_cursor(ShiftDirection::Right).unwrap();
        assert_eq!(lcd.read_address_counter().unwrap(), 2);
        lcd.shift_cursor(ShiftDirection::Left).unwrap();
        assert_eq!(lcd.read_address_counter().unwrap(), 1);
        assert_eq!(chip.display_offset(), 0);
    }

    #[test]
    fn move_cursor_clamps_and_current_line_classifies() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();

        lcd.move_cursor(3, 41).unwrap();
        assert_eq!(
            chip.instructions().last(),
            Some(&Instruction::set_ddram_address(0x67))
        );
        assert_eq!(lcd.current_line().unwrap(), Some(DisplayLine::Second));

        lcd.move_cursor(0, 0).unwrap();
        assert_eq!(lcd.current_line().unwrap(), Some(DisplayLine::First));

        lcd.set_ddram_address(0x30).unwrap();
        assert_eq!(lcd.current_line().unwrap(), None);
    }

    #[test]
    fn write_string_replaces_non_ascii() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();
        lcd.write_string("a€b").unwrap();
        assert_eq!(chip.visible_text(DisplayLine::First, 4), "a?b ");
    }

    #[test]
    fn define_glyph_fills_cgram_and_restores_the_cursor() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();
        lcd.move_cursor(2, 5).unwrap();
        let heart = [0x00, 0x0A, 0x1F, 0x1F, 0x0E, 0x04, 0x00, 0xFF];
        lcd.define_glyph(9, heart).unwrap();

        for (row, &bits) in heart.iter().enumerate() {
            assert_eq!(chip.cgram(7 * 8 + row as u8), bits & 0x1F);
        }
        assert_eq!(
            chip.instructions().last(),
            Some(&Instruction::set_ddram_address(0x44))
        );

        lcd.write_character(7).unwrap();
        assert_eq!(chip.ddram(0x44), 7);
    }

    #[test]
    fn define_glyph_ignores_the_entry_mode() {
        sim_driver!(chip, lcd);
        lcd.init().unwrap();
        let bar = [0x1F; 8];
        lcd.define_glyph(0, bar).unwrap();

        lcd.set_entry_mode(false, false).unwrap();
        let rows = [1, 2, 3, 4, 5, 6, 7, 8];
        lcd.define_glyph(1, rows).unwrap();

        let slot = |n: u8| -> Vec<u8> { (0..8).map(|row| chip.cgram(n * 8 + row)).collect() };
        assert_eq!(slot(1), rows);
        assert_eq!(slot(0), bar);
        assert!(!chip.is_incrementing());
    }
}
