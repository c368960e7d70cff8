//! HD44780U LCD driver module.
//!
//! See [HD44780UDriver] for the operations of the controller, and [GpioHD44780UDriver] for the
//! implementation over GPIO lines.

mod gpio;

use crate::lcd::hd44780u::{DisplayLine, Instruction, Timing, classify_address, ddram_address};
use crate::{GpioError, GpioResult};
pub use gpio::*;
use log::{trace, warn};
use std::fmt::Debug;

/// Mask of the busy flag in the status byte. The remaining 7 bits are the address counter.
pub const BUSY_FLAG: u8 = 0b1000_0000;

/// The `HD44780UDriver` trait is the interface of an HD44780U controller.
///
/// Implementations only provide the bus layer: [Self::write_transaction],
/// [Self::read_transaction], and a microsecond delay. Every other operation is built on those.
///
/// # Synchronization
///
/// Every instruction goes through [Self::send_instruction], which first polls the busy flag until
/// it reads clear. Callers therefore never need to check [Self::is_busy] themselves. Operations
/// that read the address counter additionally wait `tADD` after the flag clears, see
/// [Self::await_address_valid].
///
/// By default the poll is unbounded: the datasheet guarantees the flag clears, so a controller
/// that never clears it is a wiring or power fault and the call will hang. Implementations can
/// return a limit from [Self::busy_poll_limit] to get [GpioError::Unresponsive] instead.
///
/// # Addressing
///
/// Positions are 1-based `(line, column)` pairs and are clamped, never rejected. See
/// [crate::lcd::hd44780u::addressing].
pub trait HD44780UDriver: Debug {
    /// Runs the power-on initialization sequence. See [GpioHD44780UDriver::init] for the steps.
    fn init(&mut self) -> GpioResult<()>;

    // Bus layer
    // Implemented by the driver implementation. The only code allowed to touch the lines.

    /// Drives `RS`, `RW` and `D7`..`D0` to the instruction's levels and strobes `E`.
    ///
    /// Doesn't wait for the busy flag, use [Self::send_instruction] for that.
    fn write_transaction(&mut self, instruction: Instruction) -> GpioResult<()>;

    /// Sets `RS`/`RW`, switches the data lines to input, strobes `E` and samples them.
    ///
    /// The data lines must be switched back to output before returning, on every path.
    fn read_transaction(&mut self, rs: bool, rw: bool) -> GpioResult<u8>;

    /// Waits for at least `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// The timing parameters in use.
    fn timing(&self) -> Timing;

    /// Maximum number of status reads [Self::await_ready] performs before failing.
    /// `None` polls forever. The flag is read at least once whatever the limit.
    fn busy_poll_limit(&self) -> Option<u32> {
        None
    }

    // Busy-flag synchronization

    /// Reads the busy flag.
    fn is_busy(&mut self) -> GpioResult<bool> {
        let status = self.read_transaction(false, true)?;
        Ok(status & BUSY_FLAG != 0)
    }

    /// Polls the busy flag until it reads clear.
    ///
    /// # Errors
    /// - [GpioError::Unresponsive] if [Self::busy_poll_limit] is set and exhausted.
    fn await_ready(&mut self) -> GpioResult<()> {
        let limit = self.busy_poll_limit();
        let mut polls = 0u32;
        loop {
            polls = polls.saturating_add(1);
            if !self.is_busy()? {
                trace!("Ready after {} poll(s)", polls);
                return Ok(());
            }
            if limit.is_some_and(|limit| polls >= limit) {
                warn!("Busy flag still set after {} polls, giving up", polls);
                return Err(GpioError::Unresponsive { polls });
            }
        }
    }

    /// Polls the busy flag, then waits `tADD` for the address counter to settle.
    fn await_address_valid(&mut self) -> GpioResult<()> {
        self.await_ready()?;
        let settle = self.timing().address_settle_us;
        self.delay_us(settle);
        Ok(())
    }

    /// Waits for the controller to be ready, then writes the instruction.
    fn send_instruction(&mut self, instruction: Instruction) -> GpioResult<()> {
        self.await_ready()?;
        self.write_transaction(instruction)
    }

    // Instructions

    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_instruction(Instruction::clear_display())
    }

    /// Sets the cursor to the home position and shifts the display back to its original position.
    fn return_home(&mut self) -> GpioResult<()> {
        self.send_instruction(Instruction::return_home())
    }

    /// Sets whether the address counter increments or decrements after each data access, and
    /// whether the display shifts along with it on writes.
    fn set_entry_mode(&mut self, increment: bool, shift: bool) -> GpioResult<()> {
        self.send_instruction(Instruction::entry_mode_set(increment, shift))
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(&mut self, display: bool, cursor: bool, blink: bool) -> GpioResult<()> {
        self.send_instruction(Instruction::display_control(display, cursor, blink))
    }

    /// Moves the cursor one cell without changing DDRAM.
    fn shift_cursor(&mut self, direction: ShiftDirection) -> GpioResult<()> {
        self.send_instruction(Instruction::cursor_shift(false, direction))
    }

    /// Shifts the whole display by one cell.
    fn shift_display(&mut self, direction: ShiftDirection) -> GpioResult<()> {
        self.send_instruction(Instruction::cursor_shift(true, direction))
    }

    /// Shifts the display right `n` times, one instruction each.
    fn shift_display_right(&mut self, n: usize) -> GpioResult<()> {
        for _ in 0..n {
            self.shift_display(ShiftDirection::Right)?;
        }
        Ok(())
    }

    /// Shifts the display left `n` times, one instruction each.
    fn shift_display_left(&mut self, n: usize) -> GpioResult<()> {
        for _ in 0..n {
            self.shift_display(ShiftDirection::Left)?;
        }
        Ok(())
    }

    /// Sets the interface data length, number of lines and font.
    fn function_set(&mut self, eight_bit: bool, two_lines: bool, font_5x10: bool) -> GpioResult<()> {
        self.send_instruction(Instruction::function_set(eight_bit, two_lines, font_5x10))
    }

    /// Points the address counter at CGRAM. Only the lowest 6 bits are used.
    fn set_cgram_address(&mut self, address: u8) -> GpioResult<()> {
        self.send_instruction(Instruction::set_cgram_address(address))
    }

    /// Points the address counter at DDRAM. Only the lowest 7 bits are used.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        self.send_instruction(Instruction::set_ddram_address(address))
    }

    // Addressing

    /// Moves the cursor to a 1-based line and column. Both are clamped into range.
    fn move_cursor(&mut self, line: u8, column: u8) -> GpioResult<()> {
        self.set_ddram_address(ddram_address(line, column))
    }

    /// Reads which line the cursor is on. `None` if the address counter is between the lines.
    fn current_line(&mut self) -> GpioResult<Option<DisplayLine>> {
        let address = self.read_address_counter()?;
        Ok(classify_address(address))
    }

    // Data

    /// Writes a byte to CGRAM or DDRAM at the address counter, and waits for the counter to
    /// advance.
    fn write_byte(&mut self, byte: u8) -> GpioResult<()> {
        self.send_instruction(Instruction::write_data(byte))?;
        self.await_address_valid()
    }

    /// Writes a character code from the controller's character ROM.
    fn write_character(&mut self, character: u8) -> GpioResult<()> {
        self.write_byte(character)
    }

    /// Writes a string at the cursor. Non-ASCII characters are written as `?`.
    fn write_string(&mut self, text: &str) -> GpioResult<()> {
        for c in text.chars() {
            if c.is_ascii() {
                self.write_character(c as u8)?;
            } else {
                warn!("Non-ASCII character: {}", c);
                self.write_character(b'?')?;
            }
        }
        Ok(())
    }

    /// Stores a custom 5x8 glyph in one of the 8 CGRAM slots, then puts the cursor back at the
    /// DDRAM address it had before.
    ///
    /// `slot` is clamped to `0..=7` and only the lowest 5 bits of each row are used. Every row
    /// is addressed explicitly, so the entry mode doesn't matter. The glyph is then shown by
    /// writing the slot number as a character.
    fn define_glyph(&mut self, slot: u8, rows: [u8; 8]) -> GpioResult<()> {
        let cursor = self.read_address_counter()?;
        let base = slot.min(7) << 3;
        for (offset, row) in (0u8..).zip(rows) {
            self.set_cgram_address(base + offset)?;
            self.write_byte(row & 0b0001_1111)?;
        }
        self.set_ddram_address(cursor)
    }

    // Reads

    /// Reads the 7-bit address counter.
    fn read_address_counter(&mut self) -> GpioResult<u8> {
        self.await_address_valid()?;
        let status = self.read_transaction(false, true)?;
        Ok(status & !BUSY_FLAG)
    }

    /// Reads the CGRAM or DDRAM byte at the address counter. Advances the counter.
    fn read_byte(&mut self) -> GpioResult<u8> {
        self.await_address_valid()?;
        self.read_transaction(true, true)
    }
}

/// Direction of cursor and display shifts.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShiftDirection {
    Left,
    Right,
}

/// Steps of the initialization sequence, in order.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum InitState {
    /// Nothing sent yet. The busy flag isn't valid until the internal reset is done.
    #[default]
    PowerOn,
    /// 8-bit interface, two lines, 5x8 font.
    FunctionConfigured,
    /// Display on, cursor on, blink off.
    DisplayConfigured,
    /// Increment, no display shift.
    EntryConfigured,
    /// Clear display sent.
    Cleared,
    /// The clear has finished and arbitrary operations are valid.
    Ready,
}

impl InitState {
    /// Gets the state the sequence moves to from this one.
    pub fn next(self) -> Option<Self> {
        use InitState::*;

        match self {
            PowerOn => Some(FunctionConfigured),
            FunctionConfigured => Some(DisplayConfigured),
            DisplayConfigured => Some(EntryConfigured),
            EntryConfigured => Some(Cleared),
            Cleared => Some(Ready),
            Ready => None,
        }
    }
}
