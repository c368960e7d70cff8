//! A simulated HD44780U behind the GPIO traits, for tests and for running without hardware.
//!
//! The model reacts to the lines the way the controller does: writes are latched on the falling
//! edge of `E` with `RW` low, and reads put the status or RAM byte on the data lines on the
//! rising edge of `E` with `RW` high. The busy flag stays set for a configurable number of status
//! reads after each instruction, which stands in for the instruction's execution time.
//!
//! Everything that happens on the bus is recorded, so tests can assert on the exact sequence of
//! instructions and reads.

use crate::delay::Delay;
use crate::lcd::hd44780u::driver::{BUSY_FLAG, ShiftDirection};
use crate::lcd::hd44780u::{DisplayLine, Instruction, InstructionKind, LINE_WIDTH};
use crate::{
    GpioBus, GpioBusInput, GpioBusOutput, GpioError, GpioOutput, GpioResult, pack_byte,
    unpack_byte,
};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};

/// Direction of the data lines, as seen from the host.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusDirection {
    Input,
    Output,
}

/// Something that happened on the simulated bus.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SimEvent {
    /// An instruction was latched.
    Write(Instruction),
    /// The controller drove a byte for a read. `rs` is `false` for status reads.
    Read { rs: bool, value: u8 },
    /// The host switched the data lines.
    Direction(BusDirection),
}

/// A host action the real controller would not have handled correctly.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProtocolViolation {
    /// An instruction was strobed while the busy flag was still set.
    WriteWhileBusy(Instruction),
    /// An instruction was strobed while the data lines were inputs.
    WriteWithBusAsInput(Instruction),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RamTarget {
    Ddram,
    Cgram,
}

#[derive(Copy, Clone, Debug)]
enum SimLine {
    E,
    Rw,
    Rs,
}

struct SimState {
    e: bool,
    rw: bool,
    rs: bool,
    direction: BusDirection,
    driven: u8,
    output: u8,

    ddram: [u8; 128],
    cgram: [u8; 64],
    address_counter: u8,
    target: RamTarget,
    display_offset: u8,

    increment: bool,
    entry_shift: bool,
    display_on: bool,
    cursor_on: bool,
    blink_on: bool,
    eight_bit: bool,
    two_lines: bool,
    font_5x10: bool,

    busy_polls: u32,
    busy_polls_per_instruction: u32,
    failing_reads: u32,

    events: Vec<SimEvent>,
    violations: Vec<ProtocolViolation>,
}

impl SimState {
    fn new() -> Self {
        // Register values after the internal reset circuit has run
        SimState {
            e: false,
            rw: false,
            rs: false,
            direction: BusDirection::Output,
            driven: 0,
            output: 0,
            ddram: [b' '; 128],
            cgram: [0; 64],
            address_counter: 0,
            target: RamTarget::Ddram,
            display_offset: 0,
            increment: true,
            entry_shift: false,
            display_on: false,
            cursor_on: false,
            blink_on: false,
            eight_bit: true,
            two_lines: false,
            font_5x10: false,
            busy_polls: 0,
            busy_polls_per_instruction: 1,
            failing_reads: 0,
            events: Vec::new(),
            violations: Vec::new(),
        }
    }

    fn set_line(&mut self, line: SimLine, value: bool) {
        match line {
            SimLine::Rw => self.rw = value,
            SimLine::Rs => self.rs = value,
            SimLine::E => {
                let rising = !self.e && value;
                let falling = self.e && !value;
                self.e = value;
                if rising && self.rw {
                    self.drive_read();
                } else if falling && !self.rw {
                    self.latch_write();
                }
            }
        }
    }

    fn set_direction(&mut self, direction: BusDirection) {
        if self.direction != direction {
            self.direction = direction;
            self.events.push(SimEvent::Direction(direction));
        }
    }

    fn drive_read(&mut self) {
        let value = if self.rs {
            let value = self.read_ram();
            self.address_counter = self.step_address(self.increment);
            value
        } else {
            let busy_flag = if self.busy_polls > 0 { BUSY_FLAG } else { 0 };
            self.busy_polls = self.busy_polls.saturating_sub(1);
            busy_flag | (self.address_counter & !BUSY_FLAG)
        };
        self.output = value;
        self.events.push(SimEvent::Read { rs: self.rs, value });
    }

    fn latch_write(&mut self) {
        let bits = (self.rs as u16) << 9 | self.driven as u16;
        let Some(instruction) = Instruction::from_bits(bits) else {
            return;
        };

        if self.busy_polls > 0 {
            self.violations.push(ProtocolViolation::WriteWhileBusy(instruction));
        }
        if self.direction == BusDirection::Input {
            self.violations.push(ProtocolViolation::WriteWithBusAsInput(instruction));
        }
        self.events.push(SimEvent::Write(instruction));

        self.execute(instruction.decode());
        self.busy_polls = self.busy_polls_per_instruction;
    }

    fn execute(&mut self, kind: InstructionKind) {
        match kind {
            InstructionKind::ClearDisplay => {
                self.ddram = [b' '; 128];
                self.address_counter = 0;
                self.target = RamTarget::Ddram;
                self.display_offset = 0;
                self.increment = true;
            }
            InstructionKind::ReturnHome => {
                self.address_counter = 0;
                self.target = RamTarget::Ddram;
                self.display_offset = 0;
            }
            InstructionKind::EntryModeSet { increment, shift } => {
                self.increment = increment;
                self.entry_shift = shift;
            }
            InstructionKind::DisplayControl {
                display,
                cursor,
                blink,
            } => {
                self.display_on = display;
                self.cursor_on = cursor;
                self.blink_on = blink;
            }
            InstructionKind::CursorShift {
                display_shift,
                direction,
            } => {
                let right = direction == ShiftDirection::Right;
                if display_shift {
                    self.shift_display(right);
                } else {
                    self.address_counter = self.step_ddram(right);
                }
            }
            InstructionKind::FunctionSet {
                eight_bit,
                two_lines,
                font_5x10,
            } => {
                self.eight_bit = eight_bit;
                self.two_lines = two_lines;
                self.font_5x10 = font_5x10;
            }
            InstructionKind::SetCgramAddress(address) => {
                self.target = RamTarget::Cgram;
                self.address_counter = address;
            }
            InstructionKind::SetDdramAddress(address) => {
                self.target = RamTarget::Ddram;
                self.address_counter = address;
            }
            InstructionKind::WriteData(byte) => {
                self.write_ram(byte);
                self.address_counter = self.step_address(self.increment);
                if self.entry_shift && self.target == RamTarget::Ddram {
                    // Incrementing with shift moves the display left, so the cursor seems to stand still
                    self.shift_display(!self.increment);
                }
            }
            InstructionKind::Nop => {}
        }
    }

    fn read_ram(&self) -> u8 {
        match self.target {
            RamTarget::Ddram => self.ddram[(self.address_counter & 0x7F) as usize],
            RamTarget::Cgram => self.cgram[(self.address_counter & 0x3F) as usize],
        }
    }

    fn write_ram(&mut self, byte: u8) {
        match self.target {
            RamTarget::Ddram => self.ddram[(self.address_counter & 0x7F) as usize] = byte,
            RamTarget::Cgram => self.cgram[(self.address_counter & 0x3F) as usize] = byte,
        }
    }

    fn shift_display(&mut self, right: bool) {
        self.display_offset = if right {
            (self.display_offset + 1) % LINE_WIDTH
        } else {
            (self.display_offset + LINE_WIDTH - 1) % LINE_WIDTH
        };
    }

    fn step_address(&self, forward: bool) -> u8 {
        match self.target {
            RamTarget::Ddram => self.step_ddram(forward),
            RamTarget::Cgram => {
                let next = if forward {
                    self.address_counter.wrapping_add(1)
                } else {
                    self.address_counter.wrapping_sub(1)
                };
                next & 0x3F
            }
        }
    }

    fn step_ddram(&self, forward: bool) -> u8 {
        let ac = self.address_counter;
        if self.two_lines {
            match (forward, ac) {
                (true, 0x27) => 0x40,
                (true, 0x67) => 0x00,
                (false, 0x40) => 0x27,
                (false, 0x00) => 0x67,
                (true, _) => ac.wrapping_add(1) & 0x7F,
                (false, _) => ac.wrapping_sub(1) & 0x7F,
            }
        } else {
            match (forward, ac) {
                (true, 0x4F) => 0x00,
                (false, 0x00) => 0x4F,
                (true, _) => ac.wrapping_add(1) & 0x7F,
                (false, _) => ac.wrapping_sub(1) & 0x7F,
            }
        }
    }
}

/// The simulated controller. Hand its lines to a driver with [Self::pin_e], [Self::pin_rw],
/// [Self::pin_rs] and [Self::data_bus], then inspect it through `&self` while the driver runs.
pub struct SimulatedHD44780U {
    state: RefCell<SimState>,
}

impl Default for SimulatedHD44780U {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SimulatedHD44780U {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimulatedHD44780U")
    }
}

impl SimulatedHD44780U {
    pub fn new() -> Self {
        SimulatedHD44780U {
            state: RefCell::new(SimState::new()),
        }
    }

    pub fn pin_e(&self) -> SimPin<'_> {
        SimPin {
            chip: self,
            line: SimLine::E,
        }
    }

    pub fn pin_rw(&self) -> SimPin<'_> {
        SimPin {
            chip: self,
            line: SimLine::Rw,
        }
    }

    pub fn pin_rs(&self) -> SimPin<'_> {
        SimPin {
            chip: self,
            line: SimLine::Rs,
        }
    }

    pub fn data_bus(&self) -> SimDataBus<'_> {
        SimDataBus { chip: self }
    }

    /// Sets how many status reads report busy after each instruction. Defaults to 1.
    pub fn set_busy_polls(&self, polls: u32) {
        self.state.borrow_mut().busy_polls_per_instruction = polls;
    }

    /// Makes the next `polls` status reads report busy, starting now.
    pub fn hold_busy(&self, polls: u32) {
        self.state.borrow_mut().busy_polls = polls;
    }

    /// Makes the next `reads` reads of the data lines fail.
    pub fn fail_next_reads(&self, reads: u32) {
        self.state.borrow_mut().failing_reads = reads;
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Gets every latched instruction, in order.
    pub fn instructions(&self) -> Vec<Instruction> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                SimEvent::Write(instruction) => Some(*instruction),
                _ => None,
            })
            .collect()
    }

    /// Gets the number of busy-flag/address reads so far.
    pub fn status_reads(&self) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, SimEvent::Read { rs: false, .. }))
            .count()
    }

    pub fn violations(&self) -> Vec<ProtocolViolation> {
        self.state.borrow().violations.clone()
    }

    pub fn direction(&self) -> BusDirection {
        self.state.borrow().direction
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().busy_polls > 0
    }

    pub fn address_counter(&self) -> u8 {
        self.state.borrow().address_counter
    }

    pub fn ddram(&self, address: u8) -> u8 {
        self.state.borrow().ddram[(address & 0x7F) as usize]
    }

    pub fn cgram(&self, address: u8) -> u8 {
        self.state.borrow().cgram[(address & 0x3F) as usize]
    }

    /// Gets the display shift in cells, `0..40`. Right shifts count up.
    pub fn display_offset(&self) -> u8 {
        self.state.borrow().display_offset
    }

    pub fn is_display_on(&self) -> bool {
        self.state.borrow().display_on
    }

    pub fn is_cursor_on(&self) -> bool {
        self.state.borrow().cursor_on
    }

    pub fn is_blink_on(&self) -> bool {
        self.state.borrow().blink_on
    }

    pub fn is_incrementing(&self) -> bool {
        self.state.borrow().increment
    }

    pub fn is_two_line(&self) -> bool {
        self.state.borrow().two_lines
    }

    pub fn is_eight_bit(&self) -> bool {
        self.state.borrow().eight_bit
    }

    pub fn is_font_5x10(&self) -> bool {
        self.state.borrow().font_5x10
    }

    /// Gets the `width` leftmost cells of a line as they appear on the glass, taking the display
    /// shift into account.
    pub fn visible_text(&self, line: DisplayLine, width: u8) -> String {
        let state = self.state.borrow();
        let base = line.base_address();
        (0..width.min(LINE_WIDTH))
            .map(|i| {
                let cell = (i + LINE_WIDTH - state.display_offset) % LINE_WIDTH;
                state.ddram[(base + cell) as usize] as char
            })
            .collect()
    }
}

/// A control line of [SimulatedHD44780U].
#[derive(Debug)]
pub struct SimPin<'a> {
    chip: &'a SimulatedHD44780U,
    line: SimLine,
}

impl GpioOutput for SimPin<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.chip.state.borrow_mut().set_line(self.line, value);
        Ok(())
    }
}

/// The data lines of [SimulatedHD44780U].
#[derive(Debug)]
pub struct SimDataBus<'a> {
    chip: &'a SimulatedHD44780U,
}

impl GpioBus<8> for SimDataBus<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioBusInput<8> + '_>> {
        self.chip.state.borrow_mut().set_direction(BusDirection::Input);
        Ok(Box::new(SimBusInput { chip: self.chip }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<8> + '_>> {
        self.chip.state.borrow_mut().set_direction(BusDirection::Output);
        Ok(Box::new(SimBusOutput { chip: self.chip }))
    }
}

#[derive(Debug)]
struct SimBusInput<'a> {
    chip: &'a SimulatedHD44780U,
}

impl GpioBusInput<8> for SimBusInput<'_> {
    fn read(&self) -> GpioResult<[bool; 8]> {
        let mut state = self.chip.state.borrow_mut();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(GpioError::Other("simulated read fault".to_string()));
        }
        Ok(unpack_byte(state.output))
    }
}

#[derive(Debug)]
struct SimBusOutput<'a> {
    chip: &'a SimulatedHD44780U,
}

impl GpioBusOutput<8> for SimBusOutput<'_> {
    fn write(&self, values: &[bool; 8]) -> GpioResult<()> {
        self.chip.state.borrow_mut().driven = pack_byte(values);
        Ok(())
    }
}

/// A delay request seen by [RecordingDelay].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DelayRequest {
    Micros(u32),
    Millis(u32),
}

/// A [Delay] that returns immediately and records what it was asked for.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    enabled: bool,
    requests: Vec<DelayRequest>,
    micros_before_enable: usize,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn requests(&self) -> &[DelayRequest] {
        &self.requests
    }

    /// Gets the number of microsecond delays requested before [Delay::enable].
    pub fn micros_before_enable(&self) -> usize {
        self.micros_before_enable
    }
}

impl Delay for RecordingDelay {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn delay_us(&mut self, us: u32) {
        if !self.enabled {
            self.micros_before_enable += 1;
        }
        self.requests.push(DelayRequest::Micros(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.requests.push(DelayRequest::Millis(ms));
    }
}
