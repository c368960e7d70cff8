//! The HD44780U instruction set as 10-bit bus words.

use crate::lcd::hd44780u::driver::ShiftDirection;
use std::fmt::{Debug, Formatter};

/// A write instruction as it appears on the bus: `RS`, `RW`, `D7`..`D0`, most significant first.
///
/// `RW` is always `0`; reads are separate transactions and never go through this type.
/// Build one with the per-class constructors, or from an [InstructionKind].
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Instruction(u16);

impl Instruction {
    /// Number of bus lines an instruction drives.
    pub const WIDTH: usize = 10;

    const RS: u16 = 1 << 9;
    const RW: u16 = 1 << 8;
    const MASK: u16 = (1 << Self::WIDTH) - 1;

    /// Wraps a raw word. Returns `None` if it's wider than 10 bits or is a read (`RW = 1`).
    pub fn from_bits(bits: u16) -> Option<Self> {
        if bits & !Self::MASK != 0 || bits & Self::RW != 0 {
            return None;
        }
        Some(Instruction(bits))
    }

    /// Clears the display and sets the cursor to the home position.
    ///
    /// Word: `00 00000001`.
    pub fn clear_display() -> Self {
        InstructionKind::ClearDisplay.encode()
    }

    /// Sets the cursor to the home position and undoes any display shift.
    ///
    /// Word: `00 00000010`.
    pub fn return_home() -> Self {
        InstructionKind::ReturnHome.encode()
    }

    /// Word: `00 000001IS`. `I` increments the address counter after each data access, `S`
    /// shifts the display on each write.
    pub fn entry_mode_set(increment: bool, shift: bool) -> Self {
        InstructionKind::EntryModeSet { increment, shift }.encode()
    }

    /// Word: `00 00001DCB`.
    pub fn display_control(display: bool, cursor: bool, blink: bool) -> Self {
        InstructionKind::DisplayControl {
            display,
            cursor,
            blink,
        }
        .encode()
    }

    /// Word: `00 0001SR00`. `S` shifts the whole display instead of moving the cursor, `R` goes right.
    pub fn cursor_shift(display_shift: bool, direction: ShiftDirection) -> Self {
        InstructionKind::CursorShift {
            display_shift,
            direction,
        }
        .encode()
    }

    /// Word: `00 001LNF00`. `L` selects the 8-bit interface, `N` two lines, `F` the 5x10 font.
    pub fn function_set(eight_bit: bool, two_lines: bool, font_5x10: bool) -> Self {
        InstructionKind::FunctionSet {
            eight_bit,
            two_lines,
            font_5x10,
        }
        .encode()
    }

    /// Word: `00 01AAAAAA`. The top two bits of `address` are discarded.
    pub fn set_cgram_address(address: u8) -> Self {
        InstructionKind::SetCgramAddress(address).encode()
    }

    /// Word: `00 1AAAAAAA`. The top bit of `address` is discarded.
    pub fn set_ddram_address(address: u8) -> Self {
        InstructionKind::SetDdramAddress(address).encode()
    }

    /// Word: `10 DDDDDDDD`. Writes `byte` to CGRAM or DDRAM at the address counter.
    pub fn write_data(byte: u8) -> Self {
        InstructionKind::WriteData(byte).encode()
    }

    /// The raw 10-bit word.
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Level of the register select line.
    pub fn rs(self) -> bool {
        self.0 & Self::RS != 0
    }

    /// Level of the read/write line. Always `false`.
    pub fn rw(self) -> bool {
        self.0 & Self::RW != 0
    }

    /// Levels of `D7`..`D0` as a byte.
    pub fn data(self) -> u8 {
        self.0 as u8
    }

    /// Decodes the word back into its instruction class.
    pub fn decode(self) -> InstructionKind {
        if self.rs() {
            return InstructionKind::WriteData(self.data());
        }

        let data = self.data();
        let bit = |mask: u8| data & mask != 0;
        let direction = |right: bool| {
            if right {
                ShiftDirection::Right
            } else {
                ShiftDirection::Left
            }
        };

        // The highest set bit selects the class, lower bits are its payload.
        match data.leading_zeros() {
            0 => InstructionKind::SetDdramAddress(data & 0x7F),
            1 => InstructionKind::SetCgramAddress(data & 0x3F),
            2 => InstructionKind::FunctionSet {
                eight_bit: bit(0b0001_0000),
                two_lines: bit(0b0000_1000),
                font_5x10: bit(0b0000_0100),
            },
            3 => InstructionKind::CursorShift {
                display_shift: bit(0b0000_1000),
                direction: direction(bit(0b0000_0100)),
            },
            4 => InstructionKind::DisplayControl {
                display: bit(0b0000_0100),
                cursor: bit(0b0000_0010),
                blink: bit(0b0000_0001),
            },
            5 => InstructionKind::EntryModeSet {
                increment: bit(0b0000_0010),
                shift: bit(0b0000_0001),
            },
            6 => InstructionKind::ReturnHome,
            7 => InstructionKind::ClearDisplay,
            // All zero, which the controller ignores
            _ => InstructionKind::Nop,
        }
    }
}

impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Instruction({:02b} {:08b})", self.0 >> 8, self.data())
    }
}

impl From<InstructionKind> for Instruction {
    fn from(kind: InstructionKind) -> Self {
        kind.encode()
    }
}

/// The instruction classes of the controller, with their payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InstructionKind {
    ClearDisplay,
    ReturnHome,
    EntryModeSet {
        increment: bool,
        shift: bool,
    },
    DisplayControl {
        display: bool,
        cursor: bool,
        blink: bool,
    },
    CursorShift {
        display_shift: bool,
        direction: ShiftDirection,
    },
    FunctionSet {
        eight_bit: bool,
        two_lines: bool,
        font_5x10: bool,
    },
    SetCgramAddress(u8),
    SetDdramAddress(u8),
    WriteData(u8),
    /// An all-zero command word. Only produced by decoding.
    Nop,
}

impl InstructionKind {
    /// Packs the class opcode and payload into a bus word.
    pub fn encode(self) -> Instruction {
        let flag = |set: bool, mask: u16| if set { mask } else { 0 };

        let bits = match self {
            InstructionKind::ClearDisplay => 0b00_0000_0001,
            InstructionKind::ReturnHome => 0b00_0000_0010,
            InstructionKind::EntryModeSet { increment, shift } => {
                0b00_0000_0100 | flag(increment, 0b10) | flag(shift, 0b01)
            }
            InstructionKind::DisplayControl {
                display,
                cursor,
                blink,
            } => 0b00_0000_1000 | flag(display, 0b100) | flag(cursor, 0b010) | flag(blink, 0b001),
            InstructionKind::CursorShift {
                display_shift,
                direction,
            } => {
                0b00_0001_0000
                    | flag(display_shift, 0b1000)
                    | flag(direction == ShiftDirection::Right, 0b0100)
            }
            InstructionKind::FunctionSet {
                eight_bit,
                two_lines,
                font_5x10,
            } => {
                0b00_0010_0000
                    | flag(eight_bit, 0b1_0000)
                    | flag(two_lines, 0b0_1000)
                    | flag(font_5x10, 0b0_0100)
            }
            InstructionKind::SetCgramAddress(address) => 0b00_0100_0000 | (address & 0x3F) as u16,
            InstructionKind::SetDdramAddress(address) => 0b00_1000_0000 | (address & 0x7F) as u16,
            InstructionKind::WriteData(byte) => Instruction::RS | byte as u16,
            InstructionKind::Nop => 0,
        };

        Instruction(bits)
    }
}
