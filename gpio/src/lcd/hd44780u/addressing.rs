//! Mapping between logical (line, column) positions and DDRAM addresses.
//!
//! In two-line mode the controller splits DDRAM into two 40-cell ranges, `0x00..=0x27` for the
//! first line and `0x40..=0x67` for the second. Only the first 16 cells of each are visible on a
//! 16x2 module without shifting the display.

use std::ops::RangeInclusive;

/// DDRAM range of the first display line.
pub const FIRST_LINE: RangeInclusive<u8> = 0x00..=0x27;
/// DDRAM range of the second display line.
pub const SECOND_LINE: RangeInclusive<u8> = 0x40..=0x67;
/// Cells per line, visible or not.
pub const LINE_WIDTH: u8 = 40;

/// One of the two display lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DisplayLine {
    First,
    Second,
}

impl DisplayLine {
    /// Gets the line for a 1-based line number, clamping it into `1..=2`.
    pub fn from_number(line: u8) -> Self {
        if line >= 2 {
            DisplayLine::Second
        } else {
            DisplayLine::First
        }
    }

    /// Gets the 1-based line number.
    pub fn number(self) -> u8 {
        match self {
            DisplayLine::First => 1,
            DisplayLine::Second => 2,
        }
    }

    /// Gets the DDRAM address of the first cell of the line.
    pub fn base_address(self) -> u8 {
        match self {
            DisplayLine::First => *FIRST_LINE.start(),
            DisplayLine::Second => *SECOND_LINE.start(),
        }
    }
}

/// Converts a 1-based line and column to a DDRAM address.
///
/// Out-of-range input is clamped, never rejected: line into `1..=2`, column into `1..=40`.
pub fn ddram_address(line: u8, column: u8) -> u8 {
    let column = column.clamp(1, LINE_WIDTH);
    DisplayLine::from_number(line).base_address() + (column - 1)
}

/// Finds the line an address counter value belongs to.
///
/// Addresses in the gap between the two line ranges (or above the second one) belong to no line
/// and give `None`.
pub fn classify_address(address: u8) -> Option<DisplayLine> {
    if FIRST_LINE.contains(&address) {
        Some(DisplayLine::First)
    } else if SECOND_LINE.contains(&address) {
        Some(DisplayLine::Second)
    } else {
        None
    }
}
