//! HD44780U LCD module, driven over the full 8-bit parallel interface.
//!
//! The controller is only ever talked to through two bus transactions: a write, which latches a
//! 10-bit [Instruction] (`RS`, `RW`, `D7`..`D0`) on the falling edge of `E`, and a read, which
//! samples the data lines while `E` is high. Everything else is layered on top of those two in
//! [driver::HD44780UDriver].
//!
//! No chip state is mirrored in software. The address counter and busy flag are read back from
//! the controller every time they are needed.
//!
//! # Sources
//!
//! - Hitachi, [“HD44780U (LCD-II) Dot Matrix Liquid Crystal Display Controller/Driver,”](https://www.sparkfun.com/datasheets/LCD/HD44780.pdf)
//!   ADE-207-272(Z), 1998.

pub mod addressing;
pub mod driver;
pub mod instruction;
pub mod sim;
pub mod timing;

pub use addressing::*;
pub use instruction::*;
pub use timing::Timing;
