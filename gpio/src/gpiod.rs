//! [GpioDriver] backend for the Linux GPIO character device, using the gpiod library.
//!
//! Every direction change releases the previous line request and makes a new one, so the data
//! bus of the LCD is handed back and forth between input and output requests during reads.
use crate::{
    GpioBus, GpioBusInput, GpioBusOutput, GpioDriver, GpioError, GpioInput, GpioOutput, GpioPin,
    GpioResult,
};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::AtomicU8;

/// GpiodDriver hands out lines of one GPIO chip and keeps track of the claimed ones.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    used_pins: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let n = chip.num_lines() as usize;
        Self {
            chip,
            used_pins: BitVec::repeat(false, n),
        }
    }

    /// Opens the chip at the given path, e.g. `/dev/gpiochip0`.
    pub fn open(path: impl AsRef<Path>) -> GpioResult<Self> {
        Ok(Self::new(gpiod::Chip::new(path.as_ref())?))
    }

    fn claim<const N: usize>(&self, indices: [usize; N]) -> GpioResult<[u32; N]> {
        let n = self.count()?;

        if indices.iter().any(|&index| index >= n) {
            return Err(GpioError::InvalidArgument);
        }

        // Duplicates inside one request count as a conflict too
        for (i, &index) in indices.iter().enumerate() {
            if self.used_pins[index] || indices[..i].contains(&index) {
                return Err(GpioError::AlreadyInUse);
            }
        }

        for index in indices {
            self.used_pins.set_aliased(index, true);
        }
        trace!("Claimed lines {:?} of {:?}", indices, self);

        Ok(indices.map(|index| index as u32))
    }

    fn release(&self, offsets: &[u32]) {
        for &offset in offsets {
            self.used_pins.set_aliased(offset as usize, false);
        }
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        let [offset] = self.claim([index])?;
        Ok(Box::new(GpiodPin {
            lines: GpiodBus {
                driver: self,
                offsets: [offset],
            },
        }))
    }

    fn get_pin_bus<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioBus<N> + '_>> {
        let offsets = self.claim(indices)?;
        Ok(Box::new(GpiodBus {
            driver: self,
            offsets,
        }))
    }
}

/// A claimed group of lines. Released back to the driver on drop.
struct GpiodBus<'a, const N: usize> {
    driver: &'a GpiodDriver,
    offsets: [u32; N],
}

impl<const N: usize> GpiodBus<'_, N> {
    fn request_input(&self) -> GpioResult<gpiod::Lines<gpiod::Input>> {
        let lines = self.driver.chip.request_lines(
            gpiod::Options::input(self.offsets).consumer(env!("CARGO_PKG_NAME")),
        )?;
        Ok(lines)
    }

    fn request_output(&self) -> GpioResult<gpiod::Lines<gpiod::Output>> {
        let lines = self.driver.chip.request_lines(
            gpiod::Options::output(self.offsets).consumer(env!("CARGO_PKG_NAME")),
        )?;
        Ok(lines)
    }
}

impl<const N: usize> Debug for GpiodBus<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.offsets)
    }
}

impl<const N: usize> GpioBus<N> for GpiodBus<'_, N> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioBusInput<N> + '_>> {
        let lines = self.request_input()?;
        Ok(Box::new(GpiodBusInput { bus: self, lines }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        let lines = self.request_output()?;
        Ok(Box::new(GpiodBusOutput { bus: self, lines }))
    }
}

impl<const N: usize> Drop for GpiodBus<'_, N> {
    fn drop(&mut self) {
        self.driver.release(&self.offsets);
    }
}

#[derive(Debug)]
struct GpiodPin<'a> {
    lines: GpiodBus<'a, 1>,
}

impl GpioPin for GpiodPin<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        let lines = self.lines.request_input()?;
        Ok(Box::new(GpiodBusInput {
            bus: &self.lines,
            lines,
        }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        let lines = self.lines.request_output()?;
        Ok(Box::new(GpiodBusOutput {
            bus: &self.lines,
            lines,
        }))
    }
}

struct GpiodBusInput<'a, const N: usize> {
    bus: &'a GpiodBus<'a, N>,
    lines: gpiod::Lines<gpiod::Input>,
}

impl<const N: usize> Debug for GpiodBusInput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.bus)
    }
}

impl<const N: usize> GpioBusInput<N> for GpiodBusInput<'_, N> {
    fn read(&self) -> GpioResult<[bool; N]> {
        let values = self.lines.get_values([false; N])?;
        Ok(values)
    }
}

impl GpioInput for GpiodBusInput<'_, 1> {
    fn read(&self) -> GpioResult<bool> {
        let [value] = self.lines.get_values([false])?;
        Ok(value)
    }
}

struct GpiodBusOutput<'a, const N: usize> {
    bus: &'a GpiodBus<'a, N>,
    lines: gpiod::Lines<gpiod::Output>,
}

impl<const N: usize> Debug for GpiodBusOutput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.bus)
    }
}

impl<const N: usize> GpioBusOutput<N> for GpiodBusOutput<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        self.lines.set_values(*values)?;
        Ok(())
    }
}

impl GpioOutput for GpiodBusOutput<'_, 1> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.lines.set_values([value])?;
        Ok(())
    }
}
