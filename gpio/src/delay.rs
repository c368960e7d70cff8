//! Delay primitives used to pace bus transactions.

use log::debug;
use std::fmt::Debug;
use std::hint::spin_loop;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// A blocking delay source.
///
/// Microsecond delays are expected to come from a free-running counter that has to be started
/// with [Delay::enable] first. Millisecond delays are coarse and must work without it, since the
/// display's power-on wait happens before the counter is started.
pub trait Delay: Debug {
    /// Starts the free-running counter. Calling it again has no effect.
    fn enable(&mut self);

    /// Waits for at least `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Waits for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }

    /// Waits for at least `ns` nanoseconds, rounded up to whole microseconds.
    fn delay_ns(&mut self, ns: u32) {
        self.delay_us(ns.div_ceil(1000));
    }
}

/// Busy-waiting delay for hosts, using [Instant] as the free-running counter.
#[derive(Debug, Default)]
pub struct SpinDelay {
    epoch: Option<Instant>,
}

impl SpinDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [Delay::enable] has been called (or a microsecond delay enabled it lazily).
    pub fn is_enabled(&self) -> bool {
        self.epoch.is_some()
    }
}

impl Delay for SpinDelay {
    fn enable(&mut self) {
        if self.epoch.is_none() {
            self.epoch = Some(Instant::now());
        }
    }

    fn delay_us(&mut self, us: u32) {
        if us == 0 {
            return;
        }
        if self.epoch.is_none() {
            debug!("Microsecond delay used before the counter was enabled, enabling it now");
            self.enable();
        }

        let start = Instant::now();
        let required = Duration::from_micros(us as u64);
        while start.elapsed() < required {
            spin_loop();
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        sleep(Duration::from_millis(ms as u64));
    }
}
