/// Minimum delays around the enable strobe and after busy-flag reads.
///
/// Defaults are the datasheet minimums for a 5 V supply. Nanosecond values are passed to
/// [Delay::delay_ns](crate::delay::Delay::delay_ns), which rounds them up to the resolution of
/// the delay source, so a microsecond counter waits 1 µs for each of them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timing {
    /// `tAS`: RS and R/W valid before `E` rises.
    pub address_setup_ns: u32,
    /// `tDSW`: write data valid while `E` is held high.
    pub enable_pulse_ns: u32,
    /// `tDDR`: `E` high until read data is valid.
    pub data_delay_ns: u32,
    /// `tAH`/`tH`: address and data held after `E` falls.
    pub hold_ns: u32,
    /// `tADD`: address counter settles after the busy flag clears.
    pub address_settle_us: u32,
    /// Internal reset after power-on (10 ms) plus margin.
    pub startup_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            address_setup_ns: 40,
            enable_pulse_ns: 80,
            data_delay_ns: 160,
            hold_ns: 10,
            address_settle_us: 4,
            startup_ms: 12,
        }
    }
}
