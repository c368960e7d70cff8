use crate::config::Config;
use charlcd_gpio::GpioResult;
use charlcd_gpio::lcd::hd44780u::driver::HD44780UDriver;
use log::{debug, info};
use std::thread;
use std::time::Duration;

pub struct App<'a> {
    config: Config,
    host_name: String,
    lcd: &'a mut dyn HD44780UDriver,
}

impl<'a> App<'a> {
    pub fn new(config: Config, host_name: String, lcd: &'a mut dyn HD44780UDriver) -> Self {
        App {
            config,
            host_name,
            lcd,
        }
    }

    /// Initializes the display, prints the banner and host name, then scrolls them away and back.
    pub fn run(&mut self) -> GpioResult<()> {
        self.lcd.init()?;
        self.lcd
            .set_display_control(true, self.config.cursor, self.config.blink)?;
        debug!("{:?} initialized.", self.lcd);

        self.lcd.move_cursor(1, 1)?;
        self.lcd.write_string(&self.config.banner)?;
        self.lcd.move_cursor(2, 1)?;
        self.lcd.write_string(&self.host_name)?;

        info!("Running marquee for {} steps", self.config.marquee_steps);
        for _ in 0..self.config.marquee_steps {
            self.lcd.shift_display_left(1)?;
            self.pause();
        }
        for _ in 0..self.config.marquee_steps {
            self.lcd.shift_display_right(1)?;
            self.pause();
        }

        self.lcd.return_home()
    }

    fn pause(&self) {
        thread::sleep(Duration::from_millis(self.config.marquee_interval_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charlcd_gpio::lcd::hd44780u::DisplayLine;
    use charlcd_gpio::lcd::hd44780u::driver::GpioHD44780UDriver;
    use charlcd_gpio::lcd::hd44780u::sim::{RecordingDelay, SimulatedHD44780U};

    #[test]
    fn prints_both_lines_and_scrolls_back() {
        let chip = SimulatedHD44780U::new();
        let (e, rw, rs) = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
        let mut bus = chip.data_bus();
        let mut lcd = GpioHD44780UDriver::new(&e, &rw, &rs, &mut bus, RecordingDelay::new());

        let config = Config {
            banner: "Booting".to_string(),
            blink: true,
            marquee_steps: 3,
            marquee_interval_ms: 0,
            ..Config::default()
        };
        App::new(config, "pi".to_string(), &mut lcd).run().unwrap();

        assert!(chip.is_display_on());
        assert!(!chip.is_cursor_on());
        assert!(chip.is_blink_on());
        assert_eq!(chip.display_offset(), 0);
        assert_eq!(chip.visible_text(DisplayLine::First, 8), "Booting ");
        assert_eq!(chip.visible_text(DisplayLine::Second, 3), "pi ");
        assert!(chip.violations().is_empty());
    }
}
