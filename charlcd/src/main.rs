mod app;
mod config;

use crate::app::App;
use crate::config::Config;
use charlcd_gpio::GpioDriver;
use charlcd_gpio::delay::SpinDelay;
use charlcd_gpio::gpiod::GpiodDriver;
use charlcd_gpio::lcd::hd44780u::DisplayLine;
use charlcd_gpio::lcd::hd44780u::driver::GpioHD44780UDriver;
use charlcd_gpio::lcd::hd44780u::sim::SimulatedHD44780U;
use dotenv::dotenv;
use log::{debug, info};
use std::env::var;
use sysinfo::System;

const UNKNOWN_STR: &str = "???";
const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

fn parse_pin_bus<const N: usize>(pin_str: &str) -> eyre::Result<[usize; N]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|pins: Vec<usize>| {
            eyre::eyre!("Invalid number of data pins: expected {}, got {}", N, pins.len())
        })
}

fn simulate() -> bool {
    var("CHARLCD_SIMULATE").is_ok_and(|v| !v.is_empty() && v != "0")
}

fn busy_poll_limit() -> eyre::Result<Option<u32>> {
    Ok(var("CHARLCD_BUSY_POLL_LIMIT")
        .ok()
        .map(|limit| limit.parse())
        .transpose()?)
}

fn load_config() -> eyre::Result<Config> {
    debug!("Trying to load config...");
    let config = if let Some(config) = Config::try_load() {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    Ok(config)
}

fn run_hardware(config: Config, host_name: String, poll_limit: Option<u32>) -> eyre::Result<()> {
    let chip_path = var("CHARLCD_GPIO_CHIP").unwrap_or_else(|_| DEFAULT_GPIO_CHIP.to_string());
    let lcd_e_pin_no: usize = var("CHARLCD_PIN_E")?.parse()?;
    let lcd_rw_pin_no: usize = var("CHARLCD_PIN_RW")?.parse()?;
    let lcd_rs_pin_no: usize = var("CHARLCD_PIN_RS")?.parse()?;
    let lcd_data_pin_nos: [usize; 8] = parse_pin_bus(&var("CHARLCD_PINS_DATA")?)?;

    info!(
        "LCD @ {} E: {}, RW: {}, RS: {}, Data: {:?}",
        chip_path, lcd_e_pin_no, lcd_rw_pin_no, lcd_rs_pin_no, lcd_data_pin_nos
    );

    debug!("Initializing GPIO driver...");
    let gpio = GpiodDriver::open(&chip_path)?;
    debug!("{:?} initialized.", gpio);

    let mut lcd_e_pin = gpio.get_pin(lcd_e_pin_no)?;
    let lcd_e_out = lcd_e_pin.as_output()?;
    let mut lcd_rw_pin = gpio.get_pin(lcd_rw_pin_no)?;
    let lcd_rw_out = lcd_rw_pin.as_output()?;
    let mut lcd_rs_pin = gpio.get_pin(lcd_rs_pin_no)?;
    let lcd_rs_out = lcd_rs_pin.as_output()?;
    let mut lcd_data_bus = gpio.get_pin_bus(lcd_data_pin_nos)?;

    let mut lcd = GpioHD44780UDriver::new(
        &*lcd_e_out,
        &*lcd_rw_out,
        &*lcd_rs_out,
        &mut *lcd_data_bus,
        SpinDelay::new(),
    );
    if let Some(limit) = poll_limit {
        lcd = lcd.with_busy_poll_limit(limit);
    }

    App::new(config, host_name, &mut lcd).run()?;
    Ok(())
}

fn run_simulated(config: Config, host_name: String, poll_limit: Option<u32>) -> eyre::Result<()> {
    info!("Driving a simulated HD44780U");

    let chip = SimulatedHD44780U::new();
    let (pin_e, pin_rw, pin_rs) = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
    let mut data_bus = chip.data_bus();

    let mut lcd =
        GpioHD44780UDriver::new(&pin_e, &pin_rw, &pin_rs, &mut data_bus, SpinDelay::new());
    if let Some(limit) = poll_limit {
        lcd = lcd.with_busy_poll_limit(limit);
    }

    App::new(config, host_name, &mut lcd).run()?;

    info!("Line 1: {:?}", chip.visible_text(DisplayLine::First, 16));
    info!("Line 2: {:?}", chip.visible_text(DisplayLine::Second, 16));
    Ok(())
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    info!("charlcd starting...");

    let host_name = System::host_name().unwrap_or_else(|| UNKNOWN_STR.to_string());
    info!("Hostname {}", host_name);

    let config = load_config()?;
    let poll_limit = busy_poll_limit()?;

    if simulate() {
        run_simulated(config, host_name, poll_limit)
    } else {
        run_hardware(config, host_name, poll_limit)
    }
}
