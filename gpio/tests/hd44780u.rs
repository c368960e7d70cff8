use charlcd_gpio::lcd::hd44780u::driver::{GpioHD44780UDriver, HD44780UDriver, ShiftDirection};
use charlcd_gpio::lcd::hd44780u::sim::{RecordingDelay, SimulatedHD44780U};
use charlcd_gpio::lcd::hd44780u::{DisplayLine, Instruction};

#[test]
fn two_line_banner() {
    let chip = SimulatedHD44780U::new();
    let (e, rw, rs) = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
    let mut bus = chip.data_bus();
    let mut lcd = GpioHD44780UDriver::new(&e, &rw, &rs, &mut bus, RecordingDelay::new());

    lcd.init().unwrap();
    lcd.write_string("Hello,").unwrap();
    lcd.move_cursor(2, 3).unwrap();
    lcd.write_string("world").unwrap();

    assert_eq!(chip.visible_text(DisplayLine::First, 16), "Hello,          ");
    assert_eq!(chip.visible_text(DisplayLine::Second, 16), "  world         ");
    assert_eq!(lcd.current_line().unwrap(), Some(DisplayLine::Second));
    assert_eq!(lcd.read_address_counter().unwrap(), 0x47);
    assert!(chip.violations().is_empty());
}

#[test]
fn reading_back_a_line_follows_auto_increment() {
    let chip = SimulatedHD44780U::new();
    let (e, rw, rs) = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
    let mut bus = chip.data_bus();
    let mut lcd = GpioHD44780UDriver::new(&e, &rw, &rs, &mut bus, RecordingDelay::new());

    lcd.init().unwrap();
    lcd.write_string("abc").unwrap();
    lcd.return_home().unwrap();

    let mut read = Vec::new();
    for _ in 0..3 {
        read.push(lcd.read_byte().unwrap());
    }
    assert_eq!(read, b"abc");
    assert_eq!(lcd.read_address_counter().unwrap(), 3);
}

#[test]
fn writing_past_the_first_line_continues_on_the_second() {
    let chip = SimulatedHD44780U::new();
    let (e, rw, rs) = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
    let mut bus = chip.data_bus();
    let mut lcd = GpioHD44780UDriver::new(&e, &rw, &rs, &mut bus, RecordingDelay::new());

    lcd.init().unwrap();
    lcd.move_cursor(1, 40).unwrap();
    assert_eq!(lcd.current_line().unwrap(), Some(DisplayLine::First));
    lcd.write_character(b'!').unwrap();
    assert_eq!(lcd.current_line().unwrap(), Some(DisplayLine::Second));
    assert_eq!(chip.ddram(0x27), b'!');
}

#[test]
fn marquee_returns_home() {
    let chip = SimulatedHD44780U::new();
    let (e, rw, rs) = (chip.pin_e(), chip.pin_rw(), chip.pin_rs());
    let mut bus = chip.data_bus();
    let mut lcd = GpioHD44780UDriver::new(&e, &rw, &rs, &mut bus, RecordingDelay::new());

    lcd.init().unwrap();
    lcd.write_string("scroll").unwrap();
    lcd.shift_display_left(2).unwrap();
    assert_eq!(chip.visible_text(DisplayLine::First, 4), "roll");

    lcd.shift_display(ShiftDirection::Right).unwrap();
    assert_eq!(chip.visible_text(DisplayLine::First, 4), "crol");

    lcd.return_home().unwrap();
    assert_eq!(chip.display_offset(), 0);
    assert_eq!(
        chip.instructions().last(),
        Some(&Instruction::return_home())
    );
}
