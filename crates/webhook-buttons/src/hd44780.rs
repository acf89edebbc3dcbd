//! HD44780 character LCD behind a PCF8574 I2C backpack.
//!
//! Reference: Hitachi HD44780U datasheet (ADE-207-272), 4-bit interface.
//! The backpack wires P0=RS, P1=RW, P2=EN, P3=backlight, P4..P7=D4..D7.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::display::TextDisplay;

/// Default 7-bit address of a PCF8574 backpack with A0..A2 pulled high.
pub const PCF8574_I2C_ADDR: u8 = 0x27;

const RS: u8 = 0x01;
const EN: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
/// Increment, no shift.
const CMD_ENTRY_MODE: u8 = 0x06;
/// Display on, cursor and blink off.
const CMD_DISPLAY_ON: u8 = 0x0C;
/// 4-bit bus, two lines, 5x8 font.
const CMD_FUNCTION_SET: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

/// DDRAM start of each row.
const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

pub struct Hd44780<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    cols: u8,
    rows: u8,
    backlight: u8,
}

impl<I: I2c, D: DelayNs> Hd44780<I, D> {
    /// Run the 4-bit init sequence. The screen ends up blank with the
    /// backlight off.
    pub fn new(i2c: I, delay: D, address: u8, cols: u8, rows: u8) -> Result<Self, I::Error> {
        let mut lcd = Self {
            i2c,
            delay,
            address,
            cols,
            rows: rows.min(ROW_OFFSETS.len() as u8),
            backlight: 0,
        };
        lcd.delay.delay_ms(50);
        lcd.expander_write(0)?;
        // three 8-bit "function set" nibbles, then switch to 4-bit
        lcd.write_nibble(0x30, 0)?;
        lcd.delay.delay_us(4_500);
        lcd.write_nibble(0x30, 0)?;
        lcd.delay.delay_us(4_500);
        lcd.write_nibble(0x30, 0)?;
        lcd.delay.delay_us(150);
        lcd.write_nibble(0x20, 0)?;

        lcd.command(CMD_FUNCTION_SET)?;
        lcd.command(CMD_DISPLAY_ON)?;
        lcd.clear_screen()?;
        lcd.command(CMD_ENTRY_MODE)?;
        log::info!("[DSP] HD44780 {}x{} at 0x{:02x}", cols, lcd.rows, address);
        Ok(lcd)
    }

    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    fn expander_write(&mut self, value: u8) -> Result<(), I::Error> {
        self.i2c.write(self.address, &[value | self.backlight])
    }

    fn write_nibble(&mut self, nibble: u8, mode: u8) -> Result<(), I::Error> {
        let value = (nibble & 0xF0) | mode;
        self.expander_write(value | EN)?;
        self.delay.delay_us(1);
        self.expander_write(value)?;
        self.delay.delay_us(50);
        Ok(())
    }

    fn send(&mut self, byte: u8, mode: u8) -> Result<(), I::Error> {
        self.write_nibble(byte & 0xF0, mode)?;
        self.write_nibble(byte << 4, mode)
    }

    fn command(&mut self, command: u8) -> Result<(), I::Error> {
        self.send(command, 0)
    }

    fn clear_screen(&mut self) -> Result<(), I::Error> {
        self.command(CMD_CLEAR)?;
        self.delay.delay_ms(2);
        Ok(())
    }
}

impl<I: I2c, D: DelayNs> TextDisplay for Hd44780<I, D> {
    type Error = I::Error;

    fn size(&self) -> (u8, u8) {
        (self.cols, self.rows)
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.clear_screen()
    }

    fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), Self::Error> {
        let row = usize::from(row).min(ROW_OFFSETS.len() - 1);
        self.command(CMD_SET_DDRAM | col.wrapping_add(ROW_OFFSETS[row]))
    }

    /// Characters outside printable ASCII show as `?`; the controller ROM
    /// has no fixed mapping for them.
    fn write_char(&mut self, ch: char) -> Result<(), Self::Error> {
        let byte = if ch.is_ascii() && !ch.is_ascii_control() {
            ch as u8
        } else {
            b'?'
        };
        self.send(byte, RS)
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), Self::Error> {
        self.backlight = if on { BACKLIGHT } else { 0 };
        self.expander_write(0)
    }
}
