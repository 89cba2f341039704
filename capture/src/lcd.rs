//! HD44780 character LCD driven through a PCF8574 i2c backpack.
//!
//! The expander's eight outputs are wired P0=RS, P1=RW, P2=EN,
//! P3=backlight, P4..P7=D4..D7, so the controller runs in 4-bit mode and
//! every byte goes out as two nibbles, each latched by pulsing EN.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::display::CharDisplay;

/// `I2C_SLAVE` from `<linux/i2c-dev.h>`.
const I2C_SLAVE: libc::c_ulong = 0x0703;

const RS: u8 = 0x01;
const EN: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x06; // increment, no shift
const CMD_DISPLAY_ON: u8 = 0x0C; // display on, cursor off, blink off
const CMD_FUNCTION_SET: u8 = 0x28; // 4-bit, 2 lines, 5x8 dots
const CMD_SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

pub struct Lcd {
    bus: File,
    cols: usize,
    rows: usize,
}

impl Lcd {
    /// Open `/dev/i2c-<bus>`, bind the expander address and run the
    /// 4-bit initialisation sequence.
    pub fn open(bus: u8, addr: u16, cols: usize, rows: usize) -> Result<Self> {
        let dev = format!("/dev/i2c-{bus}");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&dev)
            .with_context(|| format!("Cannot open {dev}"))?;

        // SAFETY: the fd is valid for the lifetime of `file`, and I2C_SLAVE
        // takes the 7-bit address by value.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, libc::c_ulong::from(addr)) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("Cannot bind i2c address {addr:#04x} on {dev}"));
        }

        let mut lcd = Self {
            bus: file,
            cols,
            rows: rows.clamp(1, ROW_OFFSETS.len()),
        };
        lcd.init().context("LCD init sequence failed")?;
        info!("LCD ready on {dev} @ {addr:#04x} ({cols}x{rows})");
        Ok(lcd)
    }

    fn init(&mut self) -> Result<()> {
        sleep(Duration::from_millis(50));
        // Force 8-bit mode three times, then drop to 4-bit.
        for _ in 0..3 {
            self.write_nibble(0x30, 0)?;
            sleep(Duration::from_micros(4500));
        }
        self.write_nibble(0x20, 0)?;
        self.command(CMD_FUNCTION_SET)?;
        self.command(CMD_DISPLAY_ON)?;
        self.clear()?;
        self.command(CMD_ENTRY_MODE)
    }

    fn command(&mut self, byte: u8) -> Result<()> {
        self.send(byte, 0)
    }

    fn send(&mut self, byte: u8, mode: u8) -> Result<()> {
        self.write_nibble(byte & 0xF0, mode)?;
        self.write_nibble((byte << 4) & 0xF0, mode)
    }

    fn write_nibble(&mut self, high_bits: u8, mode: u8) -> Result<()> {
        let data = high_bits | mode | BACKLIGHT;
        self.bus.write_all(&[data | EN])?;
        sleep(Duration::from_micros(1));
        self.bus.write_all(&[data & !EN])?;
        sleep(Duration::from_micros(50));
        Ok(())
    }

    fn set_cursor(&mut self, row: usize, col: usize) -> Result<()> {
        let row = row.min(self.rows - 1);
        self.command(CMD_SET_DDRAM | (ROW_OFFSETS[row] + col as u8))
    }
}

impl CharDisplay for Lcd {
    fn clear(&mut self) -> Result<()> {
        self.command(CMD_CLEAR)?;
        sleep(Duration::from_millis(2));
        Ok(())
    }

    fn write_line(&mut self, row: usize, text: &str) -> Result<()> {
        self.set_cursor(row, 0)?;
        for byte in encode_a00(text).into_iter().take(self.cols) {
            self.send(byte, RS)?;
        }
        Ok(())
    }

    fn columns(&self) -> usize {
        self.cols
    }
}

/// Map text onto the A00 character ROM: printable ASCII passes through,
/// everything else becomes `?`.
fn encode_a00(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' })
        .collect()
}
