//! Character display fed from the web form and JSON API.
//!
//! A [`TextPanel`] owns the cursor and the backlight timer on top of any
//! [`TextDisplay`]. Requests are parsed into a [`DisplayUpdate`] first, so
//! the form and the JSON API share one apply path.

use alloc::format;
use alloc::string::String;
use core::convert::Infallible;
use core::fmt;

use serde_json::{json, Value};

use crate::percent::{self, FormArgs};

pub const DISPLAY_PATH: &str = "/display";
pub const DISPLAY_API_PATH: &str = "/api/display";

/// Backlight time after an update that does not name one.
pub const DEFAULT_BACKLIGHT_MS: u32 = 5_000;

/// Fixed-size character display with a cursor and a switchable backlight.
pub trait TextDisplay {
    type Error: fmt::Debug;

    /// Columns and rows.
    fn size(&self) -> (u8, u8);

    /// Blank the screen and home the cursor.
    fn clear(&mut self) -> Result<(), Self::Error>;

    fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), Self::Error>;

    /// Draw at the cursor and advance it by one cell.
    fn write_char(&mut self, ch: char) -> Result<(), Self::Error>;

    fn set_backlight(&mut self, on: bool) -> Result<(), Self::Error>;
}

/// Placeholder for builds without a display.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDisplay;

impl TextDisplay for NoDisplay {
    type Error = Infallible;

    fn size(&self) -> (u8, u8) {
        (0, 0)
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_cursor(&mut self, _col: u8, _row: u8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn write_char(&mut self, _ch: char) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_backlight(&mut self, _on: bool) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// One display request, already decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayUpdate {
    pub message: Option<String>,
    pub clear: bool,
    pub col: Option<u8>,
    pub row: Option<u8>,
    /// `Some(0)` switches the backlight off.
    pub backlight_ms: Option<u32>,
    /// Buzzer units; 0 means no alarm.
    pub alarm_units: u16,
}

impl DisplayUpdate {
    /// Form fields: `msg` (percent-encoded), `clear`, `x`, `y`,
    /// `backlight` in seconds, `alarm` in 0.1 s units. Blank numeric
    /// fields are ignored; non-numeric text reads as 0.
    pub fn from_form(args: &FormArgs) -> Self {
        let number = |key: &str| {
            args.get(key)
                .filter(|raw| !raw.is_empty())
                .map(|raw| leading_int(raw))
        };
        Self {
            message: args.get("msg").map(|raw| percent::decode_to_string(raw)),
            clear: number("clear").is_some_and(|value| value > 0),
            col: number("x").map(clamp_u8),
            row: number("y").map(clamp_u8),
            backlight_ms: number("backlight")
                .map(|secs| clamp_u32(secs.saturating_mul(1000))),
            alarm_units: number("alarm").map_or(0, clamp_u16),
        }
    }

    /// JSON object with `msg`, `clear`, `x`, `y`, `backlight` (seconds,
    /// may be fractional) and `alarm`. Naming either coordinate sets both,
    /// a missing one reading as 0. Returns `None` for non-objects.
    pub fn from_json(request: &Value) -> Option<Self> {
        let obj = request.as_object()?;
        let int = |key: &str| obj.get(key).and_then(Value::as_i64).unwrap_or(0);
        let (col, row) = if obj.contains_key("x") || obj.contains_key("y") {
            (Some(clamp_u8(int("x"))), Some(clamp_u8(int("y"))))
        } else {
            (None, None)
        };
        Some(Self {
            message: obj
                .get("msg")
                .and_then(Value::as_str)
                .filter(|msg| !msg.is_empty())
                .map(String::from),
            clear: obj.get("clear").and_then(Value::as_bool).unwrap_or(false),
            col,
            row,
            backlight_ms: obj
                .get("backlight")
                .and_then(Value::as_f64)
                .map(|secs| (secs * 1000.0) as u32),
            alarm_units: clamp_u16(int("alarm")),
        })
    }

    /// Whether applying this touches the display or the buzzer.
    pub fn is_change(&self) -> bool {
        self.message.is_some()
            || self.clear
            || self.col.is_some()
            || self.row.is_some()
            || self.backlight_ms.is_some()
            || self.alarm_units > 0
    }
}

/// C-style `atoi`: optional sign, then leading digits; anything else is 0.
fn leading_int(raw: &str) -> i64 {
    let text = raw.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative {
        -value
    } else {
        value
    }
}

fn clamp_u8(value: i64) -> u8 {
    value.clamp(0, i64::from(u8::MAX)) as u8
}

fn clamp_u16(value: i64) -> u16 {
    value.clamp(0, i64::from(u16::MAX)) as u16
}

fn clamp_u32(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// Cursor and backlight state for one [`TextDisplay`].
pub struct TextPanel<D> {
    display: D,
    col: u8,
    row: u8,
    backlight_until: Option<u32>,
}

impl<D: TextDisplay> TextPanel<D> {
    pub fn new(display: D) -> Self {
        Self {
            display,
            col: 0,
            row: 0,
            backlight_until: None,
        }
    }

    /// Blank screen, backlight off.
    pub fn begin(&mut self) -> Result<(), D::Error> {
        self.display.clear()?;
        self.col = 0;
        self.row = 0;
        self.backlight_until = None;
        self.display.set_backlight(false)
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn cursor(&self) -> (u8, u8) {
        (self.col, self.row)
    }

    pub fn backlight_on(&self) -> bool {
        self.backlight_until.is_some()
    }

    /// Apply everything but the alarm, which belongs to the buzzer.
    /// Does nothing and returns `false` when the update changes nothing.
    pub fn apply(&mut self, update: &DisplayUpdate, now_ms: u32) -> Result<bool, D::Error> {
        if !update.is_change() {
            return Ok(false);
        }
        if update.clear {
            self.display.clear()?;
            self.col = 0;
            self.row = 0;
        }
        let (width, height) = self.display.size();
        if let Some(col) = update.col {
            self.col = col.min(width.saturating_sub(1));
        }
        if let Some(row) = update.row {
            self.row = row.min(height.saturating_sub(1));
        }
        self.display.set_cursor(self.col, self.row)?;
        if let Some(message) = update.message.as_deref() {
            self.print(message)?;
        }
        let backlight_ms = update.backlight_ms.unwrap_or(DEFAULT_BACKLIGHT_MS);
        if backlight_ms > 0 {
            self.backlight_until = Some(now_ms.wrapping_add(backlight_ms));
            self.display.set_backlight(true)?;
        } else {
            self.backlight_until = None;
            self.display.set_backlight(false)?;
        }
        log::debug!(
            "[DSP] cursor {},{} backlight {}ms",
            self.col,
            self.row,
            backlight_ms
        );
        Ok(true)
    }

    /// Write at the cursor, wrapping to the next row at the right edge and
    /// back to the top after the last row.
    fn print(&mut self, message: &str) -> Result<(), D::Error> {
        let (width, height) = self.display.size();
        if width == 0 || height == 0 {
            return Ok(());
        }
        for ch in message.chars() {
            self.display.write_char(ch)?;
            self.col += 1;
            if self.col >= width {
                self.col = 0;
                self.row += 1;
                if self.row >= height {
                    self.row = 0;
                }
                self.display.set_cursor(self.col, self.row)?;
            }
        }
        Ok(())
    }

    /// Switch the backlight off once its time is up.
    pub fn poll(&mut self, now_ms: u32) {
        let Some(until) = self.backlight_until else {
            return;
        };
        // wrapping-safe "now >= until"
        if (now_ms.wrapping_sub(until) as i32) < 0 {
            return;
        }
        self.backlight_until = None;
        if let Err(err) = self.display.set_backlight(false) {
            log::warn!("[DSP] backlight off failed: {:?}", err);
        }
    }

    /// `/api/display` document. `alarm_ms` is the buzzer's remaining time.
    pub fn to_json(&self, alarm_ms: u32) -> Value {
        let (width, height) = self.display.size();
        json!({
            "width": width,
            "height": height,
            "x": self.col,
            "y": self.row,
            "backlight": self.backlight_on(),
            "alarmMs": alarm_ms,
        })
    }

    /// Display form. The alarm field is only offered with a buzzer.
    pub fn render_page(&self, with_alarm: bool) -> String {
        let (width, height) = self.display.size();
        let mut page = format!(
            "<html><head><title>Display</title></head><body><h1>Display</h1>\
             <p>{}x{} characters, backlight {}</p>\
             <form method='post' action='{}'>",
            width,
            height,
            if self.backlight_on() { "on" } else { "off" },
            DISPLAY_PATH
        );
        page.push_str("Message: <input name='msg'><br>\n");
        page.push_str(&format!(
            "Position X: <input name='x' value='{}'>, Y: <input name='y' value='{}'><br>\n",
            self.col, self.row
        ));
        page.push_str("<input type='checkbox' name='clear' value='1'>Clear<br>\n");
        page.push_str("Backlight: <input name='backlight'> <i>(seconds)</i><br>\n");
        if with_alarm {
            page.push_str("Alarm: <input name='alarm'> <i>(times 0.1 second)</i><br>\n");
        }
        page.push_str(&format!(
            "<input type='submit'></form><p>REST interface: POST JSON to {}</p></body></html>",
            DISPLAY_API_PATH
        ));
        page
    }
}
