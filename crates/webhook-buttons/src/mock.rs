//! Mock implementations for testing
//!
//! Host-side stand-ins for the GPIO, I2C, HTTP, buzzer and display
//! collaborators.

use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::Cell;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};

use crate::buzzer::{Buzzer, BUZZER_UNIT_MS};
use crate::display::TextDisplay;
use crate::request::{GetRequest, HttpTransport, TlsTrust};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPinError;

impl digital::Error for MockPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Pull-up input whose level is set by the test. Clones share the level.
#[derive(Debug, Clone)]
pub struct MockPin {
    low: Rc<Cell<bool>>,
    faulty: Rc<Cell<bool>>,
}

impl MockPin {
    /// Idle (HIGH) input.
    pub fn new() -> Self {
        Self {
            low: Rc::new(Cell::new(false)),
            faulty: Rc::new(Cell::new(false)),
        }
    }

    pub fn press(&self) {
        self.low.set(true);
    }

    pub fn release(&self) {
        self.low.set(false);
    }

    pub fn set_low(&self, low: bool) {
        self.low.set(low);
    }

    /// Make reads fail.
    pub fn set_faulty(&self, faulty: bool) {
        self.faulty.set(faulty);
    }
}

impl Default for MockPin {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for MockPin {
    type Error = MockPinError;
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        if self.faulty.get() {
            return Err(MockPinError);
        }
        Ok(self.low.get())
    }
}

/// Output that remembers its level. Clones share the level.
#[derive(Debug, Clone)]
pub struct MockOutputPin {
    high: Rc<Cell<Option<bool>>>,
}

impl MockOutputPin {
    pub fn new() -> Self {
        Self {
            high: Rc::new(Cell::new(None)),
        }
    }

    pub fn is_high(&self) -> bool {
        self.high.get() == Some(true)
    }

    pub fn is_low(&self) -> bool {
        self.high.get() == Some(false)
    }
}

impl Default for MockOutputPin {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for MockOutputPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for MockOutputPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(Some(false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.set(Some(true));
        Ok(())
    }
}

/// Owned copy of a request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub root_certificate: Option<String>,
    pub fingerprint: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTransportError(pub String);

/// Transport answering every GET with a fixed status, or failing to connect.
#[derive(Debug)]
pub struct MockTransport {
    status: Option<u16>,
    requests: Vec<RecordedRequest>,
}

impl MockTransport {
    pub fn responding(status: u16) -> Self {
        Self {
            status: Some(status),
            requests: Vec::new(),
        }
    }

    /// Connection setup always fails.
    pub fn failing() -> Self {
        Self {
            status: None,
            requests: Vec::new(),
        }
    }

    pub fn set_status(&mut self, status: Option<u16>) {
        self.status = status;
    }

    pub fn requests(&self) -> &[RecordedRequest] {
        &self.requests
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }
}

impl HttpTransport for MockTransport {
    type Error = MockTransportError;

    fn get(&mut self, request: &GetRequest<'_>) -> Result<u16, Self::Error> {
        let (root_certificate, fingerprint) = match request.tls {
            Some(TlsTrust::RootCertificate(pem)) => (Some(pem.to_string()), None),
            Some(TlsTrust::Fingerprint(fp)) => (None, Some(fp.to_string())),
            None => (None, None),
        };
        self.requests.push(RecordedRequest {
            url: request.url.to_string(),
            root_certificate,
            fingerprint,
            headers: request
                .headers
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        });
        self.status
            .ok_or_else(|| MockTransportError(String::from("connection refused")))
    }
}

/// Buzzer that records every `set` call.
#[derive(Debug, Default)]
pub struct MockBuzzer {
    pub beeps: Vec<(u16, u32)>,
    pub polls: usize,
}

impl Buzzer for MockBuzzer {
    fn set(&mut self, units: u16, now_ms: u32) {
        self.beeps.push((units, now_ms));
    }

    fn remaining_ms(&self, now_ms: u32) -> u32 {
        self.beeps.last().map_or(0, |(units, at)| {
            (at + u32::from(*units) * BUZZER_UNIT_MS).saturating_sub(now_ms)
        })
    }

    fn poll(&mut self, _now_ms: u32) {
        self.polls += 1;
    }
}

/// Character grid standing in for an LCD.
#[derive(Debug, Clone)]
pub struct MockDisplay {
    rows: Vec<Vec<char>>,
    col: u8,
    row: u8,
    backlight: bool,
    commands: usize,
}

impl MockDisplay {
    pub fn new(width: u8, height: u8) -> Self {
        Self {
            rows: vec![vec![' '; usize::from(width)]; usize::from(height)],
            col: 0,
            row: 0,
            backlight: false,
            commands: 0,
        }
    }

    pub fn row_text(&self, row: usize) -> String {
        self.rows[row].iter().collect()
    }

    pub fn backlight(&self) -> bool {
        self.backlight
    }

    /// Number of calls made through [`TextDisplay`].
    pub fn commands(&self) -> usize {
        self.commands
    }
}

impl TextDisplay for MockDisplay {
    type Error = core::convert::Infallible;

    fn size(&self) -> (u8, u8) {
        let width = self.rows.first().map_or(0, Vec::len);
        (width as u8, self.rows.len() as u8)
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.commands += 1;
        for row in &mut self.rows {
            row.fill(' ');
        }
        self.col = 0;
        self.row = 0;
        Ok(())
    }

    fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), Self::Error> {
        self.commands += 1;
        self.col = col;
        self.row = row;
        Ok(())
    }

    fn write_char(&mut self, ch: char) -> Result<(), Self::Error> {
        self.commands += 1;
        if let Some(cell) = self
            .rows
            .get_mut(usize::from(self.row))
            .and_then(|row| row.get_mut(usize::from(self.col)))
        {
            *cell = ch;
        }
        self.col = self.col.saturating_add(1);
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), Self::Error> {
        self.commands += 1;
        self.backlight = on;
        Ok(())
    }
}
