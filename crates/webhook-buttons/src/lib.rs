//! Debounced push buttons that fire per-button HTTP GET webhooks, plus an
//! optional character display driven over HTTP. Hardware, network and
//! storage are reached through traits so the same logic runs on ESP32 and
//! on the host.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::unreachable,
        clippy::unwrap_used
    )
)]

extern crate alloc;

pub mod button;
pub mod buzzer;
pub mod config;
pub mod controller;
pub mod display;
pub mod hd44780;
pub mod percent;
pub mod request;

#[cfg(any(test, feature = "std"))]
pub mod mock;

pub use button::{
    ButtonConfig, ButtonEvent, ButtonState, Debouncer, DispatchOutcome, Edge, TriggerPolicy,
    DEBOUNCE_MS,
};
pub use buzzer::{Buzzer, NoBuzzer, PinBuzzer, BUZZER_UNIT_MS};
pub use config::{ConfigError, ConfigRecord, ConfigStore, MemoryConfigStore};
pub use controller::{
    parse_button_route, ApiError, ButtonArray, ButtonIndex, API_PATH, BUTTON_BEEP_UNITS,
    FORM_PATH,
};
pub use display::{
    DisplayUpdate, NoDisplay, TextDisplay, TextPanel, DEFAULT_BACKLIGHT_MS, DISPLAY_API_PATH,
    DISPLAY_PATH,
};
pub use hd44780::{Hd44780, PCF8574_I2C_ADDR};
pub use percent::{parse_form_args, FormArgs};
pub use request::{
    nul_terminated_pem, Authorization, DispatchError, GetRequest, HttpTransport, RequestProfile,
    TlsTrust, TlsTrustKind, AUTHORIZATION,
};
