mod config_file;
mod http_transport;
mod runtime_diagnostics;
mod spiffs;
mod web_server;
mod wifi_manager;

use std::sync::{Arc, Mutex, PoisonError};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::{
    delay::{Ets, FreeRtos},
    gpio::{AnyIOPin, AnyOutputPin, IOPin, Input, Output, OutputPin as _, Pin, PinDriver, Pull},
    i2c::{I2cConfig, I2cDriver},
    peripherals::Peripherals,
    units::FromValueType,
};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use webhook_buttons::{
    ButtonArray, ButtonConfig, ButtonState, Hd44780, PinBuzzer, TextPanel, TlsTrustKind,
    TriggerPolicy, PCF8574_I2C_ADDR,
};

use config_file::{FileConfigStore, BUTTONS_CONFIG_PATH};
use http_transport::EspTransport;
use runtime_diagnostics::{log_heap, now_ms};
use web_server::WebServer;
use wifi_manager::{WifiManager, WifiSettings};

const TICK_MS: u32 = 10;
const LCD_COLS: u8 = 16;
const LCD_ROWS: u8 = 2;

pub type ButtonPin = PinDriver<'static, AnyIOPin, Input>;
pub type BuzzerPin = PinDriver<'static, AnyOutputPin, Output>;
pub type Lcd = Hd44780<I2cDriver<'static>, Ets>;
pub type FirmwareArray = ButtonArray<ButtonPin, EspTransport, PinBuzzer<BuzzerPin>, Lcd>;

/// Controller plus its store, locked together by the poll loop and httpd.
pub struct Device {
    pub array: FirmwareArray,
    pub store: FileConfigStore,
}

pub type SharedDevice = Arc<Mutex<Device>>;

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log_heap("startup");

    const REQUIRED_STACK_SIZE: u32 = 16 * 1024;
    let configured_stack = esp_idf_svc::sys::CONFIG_ESP_MAIN_TASK_STACK_SIZE;
    if configured_stack < REQUIRED_STACK_SIZE {
        log::warn!(
            "Stack size too small: {} bytes (need >= {}). Check sdkconfig.defaults",
            configured_stack,
            REQUIRED_STACK_SIZE
        );
    }

    let peripherals = Peripherals::take().unwrap();
    let sys_loop = EspSystemEventLoop::take().unwrap();
    let nvs = EspDefaultNvsPartition::take().ok();

    // Boot stays usable without persistence; edits then last until reset.
    if let Err(err) = spiffs::mount() {
        log::warn!("[CFG] {}", err);
    }

    let pins = peripherals.pins;
    // Wired buttons and which edges send the webhook.
    let button_pins: [(AnyIOPin, TriggerPolicy); 4] = [
        (pins.gpio4.downgrade(), TriggerPolicy::Press),
        (pins.gpio5.downgrade(), TriggerPolicy::Press),
        (pins.gpio6.downgrade(), TriggerPolicy::Both),
        (pins.gpio7.downgrade(), TriggerPolicy::Release),
    ];
    // Active-low piezo driver; `None` on boards without one.
    let buzzer_pin: Option<AnyOutputPin> = Some(pins.gpio10.downgrade_output());

    let button_count = button_pins.len();
    let buttons = button_pins
        .into_iter()
        .map(|(pin, policy)| {
            let gpio = pin.pin();
            let mut input = PinDriver::input(pin).unwrap();
            input.set_pull(Pull::Up).unwrap();
            ButtonState::new(ButtonConfig::new(gpio as u32, policy), input)
        })
        .collect();
    let buzzer = buzzer_pin.map(|pin| PinBuzzer::new(PinDriver::output(pin).unwrap()));

    // The LCD backpack is optional; without it the display pages answer 404.
    let i2c_config = I2cConfig::new().baudrate(100.kHz().into());
    let lcd = I2cDriver::new(peripherals.i2c0, pins.gpio1, pins.gpio0, &i2c_config)
        .map_err(|err| format!("{:?}", err))
        .and_then(|i2c| {
            Hd44780::new(i2c, Ets, PCF8574_I2C_ADDR, LCD_COLS, LCD_ROWS)
                .map_err(|err| format!("{:?}", err))
        });
    let panel = match lcd {
        Ok(lcd) => Some(TextPanel::new(lcd)),
        Err(err) => {
            log::warn!("[DSP] no LCD: {}", err);
            None
        }
    };

    let mut device = Device {
        array: ButtonArray::new(
            buttons,
            EspTransport::new(),
            buzzer,
            TlsTrustKind::RootCertificate,
        )
        .with_display(panel),
        store: FileConfigStore::new(BUTTONS_CONFIG_PATH),
    };
    device.array.config_load(&mut device.store);
    log::info!(
        "[CFG] button profiles from {}",
        device.store.path().display()
    );
    let device: SharedDevice = Arc::new(Mutex::new(device));

    let _wifi = match WifiManager::new(peripherals.modem, sys_loop, nvs, WifiSettings::load()) {
        Ok(mut wifi) => {
            match wifi.start() {
                Ok(()) => log::info!("[WIFI] configure buttons at {}buttons", wifi.url()),
                Err(err) => log::error!("[WIFI] network unavailable: {}", err),
            }
            Some(wifi)
        }
        Err(err) => {
            log::error!("[WIFI] {}", err);
            None
        }
    };
    log_heap("after_network");

    let _server = match WebServer::start(device.clone()) {
        Ok(server) => Some(server),
        Err(err) => {
            log::error!("[WEB] server start failed: {:?}", err);
            None
        }
    };

    log::info!(
        "[BTN] polling {} buttons every {} ms",
        button_count,
        TICK_MS
    );
    loop {
        let now = now_ms();
        device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .array
            .poll_tick(now);
        FreeRtos::delay_ms(TICK_MS);
    }
}
