use core::convert::TryInto;

use embedded_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration,
};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use webhook_buttons::{ConfigRecord, ConfigStore};

use crate::config_file::{FileConfigStore, WIFI_CONFIG_PATH};

const AP_SSID: &str = "WebhookButtons";
const AP_CHANNEL: u8 = 6;
const AP_MAX_CONNECTIONS: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    AccessPoint,
    Station,
}

impl WifiMode {
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "ap" | "access-point" => Some(Self::AccessPoint),
            "sta" | "station" => Some(Self::Station),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WifiSettings {
    pub mode: WifiMode,
    pub ssid: String,
    pub password: String,
}

impl WifiSettings {
    /// Read `mode`, `ssid` and `password`. Missing keys mean access point.
    pub fn from_record(record: &ConfigRecord) -> Self {
        let ssid = record.get("ssid", "").trim().to_string();
        let mode = WifiMode::from_str(&record.get("mode", "")).unwrap_or(if ssid.is_empty() {
            WifiMode::AccessPoint
        } else {
            WifiMode::Station
        });
        Self {
            mode,
            ssid,
            password: record.get("password", ""),
        }
    }

    pub fn load() -> Self {
        let mut store = FileConfigStore::new(WIFI_CONFIG_PATH);
        match store.load() {
            Ok(record) => Self::from_record(&record),
            Err(err) => {
                log::warn!("[WIFI] settings unreadable, using access point: {}", err);
                Self::from_record(&ConfigRecord::new())
            }
        }
    }

    fn wants_station(&self) -> bool {
        self.mode == WifiMode::Station && !self.ssid.is_empty()
    }
}

pub struct WifiManager {
    wifi: BlockingWifi<EspWifi<'static>>,
    settings: WifiSettings,
    url: String,
}

impl WifiManager {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        settings: WifiSettings,
    ) -> Result<Self, String> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), nvs)
            .map_err(|err| format!("wifi init failed: {}", err))?;
        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)
            .map_err(|err| format!("wifi wrapper init failed: {}", err))?;
        Ok(Self {
            wifi,
            settings,
            url: String::new(),
        })
    }

    /// Base URL of the web interface once the network is up.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Join the configured station, or fall back to an open access point.
    pub fn start(&mut self) -> Result<(), String> {
        if self.settings.wants_station() {
            match self.start_station() {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log::warn!("[WIFI] station failed, falling back to access point: {}", err);
                    let _ = self.wifi.disconnect();
                    let _ = self.wifi.stop();
                }
            }
        }
        self.start_access_point()
    }

    fn start_access_point(&mut self) -> Result<(), String> {
        let conf = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: AP_SSID
                .try_into()
                .map_err(|_| String::from("AP SSID too long (max 32)"))?,
            ssid_hidden: false,
            channel: AP_CHANNEL,
            secondary_channel: None,
            auth_method: AuthMethod::None,
            max_connections: AP_MAX_CONNECTIONS,
            ..Default::default()
        });

        self.wifi
            .set_configuration(&conf)
            .map_err(|err| format!("wifi ap config failed: {}", err))?;
        self.wifi
            .start()
            .map_err(|err| format!("wifi ap start failed: {}", err))?;
        self.wifi
            .wait_netif_up()
            .map_err(|err| format!("wifi ap netif up failed: {}", err))?;

        let ip = self
            .wifi
            .wifi()
            .ap_netif()
            .get_ip_info()
            .map_err(|err| format!("wifi ap ip failed: {}", err))?
            .ip;
        self.url = format!("http://{}/", ip);
        log::info!("[WIFI] open access point '{}' at {}", AP_SSID, self.url);
        Ok(())
    }

    fn start_station(&mut self) -> Result<(), String> {
        let ssid = self
            .settings
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| String::from("STA SSID too long (max 32)"))?;

        let password = self.settings.password.trim();
        let (auth_method, password) = if password.is_empty() {
            (AuthMethod::None, Default::default())
        } else {
            (
                AuthMethod::WPA2Personal,
                password
                    .try_into()
                    .map_err(|_| String::from("STA password too long (max 64)"))?,
            )
        };

        let conf = Configuration::Client(ClientConfiguration {
            ssid,
            bssid: None,
            auth_method,
            password,
            channel: None,
            ..Default::default()
        });

        self.wifi
            .set_configuration(&conf)
            .map_err(|err| format!("wifi sta config failed: {}", err))?;
        self.wifi
            .start()
            .map_err(|err| format!("wifi sta start failed: {}", err))?;
        self.wifi
            .connect()
            .map_err(|err| format!("wifi sta connect failed: {}", err))?;
        self.wifi
            .wait_netif_up()
            .map_err(|err| format!("wifi sta netif up failed: {}", err))?;

        let ip = self
            .wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .map_err(|err| format!("wifi sta ip failed: {}", err))?
            .ip;
        self.url = format!("http://{}/", ip);
        log::info!("[WIFI] joined '{}' at {}", self.settings.ssid, self.url);
        Ok(())
    }
}
