//! Wi-Fi station bring-up.
//!
//! The agent needs the network interface up before the session thread
//! starts probing the broker. Credentials are baked in at build time
//! (`SMARTLIGHT_WIFI_SSID`, `SMARTLIGHT_WIFI_PASSWORD`) and validated here;
//! on hardware [`bring_up`] drives the ESP-IDF station and waits for an IP
//! for at most `net_init_timeout_ms`.

use core::fmt;

use heapless::String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    InvalidSsid,
    InvalidPassword,
    /// ESP-IDF driver error code.
    Driver(i32),
    /// Interface did not come up within the configured timeout.
    Timeout,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (8-64 bytes, or empty for open)"),
            Self::Driver(rc) => write!(f, "Wi-Fi driver error (rc={rc})"),
            Self::Timeout => write!(f, "network interface did not come up in time"),
        }
    }
}

impl std::error::Error for WifiError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    ssid: String<32>,
    password: String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, WifiError> {
        if ssid.is_empty() || !is_printable_ascii(ssid) {
            return Err(WifiError::InvalidSsid);
        }
        if !password.is_empty() && password.len() < 8 {
            return Err(WifiError::InvalidPassword);
        }
        Ok(Self {
            ssid: String::try_from(ssid).map_err(|()| WifiError::InvalidSsid)?,
            password: String::try_from(password).map_err(|()| WifiError::InvalidPassword)?,
        })
    }

    /// Credentials compiled into the image.
    pub fn from_build_env() -> Result<Self, WifiError> {
        Self::new(
            option_env!("SMARTLIGHT_WIFI_SSID").unwrap_or(""),
            option_env!("SMARTLIGHT_WIFI_PASSWORD").unwrap_or(""),
        )
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

#[cfg(target_os = "espidf")]
pub use esp::bring_up;

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;
    use std::time::Instant;

    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys::EspError;
    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
    use log::{info, warn};

    use super::{WifiCredentials, WifiError};

    const POLL: Duration = Duration::from_millis(100);

    fn driver(e: EspError) -> WifiError {
        WifiError::Driver(e.code())
    }

    /// Start the station, join the configured network and wait for an IP.
    /// The returned driver must be kept alive for the network to stay up.
    pub fn bring_up(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        credentials: &WifiCredentials,
        timeout: Duration,
    ) -> Result<BlockingWifi<EspWifi<'static>>, WifiError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs)).map_err(driver)?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop).map_err(driver)?;

        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: credentials.ssid.as_str().try_into().map_err(|_| WifiError::InvalidSsid)?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        };
        wifi.set_configuration(&Configuration::Client(client)).map_err(driver)?;

        wifi.start().map_err(driver)?;
        info!("wifi: joining '{}'", credentials.ssid());
        wifi.connect().map_err(driver)?;

        let deadline = Instant::now() + timeout;
        while !wifi.is_up().map_err(driver)? {
            if Instant::now() >= deadline {
                warn!("wifi: no IP after {} ms", timeout.as_millis());
                return Err(WifiError::Timeout);
            }
            std::thread::sleep(POLL);
        }

        let ip = wifi.wifi().sta_netif().get_ip_info().map_err(driver)?;
        info!("wifi: up, address {}", ip.ip);
        Ok(wifi)
    }
}
