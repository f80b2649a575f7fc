use anyhow::{bail, Result};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

use crate::system::feed_watchdog;

pub struct WifiManager {
    wifi: BlockingWifi<EspWifi<'static>>,
    pub ssid: String,
}

impl WifiManager {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        ssid: &str,
        password: &str,
    ) -> Result<Self> {
        log::info!("Initializing WiFi for SSID: '{}'", ssid);

        if ssid.is_empty() {
            log::error!("WiFi SSID is empty! Check device_config.h");
            bail!("WiFi SSID cannot be empty");
        }

        let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;

        let cfg = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into()
                .map_err(|_| anyhow::anyhow!("Invalid SSID format: {}", ssid))?,
            password: password.try_into()
                .map_err(|_| anyhow::anyhow!("Invalid password format"))?,
            auth_method: if password.is_empty() {
                log::warn!("WiFi password is empty, using open network");
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });
        esp_wifi.set_configuration(&cfg)?;

        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

        Ok(Self {
            wifi,
            ssid: ssid.to_string(),
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        log::info!("Starting WiFi...");
        self.wifi.start()?;

        log::info!("Connecting to {}...", self.ssid);
        self.wifi.connect()?;
        feed_watchdog();

        log::info!("Waiting for DHCP...");
        self.wifi.wait_netif_up()?;
        feed_watchdog();

        log::info!("WiFi connected, IP: {}", self.ip().unwrap_or_else(|| "?".to_string()));

        // Power save drops long transfers
        unsafe {
            use esp_idf_sys::*;
            let result = esp_wifi_set_ps(wifi_ps_type_t_WIFI_PS_NONE);
            if result != ESP_OK {
                log::warn!("Failed to set WiFi power save mode: {:?}", result);
            }
        }

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    /// Reconnect after the station dropped. Errors are left to the next call.
    pub fn ensure_connected(&mut self) {
        if self.is_connected() {
            return;
        }
        log::warn!("WiFi connection lost, reconnecting...");
        if let Err(e) = self.wifi.connect().and_then(|_| self.wifi.wait_netif_up()) {
            log::warn!("WiFi reconnect failed: {:?}", e);
        }
    }

    pub fn ip(&self) -> Option<String> {
        self.wifi.wifi().sta_netif().get_ip_info().ok()
            .map(|ip_info| format!("{}", ip_info.ip))
    }
}
