use anyhow::Result;
use serde::{Deserialize, Serialize};
use update_core::UpdateConfig;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};

#[cfg(target_os = "espidf")]
const CONFIG_NAMESPACE: &str = "autoupdate";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &str = "config";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    // WiFi settings
    pub wifi_ssid: String,
    pub wifi_password: String,

    // Remote commands; an empty URL disables the subscription
    pub mqtt_url: String,
    pub command_topic: String,

    pub log_level: String,

    // Release checks
    pub update: UpdateConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        // Compiled-in values come from device_config.h via build.rs
        let wifi_ssid = env!("WIFI_SSID");
        let wifi_password = env!("WIFI_PASSWORD");

        log::info!("Config default: SSID='{}', Password={}",
            wifi_ssid,
            if wifi_password.is_empty() { "<empty>" } else { "<set>" }
        );

        Self {
            wifi_ssid: wifi_ssid.to_string(),
            wifi_password: wifi_password.to_string(),
            mqtt_url: env!("MQTT_URL").to_string(),
            command_topic: env!("COMMAND_TOPIC").to_string(),
            log_level: "info".to_string(),
            update: UpdateConfig::with_manifest_url(env!("MANIFEST_URL")),
        }
    }
}

impl DeviceConfig {
    /// Fill blanks left by an older or partial stored config with the
    /// compiled-in values. Returns true if anything changed.
    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    pub fn merge_compiled_defaults(&mut self, defaults: &DeviceConfig) -> bool {
        let mut changed = false;
        if self.wifi_ssid.is_empty() || self.wifi_password.is_empty() {
            log::warn!("Stored WiFi credentials empty, using compiled defaults: SSID='{}'", defaults.wifi_ssid);
            self.wifi_ssid = defaults.wifi_ssid.clone();
            self.wifi_password = defaults.wifi_password.clone();
            changed = true;
        }
        if self.update.manifest_url.trim().is_empty() && !defaults.update.manifest_url.is_empty() {
            log::warn!("Stored manifest URL empty, using {}", defaults.update.manifest_url);
            self.update.manifest_url = defaults.update.manifest_url.clone();
            changed = true;
        }
        if self.command_topic.is_empty() {
            self.command_topic = defaults.command_topic.clone();
            changed = true;
        }
        changed
    }

    pub fn remote_commands_enabled(&self) -> bool {
        !self.mqtt_url.trim().is_empty() && !self.command_topic.trim().is_empty()
    }

    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(target_os = "espidf")]
impl DeviceConfig {
    pub fn save(&self, nvs_partition: &EspDefaultNvsPartition) -> Result<()> {
        save_to_nvs(nvs_partition, self)?;
        log::info!("Configuration saved to NVS");
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub fn load_or_default(nvs_partition: &EspDefaultNvsPartition) -> Result<DeviceConfig> {
    match load_from_nvs(nvs_partition) {
        Ok(mut config) => {
            log::info!("Loaded configuration from NVS");

            if config.merge_compiled_defaults(&DeviceConfig::default()) {
                if let Err(e) = config.save(nvs_partition) {
                    log::warn!("Failed to save merged config: {:?}", e);
                }
            }

            Ok(config)
        }
        Err(e) => {
            log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
            let config = DeviceConfig::default();

            // Try to save default config to NVS for next time
            if let Err(save_err) = config.save(nvs_partition) {
                log::warn!("Failed to save default config to NVS: {:?}", save_err);
            }

            Ok(config)
        }
    }
}

#[cfg(target_os = "espidf")]
fn load_from_nvs(nvs_partition: &EspDefaultNvsPartition) -> Result<DeviceConfig> {
    let nvs = EspNvs::new(nvs_partition.clone(), CONFIG_NAMESPACE, true)?;

    let mut buf = vec![0u8; 2048]; // Max config size
    let data = nvs.get_blob(CONFIG_KEY, &mut buf)?
        .ok_or_else(|| anyhow::anyhow!("Config not found in NVS"))?;

    DeviceConfig::from_json(data)
}

#[cfg(target_os = "espidf")]
fn save_to_nvs(nvs_partition: &EspDefaultNvsPartition, config: &DeviceConfig) -> Result<()> {
    let mut nvs = EspNvs::new(nvs_partition.clone(), CONFIG_NAMESPACE, true)?;

    let json = serde_json::to_vec(config)?;
    nvs.set_blob(CONFIG_KEY, &json)?;

    Ok(())
}

/// Without NVS the compiled defaults are all there is.
#[cfg(not(target_os = "espidf"))]
pub fn load_or_default() -> Result<DeviceConfig> {
    Ok(DeviceConfig::default())
}
