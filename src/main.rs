use anyhow::Result;
use log::{info, warn};

mod config;
mod logging;
mod version;

#[cfg(target_os = "espidf")]
mod network;
#[cfg(target_os = "espidf")]
mod ota;
#[cfg(target_os = "espidf")]
mod remote;
#[cfg(target_os = "espidf")]
mod system;

#[cfg(target_os = "espidf")]
use esp_idf_sys as _; // Binstart

// Generate ESP-IDF app descriptor
#[cfg(target_os = "espidf")]
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

use crate::config::DeviceConfig;

#[cfg(target_os = "espidf")]
const WATCHDOG_TIMEOUT_MS: u32 = 30_000;
#[cfg(target_os = "espidf")]
const LOOP_DELAY_MS: u32 = 1_000;

/// Applies runtime settings from the loaded config and reports them.
fn announce(config: &DeviceConfig) {
    info!("ESP32 Auto-Update - {}", version::version_info());
    if !logging::set_max_level_from_str(&config.log_level) {
        warn!("Unknown log level '{}', keeping info", config.log_level);
    }
    info!("Installed release: {}", version::installed());
    info!("Release manifest: {}", config.update.manifest_url);
    info!(
        "Checking every {} s, {}",
        config.update.poll_interval_ms / 1000,
        if config.update.enabled { "enabled" } else { "disabled" }
    );
    info!(
        "Remote commands: {}",
        if config.remote_commands_enabled() { config.command_topic.as_str() } else { "off" }
    );
}

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use update_core::{CheckOutcome, ImageDownloader, ManifestOracle, UpdateScheduler};

    use crate::network::{EspHttpTransport, WifiManager};
    use crate::ota::OtaPartitionStorage;
    use crate::remote::RemoteCommands;
    use crate::system::{EspClock, EspDevice};

    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();
    logging::init_logger().map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;
    info!("Free heap: {} bytes", unsafe { esp_idf_sys::esp_get_free_heap_size() });

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let config = config::load_or_default(&nvs)?;
    announce(&config);

    let mut update = config.update.clone();
    if let Err(e) = update.validate() {
        warn!("Periodic update checks disabled: {}", e);
        update.enabled = false;
    }

    system::init_watchdog(WATCHDOG_TIMEOUT_MS);

    let mut wifi = WifiManager::new(
        peripherals.modem,
        sys_loop,
        nvs.clone(),
        &config.wifi_ssid,
        &config.wifi_password,
    )?;
    if let Err(e) = wifi.connect() {
        warn!("WiFi connect failed: {:?}, retrying from the main loop", e);
    }

    let oracle = ManifestOracle::new(
        EspHttpTransport::new(),
        update.manifest_url.clone(),
        update.max_manifest_bytes,
        update.download,
    );
    info!("Release checks against {}", oracle.url());
    let mut scheduler = UpdateScheduler::new(
        update,
        version::installed(),
        oracle,
        ImageDownloader::new(EspHttpTransport::new()),
        OtaPartitionStorage::new(),
        EspClock,
        EspDevice,
    );

    if !scheduler.config().enabled {
        warn!("Only remote update commands will trigger a check");
    }

    let _remote = if config.remote_commands_enabled() {
        match RemoteCommands::start(&config.mqtt_url, &config.command_topic, scheduler.trigger()) {
            Ok(remote) => Some(remote),
            Err(e) => {
                warn!("Remote commands unavailable: {:?}", e);
                None
            }
        }
    } else {
        None
    };

    loop {
        system::feed_watchdog();
        wifi.ensure_connected();

        match scheduler.service() {
            CheckOutcome::NotDue => {}
            CheckOutcome::Applied { version: tag, .. } => {
                // Only reached if the restart did not happen
                warn!("{} committed but still running {}", tag, scheduler.installed());
            }
            outcome => log::debug!("Check finished: {:?}", outcome),
        }

        FreeRtos::delay_ms(LOOP_DELAY_MS);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    logging::init_logger().map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;
    let config = config::load_or_default()?;
    announce(&config);
    warn!("This firmware needs an ESP-IDF target (e.g. --target xtensa-esp32s3-espidf); nothing to run on the host");
    Ok(())
}
