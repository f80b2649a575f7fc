// Platform services the update scheduler runs on: time, yielding, restart

use esp_idf_hal::delay::FreeRtos;
use esp_idf_sys::{esp_restart, esp_timer_get_time};
use log::info;
use update_core::{Clock, DeviceControl};

/// Milliseconds since boot from the high-resolution timer. Delays go
/// through FreeRTOS so the scheduler yields instead of spinning.
#[derive(Clone, Copy, Default)]
pub struct EspClock;

impl Clock for EspClock {
    fn now_ms(&self) -> u64 {
        let micros = unsafe { esp_timer_get_time() };
        (micros.max(0) as u64) / 1000
    }

    fn delay_ms(&self, ms: u32) {
        FreeRtos::delay_ms(ms.max(1));
        feed_watchdog();
    }
}

#[derive(Default)]
pub struct EspDevice;

impl DeviceControl for EspDevice {
    fn restart(&mut self) {
        info!("Restarting in 1 s...");
        log::logger().flush();

        // Give some time for final operations
        FreeRtos::delay_ms(1000);

        unsafe { esp_restart(); }
    }
}

/// Reconfigure the task watchdog and subscribe the current task.
pub fn init_watchdog(timeout_ms: u32) {
    unsafe {
        // First deinit if already initialized
        let _ = esp_idf_sys::esp_task_wdt_deinit();

        let wdt_config = esp_idf_sys::esp_task_wdt_config_t {
            timeout_ms,
            idle_core_mask: 0,
            trigger_panic: false,
        };
        let result = esp_idf_sys::esp_task_wdt_init(&wdt_config as *const _);
        if result != esp_idf_sys::ESP_OK {
            log::warn!("Failed to init watchdog: {:?}", result);
            return;
        }
        info!("Watchdog timeout set to {} ms", timeout_ms);

        let add_result = esp_idf_sys::esp_task_wdt_add(std::ptr::null_mut());
        if add_result == esp_idf_sys::ESP_OK {
            info!("Current task added to watchdog monitoring");
        } else {
            log::warn!("Failed to add task to watchdog: {:?}", add_result);
        }
    }
}

pub fn feed_watchdog() {
    // Not an error when the calling task is not subscribed
    let _ = unsafe { esp_idf_sys::esp_task_wdt_reset() };
}
