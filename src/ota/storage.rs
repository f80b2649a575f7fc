// OTA partition storage - stages firmware using the ESP-IDF OTA API

use core::ffi::c_void;
use esp_idf_sys::{
    esp_ota_abort, esp_ota_begin, esp_ota_end, esp_ota_get_next_update_partition,
    esp_ota_handle_t, esp_ota_set_boot_partition, esp_ota_write, esp_partition_t,
    ESP_ERR_OTA_VALIDATE_FAILED, ESP_OK, OTA_SIZE_UNKNOWN,
};
use update_core::{FirmwareStorage, StorageError};

/// The inactive OTA slot. Each `begin` picks the next update partition
/// afresh and erases it. A failed or dropped session is aborted at once.
pub struct OtaPartitionStorage {
    update_partition: *const esp_partition_t,
    ota_handle: Option<esp_ota_handle_t>,
}

impl OtaPartitionStorage {
    pub fn new() -> Self {
        Self {
            update_partition: core::ptr::null(),
            ota_handle: None,
        }
    }

    fn abort_pending(&mut self) {
        if let Some(handle) = self.ota_handle.take() {
            log::warn!("Aborting unfinished OTA session");
            unsafe { esp_ota_abort(handle); }
        }
    }
}

impl FirmwareStorage for OtaPartitionStorage {
    fn begin(&mut self, size_hint: Option<u64>) -> Result<(), StorageError> {
        self.abort_pending();

        // Get the next OTA partition
        let update_partition = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };
        if update_partition.is_null() {
            return Err(StorageError::NoUpdatePartition);
        }

        let image_size = match size_hint {
            Some(size) => usize::try_from(size).map_err(|_| StorageError::BeginFailed)?,
            None => OTA_SIZE_UNKNOWN as usize,
        };

        let mut handle: esp_ota_handle_t = Default::default();
        let result = unsafe { esp_ota_begin(update_partition, image_size, &mut handle as *mut _) };
        if result != ESP_OK {
            log::error!("esp_ota_begin failed: {}", result);
            return Err(StorageError::BeginFailed);
        }

        let label = unsafe { core::ffi::CStr::from_ptr((*update_partition).label.as_ptr()) };
        log::info!("Writing to partition {:?} at offset 0x{:x}", label, unsafe { (*update_partition).address });

        self.update_partition = update_partition;
        self.ota_handle = Some(handle);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let handle = self.ota_handle.ok_or(StorageError::NotStarted)?;

        let result = unsafe { esp_ota_write(handle, data.as_ptr() as *const c_void, data.len()) };
        if result != ESP_OK {
            log::error!("esp_ota_write failed: {}", result);
            self.abort_pending();
            return Err(StorageError::WriteFailed);
        }
        Ok(())
    }

    fn commit_and_activate(&mut self) -> Result<(), StorageError> {
        // esp_ota_end releases the handle whatever the result
        let handle = self.ota_handle.take().ok_or(StorageError::NotStarted)?;

        let result = unsafe { esp_ota_end(handle) };
        if result == ESP_ERR_OTA_VALIDATE_FAILED as i32 {
            log::error!("Image validation failed, image is corrupted");
            return Err(StorageError::ValidationFailed);
        } else if result != ESP_OK {
            log::error!("esp_ota_end failed: {}", result);
            return Err(StorageError::ValidationFailed);
        }

        // Set the new boot partition
        let result = unsafe { esp_ota_set_boot_partition(self.update_partition) };
        if result != ESP_OK {
            log::error!("esp_ota_set_boot_partition failed: {}", result);
            return Err(StorageError::BootPartitionFailed);
        }

        log::info!("Boot partition switched");
        Ok(())
    }

    fn abort(&mut self) {
        self.abort_pending();
    }
}

impl Drop for OtaPartitionStorage {
    fn drop(&mut self) {
        // Clean up any ongoing OTA operation
        self.abort_pending();
    }
}
