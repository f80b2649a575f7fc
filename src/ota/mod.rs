// OTA (Over-The-Air) update module
//
// Update flow, driven by update_core::UpdateScheduler:
// 1. Poll the latest-release document
// 2. Compare its tag with the installed RELEASE_TAG
// 3. Stream the image into the inactive OTA partition
// 4. Validate and set boot partition
// 5. Restart

pub mod storage;

pub use storage::OtaPartitionStorage;
