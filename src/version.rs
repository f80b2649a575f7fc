// Centralized version information

use update_core::InstalledVersion;

// Release tag this image was published under, set by build.rs
pub const RELEASE_TAG: &str = env!("RELEASE_TAG");

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

// What the update check compares the remote release against
pub fn installed() -> InstalledVersion {
    InstalledVersion::new(RELEASE_TAG)
}

// Version info string for logging
pub fn version_info() -> String {
    format!("Release: {}, Cargo: {}", RELEASE_TAG, CARGO_VERSION)
}
