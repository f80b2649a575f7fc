/// Release identifier of the firmware that is currently running.
///
/// Set once at build time and never changed while the device runs. Tags are
/// compared as opaque strings: any difference from the published tag counts as
/// an update, with no attempt at semantic version ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion(String);

impl InstalledVersion {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `remote` names a different release than the installed one.
    pub fn differs_from(&self, remote: &str) -> bool {
        self.0 != remote.trim()
    }
}

impl core::fmt::Display for InstalledVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
