//! Top-level update control loop.
//!
//! The scheduler owns the poll timer and the single apply session. Everything
//! runs on the caller's thread: the oracle, the download and the apply happen
//! one after another inside `tick`/`force_check`, so only one session can be
//! active at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::applier::{ApplyOutcome, FirmwareStorage, UpdateApplier, UpdateSession};
use crate::clock::Clock;
use crate::config::UpdateConfig;
use crate::downloader::ImageSource;
use crate::error::UpdateError;
use crate::oracle::VersionOracle;
use crate::version::InstalledVersion;

/// Restarts the device into the newly activated image.
pub trait DeviceControl {
    fn restart(&mut self);
}

/// When the last version check happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollTimer {
    last_poll: Option<u64>,
}

impl PollTimer {
    pub const fn new() -> Self {
        Self { last_poll: None }
    }

    pub fn last_poll(&self) -> Option<u64> {
        self.last_poll
    }

    /// A timer that has never fired is always due.
    pub fn is_due(&self, now_ms: u64, interval_ms: u64) -> bool {
        match self.last_poll {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= interval_ms,
        }
    }

    pub fn mark(&mut self, now_ms: u64) {
        self.last_poll = Some(now_ms);
    }
}

/// Cross-thread request for an immediate check, e.g. from a remote command
/// handler. Requests coalesce until the control loop picks them up.
#[derive(Debug, Clone, Default)]
pub struct UpdateTrigger {
    pending: Arc<AtomicBool>,
}

impl UpdateTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clears and returns the pending flag.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Interval not elapsed (or periodic checks disabled); nothing was done.
    NotDue,
    /// The version query failed. Retried at the next interval.
    QueryFailed(UpdateError),
    UpToDate { remote: String },
    /// New image committed; the device restart has been requested.
    Applied { version: String, bytes: u64 },
    ApplyFailed { version: String, error: UpdateError },
}

pub struct UpdateScheduler<O, D, S, C, R> {
    config: UpdateConfig,
    installed: InstalledVersion,
    oracle: O,
    source: D,
    applier: UpdateApplier<S>,
    clock: C,
    device: R,
    timer: PollTimer,
    trigger: UpdateTrigger,
}

impl<O, D, S, C, R> UpdateScheduler<O, D, S, C, R>
where
    O: VersionOracle,
    D: ImageSource,
    S: FirmwareStorage,
    C: Clock,
    R: DeviceControl,
{
    pub fn new(
        config: UpdateConfig,
        installed: InstalledVersion,
        oracle: O,
        source: D,
        storage: S,
        clock: C,
        device: R,
    ) -> Self {
        Self {
            config,
            installed,
            oracle,
            source,
            applier: UpdateApplier::new(storage),
            clock,
            device,
            timer: PollTimer::new(),
            trigger: UpdateTrigger::new(),
        }
    }

    pub fn installed(&self) -> &InstalledVersion {
        &self.installed
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    pub fn timer(&self) -> &PollTimer {
        &self.timer
    }

    pub fn session(&self) -> &UpdateSession {
        self.applier.session()
    }

    pub fn storage(&self) -> &S {
        self.applier.storage()
    }

    pub fn device(&self) -> &R {
        &self.device
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Handle for requesting a forced check from another thread.
    pub fn trigger(&self) -> UpdateTrigger {
        self.trigger.clone()
    }

    /// Periodic entry point. A no-op until the poll interval has elapsed.
    pub fn tick(&mut self, now_ms: u64) -> CheckOutcome {
        if !self.config.enabled || !self.timer.is_due(now_ms, self.config.poll_interval_ms) {
            return CheckOutcome::NotDue;
        }
        self.check(now_ms)
    }

    /// Operator-requested check. Skips the interval gate but still compares
    /// versions, so the installed release is never re-applied.
    pub fn force_check(&mut self, now_ms: u64) -> CheckOutcome {
        info!("Forced update check requested");
        self.check(now_ms)
    }

    /// One control-loop step: serves a pending trigger, otherwise ticks.
    pub fn service(&mut self) -> CheckOutcome {
        let now = self.clock.now_ms();
        if self.trigger.take() {
            self.force_check(now)
        } else {
            self.tick(now)
        }
    }

    fn check(&mut self, now_ms: u64) -> CheckOutcome {
        let manifest = match self.oracle.check_latest(&self.clock) {
            Ok(manifest) => manifest,
            Err(e) => {
                self.timer.mark(now_ms);
                return CheckOutcome::QueryFailed(e);
            }
        };

        info!("Current release installed on this device is {}", self.installed);
        if !self.installed.differs_from(&manifest.identifier) {
            info!("Firmware is up to date");
            self.timer.mark(now_ms);
            return CheckOutcome::UpToDate {
                remote: manifest.identifier,
            };
        }

        info!("New release download URI is {}", manifest.download_locator);
        let outcome = match self.source.open(&manifest.download_locator) {
            Ok(download) => {
                if !manifest.size_agrees_with(download.declared) {
                    warn!(
                        "Manifest lists {} bytes but the server declares {}",
                        manifest.size_hint.unwrap_or_default(),
                        download.declared
                    );
                }
                self.applier.run(download, &self.clock, &self.config.download)
            }
            Err(e) => ApplyOutcome::Failed(e),
        };
        self.timer.mark(now_ms);

        match outcome {
            ApplyOutcome::Complete { bytes } => {
                info!("Restarting into {}...", manifest.identifier);
                self.device.restart();
                CheckOutcome::Applied {
                    version: manifest.identifier,
                    bytes,
                }
            }
            ApplyOutcome::Failed(error) => {
                warn!(
                    "Update to {} failed ({:?}): {}; staying on {}",
                    manifest.identifier,
                    error.kind(),
                    error,
                    self.installed
                );
                CheckOutcome::ApplyFailed {
                    version: manifest.identifier,
                    error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_timer_is_due() {
        assert!(PollTimer::new().is_due(0, 3_600_000));
    }

    #[test]
    fn timer_waits_for_the_interval() {
        let mut timer = PollTimer::new();
        timer.mark(1_000);
        assert!(!timer.is_due(1_000, 500));
        assert!(!timer.is_due(1_499, 500));
        assert!(timer.is_due(1_500, 500));
    }

    #[test]
    fn clock_going_backwards_is_not_due() {
        let mut timer = PollTimer::new();
        timer.mark(10_000);
        assert!(!timer.is_due(5_000, 1_000));
    }

    #[test]
    fn trigger_requests_coalesce() {
        let trigger = UpdateTrigger::new();
        let remote = trigger.clone();
        remote.request();
        remote.request();
        assert!(trigger.is_pending());
        assert!(trigger.take());
        assert!(!trigger.take());
    }

    #[test]
    fn trigger_works_across_threads() {
        let trigger = UpdateTrigger::new();
        let remote = trigger.clone();
        std::thread::spawn(move || remote.request()).join().unwrap();
        assert!(trigger.take());
    }
}
