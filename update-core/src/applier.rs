//! Streaming apply state machine.
//!
//! `Idle -> InProgress -> {Complete | Failed}`, then back to `Idle` once the
//! caller has seen the outcome. Bytes reach storage strictly in arrival order
//! and the staged image is committed only when the byte count matches the
//! declared length exactly (or, for unknown lengths, when the stream closes).

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::config::DownloadPolicy;
use crate::downloader::Download;
use crate::error::{StorageError, UpdateError};
use crate::transport::{pump_bounded, ByteSource, DeclaredLength, Flow, PumpEnd};

/// Sequential-write firmware staging area.
///
/// `commit_and_activate` is the point of no return: after it succeeds the
/// device boots the staged image on the next restart.
pub trait FirmwareStorage {
    fn begin(&mut self, size_hint: Option<u64>) -> Result<(), StorageError>;
    fn write(&mut self, data: &[u8]) -> Result<(), StorageError>;
    fn commit_and_activate(&mut self) -> Result<(), StorageError>;

    /// Releases whatever a failed session still holds. Best effort; the
    /// staged bytes are never activated.
    fn abort(&mut self) {}
}

impl<S: FirmwareStorage + ?Sized> FirmwareStorage for &mut S {
    fn begin(&mut self, size_hint: Option<u64>) -> Result<(), StorageError> {
        (**self).begin(size_hint)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(data)
    }

    fn commit_and_activate(&mut self) -> Result<(), StorageError> {
        (**self).commit_and_activate()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSession {
    pub expected: DeclaredLength,
    pub written: u64,
    pub status: SessionStatus,
}

impl UpdateSession {
    pub const IDLE: Self = Self {
        expected: DeclaredLength::Unknown,
        written: 0,
        status: SessionStatus::Idle,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Complete { bytes: u64 },
    Failed(UpdateError),
}

pub struct UpdateApplier<S> {
    storage: S,
    session: UpdateSession,
    last_logged_step: u8,
}

impl<S: FirmwareStorage> UpdateApplier<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            session: UpdateSession::IDLE,
            last_logged_step: 0,
        }
    }

    pub fn session(&self) -> &UpdateSession {
        &self.session
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Percentage written, or `None` when the total is unknown.
    pub fn progress_percent(&self) -> Option<u8> {
        match self.session.expected {
            DeclaredLength::Known(total) if total > 0 => {
                Some(((self.session.written.min(total) * 100) / total) as u8)
            }
            _ => None,
        }
    }

    /// Opens a session for an image of the declared length.
    pub fn begin(&mut self, declared: DeclaredLength) -> Result<(), UpdateError> {
        if self.session.status == SessionStatus::InProgress {
            return Err(UpdateError::SessionActive);
        }

        self.session = UpdateSession {
            expected: declared,
            written: 0,
            status: SessionStatus::InProgress,
        };
        self.last_logged_step = 0;

        if declared == DeclaredLength::Known(0) {
            return Err(self.fail(UpdateError::InvalidLength("0".to_string())));
        }

        if let Err(e) = self.storage.begin(declared.known()) {
            return Err(self.fail(e.into()));
        }

        info!("Update session started ({})", declared);
        Ok(())
    }

    /// Appends one chunk. Returns `Some(total)` when this chunk completed and
    /// committed the image.
    pub fn accept_chunk(&mut self, chunk: &[u8]) -> Result<Option<u64>, UpdateError> {
        if self.session.status != SessionStatus::InProgress {
            return Err(StorageError::NotStarted.into());
        }
        if chunk.is_empty() {
            return Ok(None);
        }

        let after = self.session.written + chunk.len() as u64;
        if let DeclaredLength::Known(total) = self.session.expected {
            if after > total {
                return Err(self.fail(UpdateError::LengthMismatch {
                    expected: total,
                    received: after,
                }));
            }
        }

        if let Err(e) = self.storage.write(chunk) {
            return Err(self.fail(e.into()));
        }
        self.session.written = after;
        self.log_progress();

        match self.session.expected {
            DeclaredLength::Known(total) if after == total => self.commit().map(Some),
            _ => Ok(None),
        }
    }

    /// The byte source closed. Commits an unknown-length image, fails a
    /// short known-length one.
    pub fn end_of_stream(&mut self) -> Result<u64, UpdateError> {
        match self.session.status {
            SessionStatus::Complete => return Ok(self.session.written),
            SessionStatus::InProgress => {}
            _ => return Err(StorageError::NotStarted.into()),
        }

        match self.session.expected {
            DeclaredLength::Known(total) => Err(self.fail(UpdateError::LengthMismatch {
                expected: total,
                received: self.session.written,
            })),
            DeclaredLength::Unknown if self.session.written == 0 => {
                Err(self.fail(UpdateError::EmptyImage))
            }
            DeclaredLength::Unknown => self.commit(),
        }
    }

    /// Marks the running session failed. Storage is never committed.
    pub fn abort(&mut self, err: UpdateError) -> UpdateError {
        if self.session.status == SessionStatus::InProgress {
            self.fail(err)
        } else {
            err
        }
    }

    /// Back to `Idle`, ready for the next session.
    pub fn reset(&mut self) {
        self.session = UpdateSession::IDLE;
        self.last_logged_step = 0;
    }

    /// Drives one full session from an opened download to an outcome. The
    /// session is `Idle` again when this returns.
    pub fn run<B, C>(&mut self, download: Download<B>, clock: &C, policy: &DownloadPolicy) -> ApplyOutcome
    where
        B: ByteSource,
        C: Clock + ?Sized,
    {
        let Download { declared, mut stream } = download;

        info!("Downloading");
        let result = self.begin(declared).and_then(|()| {
            let end = pump_bounded(&mut stream, clock, policy, declared.known(), |chunk| {
                Ok(match self.accept_chunk(chunk)? {
                    Some(_) => Flow::Stop,
                    None => Flow::Continue,
                })
            });
            match end {
                Ok(PumpEnd::Stopped(_)) => Ok(self.session.written),
                Ok(PumpEnd::Closed(_)) => self.end_of_stream(),
                Err(e) => Err(self.abort(e)),
            }
        });

        let outcome = match result {
            Ok(bytes) => ApplyOutcome::Complete { bytes },
            Err(e) => ApplyOutcome::Failed(e),
        };
        self.reset();
        outcome
    }

    fn commit(&mut self) -> Result<u64, UpdateError> {
        if let Err(e) = self.storage.commit_and_activate() {
            return Err(self.fail(e.into()));
        }
        self.session.status = SessionStatus::Complete;
        info!("Update successful.");
        info!("Total size of new firmware: {}", self.session.written);
        Ok(self.session.written)
    }

    fn fail(&mut self, err: UpdateError) -> UpdateError {
        warn!(
            "Update failed after {} bytes: {}",
            self.session.written, err
        );
        self.session.status = SessionStatus::Failed;
        self.storage.abort();
        err
    }

    fn log_progress(&mut self) {
        match self.progress_percent() {
            Some(pct) => {
                let step = pct / 10;
                if step > self.last_logged_step {
                    self.last_logged_step = step;
                    info!("Update progress: {}% ({} bytes)", pct, self.session.written);
                }
            }
            None => debug!("Written {} bytes", self.session.written),
        }
    }
}
