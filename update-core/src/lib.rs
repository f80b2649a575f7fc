//! Update Core - Hardware-independent firmware self-update logic
//!
//! Release checks, streaming download and the apply state machine, written
//! against small traits so the whole pipeline can be tested on the host
//! platform without ESP32 hardware.

pub mod applier;
pub mod clock;
pub mod command;
pub mod config;
pub mod downloader;
pub mod error;
pub mod manifest;
pub mod oracle;
pub mod scheduler;
pub mod transport;
pub mod version;

pub use applier::{ApplyOutcome, FirmwareStorage, SessionStatus, UpdateApplier, UpdateSession};
pub use clock::Clock;
pub use command::RemoteCommand;
pub use config::{DownloadPolicy, UpdateConfig};
pub use downloader::{Download, ImageDownloader, ImageSource};
pub use error::{ErrorKind, StorageError, TransportError, UpdateError};
pub use manifest::RemoteManifest;
pub use oracle::{ManifestOracle, VersionOracle};
pub use scheduler::{CheckOutcome, DeviceControl, PollTimer, UpdateScheduler, UpdateTrigger};
pub use transport::{ByteSource, DeclaredLength, HttpResponse, HttpTransport, ReadOutcome, RequestOptions};
pub use version::InstalledVersion;
