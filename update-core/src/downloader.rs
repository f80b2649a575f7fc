use log::{info, warn};

use crate::error::UpdateError;
use crate::transport::{ByteSource, DeclaredLength, HttpTransport, RequestOptions};

/// An opened firmware transfer.
pub struct Download<S> {
    pub declared: DeclaredLength,
    pub stream: S,
}

/// Opens a firmware image for streaming.
pub trait ImageSource {
    type Stream: ByteSource;

    fn open(&mut self, locator: &str) -> Result<Download<Self::Stream>, UpdateError>;
}

/// Fetches firmware images over HTTP, following redirects to the final
/// content host.
pub struct ImageDownloader<T> {
    transport: T,
}

impl<T: HttpTransport> ImageDownloader<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: HttpTransport> ImageSource for ImageDownloader<T> {
    type Stream = T::Body;

    fn open(&mut self, locator: &str) -> Result<Download<T::Body>, UpdateError> {
        info!("Connecting to {}", locator);

        let response = self.transport.get(locator, &RequestOptions::BINARY)?;
        info!("Response: {}", response.status);

        if !response.is_success() {
            warn!("Cannot download firmware file");
            return Err(UpdateError::HttpStatus(response.status));
        }

        let declared = DeclaredLength::from_header(response.content_length.as_deref())?;
        info!("Firmware file size: {}", declared);

        Ok(Download {
            declared,
            stream: response.body,
        })
    }
}
