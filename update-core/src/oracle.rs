use log::{debug, info, warn};

use crate::clock::Clock;
use crate::config::DownloadPolicy;
use crate::error::UpdateError;
use crate::manifest::RemoteManifest;
use crate::transport::{pump, Flow, HttpTransport, RequestOptions};

/// Answers "what is the latest published release?".
///
/// One request per call and no retry: a failed query is simply reported and
/// the next attempt waits for the next scheduled poll.
pub trait VersionOracle {
    fn check_latest<C: Clock>(&mut self, clock: &C) -> Result<RemoteManifest, UpdateError>;
}

/// Oracle backed by a JSON release manifest fetched over HTTP.
pub struct ManifestOracle<T> {
    transport: T,
    url: String,
    max_bytes: usize,
    policy: DownloadPolicy,
}

impl<T: HttpTransport> ManifestOracle<T> {
    pub fn new(transport: T, url: impl Into<String>, max_bytes: usize, policy: DownloadPolicy) -> Self {
        Self {
            transport,
            url: url.into(),
            max_bytes,
            policy,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn fetch_body<C: Clock>(&mut self, clock: &C) -> Result<Vec<u8>, UpdateError> {
        let mut response = self.transport.get(&self.url, &RequestOptions::JSON)?;
        info!("HTTP request status {}", response.status);

        if !response.is_success() {
            return Err(UpdateError::HttpStatus(response.status));
        }

        let max_bytes = self.max_bytes;
        let mut body = Vec::new();
        pump(&mut response.body, clock, &self.policy, |chunk| {
            if body.len() + chunk.len() > max_bytes {
                return Err(UpdateError::Parse(format!("manifest exceeds {} bytes", max_bytes)));
            }
            body.extend_from_slice(chunk);
            Ok(Flow::Continue)
        })?;

        debug!("Manifest body: {} bytes", body.len());
        Ok(body)
    }
}

impl<T: HttpTransport> VersionOracle for ManifestOracle<T> {
    fn check_latest<C: Clock>(&mut self, clock: &C) -> Result<RemoteManifest, UpdateError> {
        info!("Polling {}", self.url);

        let manifest = self
            .fetch_body(clock)
            .and_then(|body| RemoteManifest::parse(&body))
            .map_err(|e| {
                warn!("Check failed: {}", e);
                e
            })?;

        info!("Server tag name is {}", manifest.identifier);
        Ok(manifest)
    }
}
