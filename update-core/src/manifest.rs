/// Release manifest parsing.
///
/// The distribution server answers with a release document in the GitHub
/// releases shape: a `tag_name` and an `assets` list whose first entry carries
/// the `browser_download_url` of the firmware image.
use serde::Deserialize;

use crate::error::UpdateError;
use crate::transport::DeclaredLength;

/// Latest published release as seen by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteManifest {
    pub identifier: String,
    pub download_locator: String,
    /// Asset size from the manifest, if listed. Informational only; the
    /// download trusts the transfer's own length header and a disagreement
    /// is just logged.
    pub size_hint: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDocument {
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    browser_download_url: Option<String>,
    size: Option<u64>,
}

impl RemoteManifest {
    pub fn parse(body: &[u8]) -> Result<Self, UpdateError> {
        let doc: ReleaseDocument =
            serde_json::from_slice(body).map_err(|e| UpdateError::Parse(e.to_string()))?;

        let identifier = doc
            .tag_name
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| UpdateError::Parse("missing tag_name".to_string()))?;

        let asset = doc
            .assets
            .into_iter()
            .next()
            .ok_or_else(|| UpdateError::Parse("release has no assets".to_string()))?;

        let download_locator = asset
            .browser_download_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| UpdateError::Parse("first asset has no browser_download_url".to_string()))?;

        Ok(Self {
            identifier,
            download_locator,
            size_hint: asset.size,
        })
    }

    /// False only when both sides give a size and they differ.
    pub fn size_agrees_with(&self, declared: DeclaredLength) -> bool {
        match (self.size_hint, declared.known()) {
            (Some(listed), Some(declared)) => listed == declared,
            _ => true,
        }
    }
}
