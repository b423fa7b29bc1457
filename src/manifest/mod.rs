//! Manifest service contract
//!
//! Manifest materialization runs out of process: a side service turns a
//! repository reference plus parameter overrides into rendered manifests. The
//! controller only depends on this trait; `HttpManifestService` is the
//! production client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crd::ComponentParameter;
use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRequest {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub path: String,
    /// Symbolic or concrete revision; empty for the repository default.
    #[serde(default)]
    pub revision: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_overrides: Vec<ComponentParameter>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
    /// Concrete, content-addressable commit identifier the manifests were
    /// rendered from. Never symbolic.
    pub revision: String,

    /// Rendered manifests, each a serialized JSON object.
    #[serde(default)]
    pub manifests: Vec<String>,

    /// Parameters after applying overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ComponentParameter>,
}

#[async_trait]
pub trait ManifestService: Send + Sync {
    /// Render manifests for a source reference. Resolves any symbolic
    /// revision to a concrete commit identifier.
    async fn generate_manifests(&self, req: &ManifestRequest) -> Result<ManifestResponse>;
}

/// HTTP client for the manifest service side process.
pub struct HttpManifestService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpManifestService {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpManifestService {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ManifestService for HttpManifestService {
    async fn generate_manifests(&self, req: &ManifestRequest) -> Result<ManifestResponse> {
        let url = format!("{}/api/v1/manifests", self.base_url.trim_end_matches('/'));
        debug!(repo = %req.repo_url, revision = %req.revision, "requesting manifests");
        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::TransientError(format!("manifest service unreachable: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ManifestError(format!(
                "manifest service returned {status}: {body}"
            )));
        }
        let manifests: ManifestResponse = response
            .json()
            .await
            .map_err(|e| Error::ManifestError(format!("malformed manifest response: {e}")))?;
        if manifests.revision.is_empty() {
            return Err(Error::ManifestError(
                "manifest service did not resolve a revision".to_string(),
            ));
        }
        Ok(manifests)
    }
}
