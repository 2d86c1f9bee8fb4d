//! Module source retrieval
//!
//! Fetches the module's binary image from its well-known location,
//! bypassing intermediate caches, and carries the response's optional
//! validation tag so the lifecycle manager can skip redundant installs.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CACHE_CONTROL, ETAG};

use crate::module::error::ModuleError;

/// A fetched module image with its optional version tag.
#[derive(Debug, Clone)]
pub struct FetchedModule {
    /// Validation tag from the source response, compared only for
    /// equality; `None` means every fetch installs
    pub version_tag: Option<String>,
    /// The module's binary image
    pub bytes: Bytes,
}

/// Source of module images. Production fetches over HTTP; tests
/// substitute scripted sources through this trait.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Retrieve the current module image and its version tag.
    async fn fetch_module(&self) -> Result<FetchedModule, ModuleError>;
}

/// Fetches the module image with a cache-bypassing GET. The server is
/// assumed competent: it either omits ETags entirely or implements
/// them correctly.
pub struct HttpModuleFetcher {
    client: reqwest::Client,
    source_url: String,
}

impl HttpModuleFetcher {
    /// Create a fetcher for the module image at `source_url`.
    pub fn new(client: reqwest::Client, source_url: impl Into<String>) -> Self {
        Self {
            client,
            source_url: source_url.into(),
        }
    }
}

#[async_trait]
impl ModuleFetcher for HttpModuleFetcher {
    async fn fetch_module(&self) -> Result<FetchedModule, ModuleError> {
        let response = self
            .client
            .get(&self.source_url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?
            .error_for_status()?;

        let version_tag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response.bytes().await?;

        Ok(FetchedModule { version_tag, bytes })
    }
}
