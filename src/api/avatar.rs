//! Profile picture resolution.
//!
//! Registration accepts an optional image reference. Resolution goes through
//! the [`AvatarStore`] trait so the HTTP image service stays behind a seam;
//! any failure falls back to the configured default URL and never blocks
//! account creation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use url::Url;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a caller-supplied image reference to a stable public URL.
#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Resolve `image` to a URL, falling back to the default on any failure.
    async fn resolve(&self, image: Option<&str>) -> String;
}

/// Store used when no image service is configured: always the default URL.
pub struct DefaultAvatarStore {
    default_url: String,
}

impl DefaultAvatarStore {
    #[must_use]
    pub fn new(default_url: &str) -> Self {
        Self {
            default_url: default_url.to_string(),
        }
    }
}

#[async_trait]
impl AvatarStore for DefaultAvatarStore {
    async fn resolve(&self, _image: Option<&str>) -> String {
        self.default_url.clone()
    }
}

/// Store backed by an external image service.
///
/// Pass-through for references that are already absolute URLs; everything
/// else is submitted to the service, which answers with the hosted URL.
pub struct HttpAvatarStore {
    client: reqwest::Client,
    upload_url: Url,
    default_url: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpAvatarStore {
    pub fn new(upload_url: &str, default_url: &str) -> Result<Self> {
        let upload_url = Url::parse(upload_url).context("invalid image store URL")?;
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .context("failed to build image store client")?;
        Ok(Self {
            client,
            upload_url,
            default_url: default_url.to_string(),
        })
    }

    async fn upload(&self, image: &str) -> Result<String> {
        let response = self
            .client
            .post(self.upload_url.clone())
            .json(&serde_json::json!({ "image": image }))
            .send()
            .await
            .context("image store request failed")?
            .error_for_status()
            .context("image store rejected the upload")?;
        let body: UploadResponse = response
            .json()
            .await
            .context("image store returned an unreadable body")?;
        Ok(body.url)
    }
}

#[async_trait]
impl AvatarStore for HttpAvatarStore {
    async fn resolve(&self, image: Option<&str>) -> String {
        let Some(image) = image.map(str::trim).filter(|s| !s.is_empty()) else {
            return self.default_url.clone();
        };
        if Url::parse(image).is_ok() {
            return image.to_string();
        }
        match self.upload(image).await {
            Ok(url) => url,
            Err(err) => {
                warn!("avatar upload failed, using default: {err:#}");
                self.default_url.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "https://cdn.example.com/default.png";

    #[tokio::test]
    async fn default_store_ignores_input() {
        let store = DefaultAvatarStore::new(DEFAULT);
        assert_eq!(store.resolve(Some("photo.jpg")).await, DEFAULT);
        assert_eq!(store.resolve(None).await, DEFAULT);
    }

    #[tokio::test]
    async fn http_store_passes_through_absolute_urls() {
        let store = HttpAvatarStore::new("http://images.internal/upload", DEFAULT).unwrap();
        let url = "https://pics.example.com/me.png";
        assert_eq!(store.resolve(Some(url)).await, url);
    }

    #[tokio::test]
    async fn http_store_falls_back_when_blank() {
        let store = HttpAvatarStore::new("http://images.internal/upload", DEFAULT).unwrap();
        assert_eq!(store.resolve(Some("   ")).await, DEFAULT);
        assert_eq!(store.resolve(None).await, DEFAULT);
    }

    #[test]
    fn rejects_invalid_upload_url() {
        assert!(HttpAvatarStore::new("not a url", DEFAULT).is_err());
    }
}
