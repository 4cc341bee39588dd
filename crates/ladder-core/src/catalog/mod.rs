//! Catalog clients
//!
//! A catalog client turns a content URL into a [`ContentId`] and fetches the
//! list of stream variants published for it.

mod json;
#[cfg(feature = "hls")]
mod hls;

pub use json::JsonCatalogClient;
#[cfg(feature = "hls")]
pub use hls::HlsCatalogClient;

use crate::{
    types::{Catalog, ContentId},
    Error, Result,
};
use async_trait::async_trait;
use url::Url;

/// Trait for catalog sources
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Derive the content identifier from a user-facing URL
    async fn resolve(&self, url: &str) -> Result<ContentId>;

    /// Fetch every variant available for `id`
    async fn fetch_catalog(&self, id: &ContentId) -> Result<Catalog>;
}

/// Parse an http(s) URL or fail with `InvalidUrl`
pub fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            other, raw
        ))),
    }
}

/// Extract a content identifier from a watch-style URL.
///
/// Checked in order: the `v` query parameter, the first path segment of
/// short-link hosts, then the last non-empty path segment.
pub fn content_id_from_url(raw: &str) -> Result<ContentId> {
    let url = parse_http_url(raw)?;

    if let Some((_, v)) = url.query_pairs().find(|(k, v)| k == "v" && !v.is_empty()) {
        return Ok(ContentId::new(v.into_owned()));
    }

    let mut segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let is_short_link = url
        .host_str()
        .map(|h| h == "youtu.be" || h.starts_with("short."))
        .unwrap_or(false);

    let candidate = if is_short_link {
        segments.first().copied()
    } else {
        segments.pop()
    };

    candidate
        .map(ContentId::new)
        .ok_or_else(|| Error::NotFound(format!("no content identifier in {}", raw)))
}
