//! HLS multivariant playlist as a catalog source
//!
//! The playlist URL itself is the content identifier. Variant streams become
//! video variants and `EXT-X-MEDIA TYPE=AUDIO` renditions become audio
//! variants. Renditions carry no bandwidth, so their bitrate is 0 and
//! playlist order decides between them.

use super::{parse_http_url, CatalogClient};
use crate::{
    types::{Catalog, ContentId, SessionConfig, StreamVariant},
    Error, Result,
};
use async_trait::async_trait;
use m3u8_rs::{AlternativeMediaType, MasterPlaylist};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

/// Catalog client reading HLS master playlists
pub struct HlsCatalogClient {
    client: Client,
}

impl HlsCatalogClient {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Build a catalog from playlist text
    pub fn parse_master(&self, content: &[u8], base_url: &Url, id: &ContentId) -> Result<Catalog> {
        let master = m3u8_rs::parse_master_playlist_res(content)
            .map_err(|e| Error::CatalogFetch(format!("invalid HLS master playlist: {:?}", e)))?;

        let variants = extract_variants(&master, base_url)?;
        let catalog = Catalog::new(id.clone(), variants);
        catalog.ensure_playable()?;
        Ok(catalog)
    }
}

fn resolve_uri(base: &Url, relative: &str) -> Result<String> {
    base.join(relative)
        .map(String::from)
        .map_err(|e| Error::CatalogFetch(format!("invalid URI '{}': {}", relative, e)))
}

fn extract_variants(master: &MasterPlaylist, base_url: &Url) -> Result<Vec<StreamVariant>> {
    let mut variants = Vec::new();

    for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
        let height = variant
            .resolution
            .map(|r| r.height as u32)
            .unwrap_or_default();
        variants.push(StreamVariant::video(
            variant.bandwidth,
            height,
            resolve_uri(base_url, &variant.uri)?,
        ));
    }

    for media in &master.alternatives {
        if !matches!(media.media_type, AlternativeMediaType::Audio) {
            continue;
        }
        if let Some(uri) = &media.uri {
            variants.push(StreamVariant::audio(0, resolve_uri(base_url, uri)?));
        }
    }

    Ok(variants)
}

#[async_trait]
impl CatalogClient for HlsCatalogClient {
    async fn resolve(&self, url: &str) -> Result<ContentId> {
        let url = parse_http_url(url)?;
        Ok(ContentId::new(url.as_str()))
    }

    #[instrument(skip(self), fields(content_id = %id))]
    async fn fetch_catalog(&self, id: &ContentId) -> Result<Catalog> {
        let url = parse_http_url(id.as_str())?;
        debug!("Fetching HLS master playlist");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::CatalogFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::CatalogFetch(format!("HTTP {} for {}", status, url)));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| Error::CatalogFetch(e.to_string()))?;

        let catalog = self.parse_master(&content, &url, id)?;
        debug!(variants = catalog.len(), "HLS catalog parsed");
        Ok(catalog)
    }
}
