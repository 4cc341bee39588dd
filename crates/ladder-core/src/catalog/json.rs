//! JSON catalog service client

use super::{content_id_from_url, parse_http_url, CatalogClient};
use crate::{
    types::{Catalog, ContentId, SessionConfig, StreamVariant},
    Error, Result,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    variants: Vec<StreamVariant>,
}

/// Client for a catalog service answering `GET {api_base}/catalog/{id}`
pub struct JsonCatalogClient {
    client: Client,
    api_base: Url,
}

impl JsonCatalogClient {
    pub fn new(api_base: &str, config: &SessionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Self::with_client(client, api_base)
    }

    pub fn with_client(client: Client, api_base: &str) -> Result<Self> {
        let mut api_base = parse_http_url(api_base)?;
        // Url::join drops the last segment unless the path ends with '/'
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self { client, api_base })
    }

    /// `{api_base}/catalog/{id}` with the id escaped as a single segment
    fn catalog_url(&self, id: &ContentId) -> Result<Url> {
        if matches!(id.as_str(), "" | "." | "..") {
            return Err(Error::InvalidUrl(format!("invalid content id '{}'", id)));
        }
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(format!("catalog url for {}", id)))?
            .pop_if_empty()
            .push("catalog")
            .push(id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl CatalogClient for JsonCatalogClient {
    async fn resolve(&self, url: &str) -> Result<ContentId> {
        content_id_from_url(url)
    }

    #[instrument(skip(self), fields(content_id = %id))]
    async fn fetch_catalog(&self, id: &ContentId) -> Result<Catalog> {
        let url = self.catalog_url(id)?;
        debug!(url = %url, "Fetching catalog");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::CatalogFetch(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(Error::NotFound(id.to_string())),
            status => return Err(Error::CatalogFetch(format!("HTTP {} for {}", status, id))),
        }

        let body: CatalogResponse = response
            .json()
            .await
            .map_err(|e| Error::CatalogFetch(format!("invalid catalog body: {}", e)))?;

        let catalog = Catalog::new(id.clone(), body.variants);
        catalog.ensure_playable()?;

        debug!(variants = catalog.len(), "Catalog fetched");
        Ok(catalog)
    }
}
