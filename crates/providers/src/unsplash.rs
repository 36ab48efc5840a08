//! Unsplash photo search.

use deck_core::{Error, ImageSearch, Result, SearchError};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

/// Default Unsplash API root.
pub const UNSPLASH_API_URL: &str = "https://api.unsplash.com";

/// Default per-search timeout.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("deckgen/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    urls: PhotoUrls,
}

#[derive(Deserialize)]
struct PhotoUrls {
    #[serde(default)]
    regular: Option<String>,
}

/// Image search backed by the Unsplash `/search/photos` endpoint.
#[derive(Debug, Clone)]
pub struct UnsplashSearch {
    access_key: String,
    base_url: String,
    client: Client,
}

impl UnsplashSearch {
    /// Build a search client; fails when the access key is missing.
    pub fn new(access_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let access_key = access_key.into();
        if access_key.trim().is_empty() {
            return Err(Error::Config("missing Unsplash access key".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            access_key,
            base_url: UNSPLASH_API_URL.to_string(),
            client,
        })
    }

    /// Point at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl ImageSearch for UnsplashSearch {
    fn search(&self, query: &str) -> std::result::Result<Option<String>, SearchError> {
        let response = self
            .client
            .get(format!("{}/search/photos", self.base_url))
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .query(&[("query", query), ("per_page", "1")])
            .send()
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        first_regular_url(&body)
    }
}

/// The `regular` URL of the first result, if any.
fn first_regular_url(body: &str) -> std::result::Result<Option<String>, SearchError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;
    Ok(response
        .results
        .into_iter()
        .next()
        .and_then(|photo| photo.urls.regular)
        .filter(|url| !url.is_empty()))
}
