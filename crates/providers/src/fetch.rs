//! Image download for the renderer.

use deck_core::{Error, ImageSource, Result, SearchError};
use reqwest::blocking::Client;
use std::io::Read;
use std::time::Duration;

/// Largest image accepted for embedding.
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Downloads images over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpImageFetcher {
    fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, SearchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SearchError::Transport(format!("not an http(s) URL: {}", url)));
        }

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let mut bytes = Vec::new();
        response
            .take(MAX_IMAGE_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(SearchError::Decode(format!(
                "image larger than {} bytes",
                MAX_IMAGE_BYTES
            )));
        }
        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}
