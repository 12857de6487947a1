//! HTTP client abstraction for the remote index.

use std::time::Duration;

use super::IndexError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Blocking HTTP GET.
///
/// Lets tests replace the network with canned responses.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, IndexError>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, IndexError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self, IndexError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IndexError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, IndexError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| IndexError::Unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(IndexError::Unavailable(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| IndexError::Unavailable(format!("Failed to read response: {}", e)))
    }
}
