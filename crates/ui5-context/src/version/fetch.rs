//
// version/fetch.rs
//
// Injectable fetch capability for remote framework descriptors
//

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::ContextError;

/// Response of a completed request. Transport failures are reported as
/// `Err` by [`Fetcher::fetch`] instead.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ContextError> {
        serde_json::from_slice(&self.body).map_err(|e| ContextError::Fetch {
            url: url.to_string(),
            message: format!("invalid JSON body: {e}"),
        })
    }
}

/// Fetch capability injected into the version negotiator.
///
/// Tests substitute a scripted implementation; production uses [`HttpFetcher`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, ContextError>;
}

/// HTTP fetcher backed by a shared `reqwest` client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ContextError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContextError::Fetch {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, ContextError> {
        let to_error = |e: reqwest::Error| ContextError::Fetch {
            url: url.to_string(),
            message: e.without_url().to_string(),
        };
        let response = self.client.get(url).send().await.map_err(to_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(to_error)?;
        log::trace!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(FetchResponse::new(status, body.to_vec()))
    }
}

/// Fetcher used in offline mode; every request fails without touching the network.
#[derive(Debug, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, ContextError> {
        Err(ContextError::Fetch {
            url: url.to_string(),
            message: String::from("offline mode"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_helpers() {
        assert!(FetchResponse::new(200, "{}").is_ok());
        assert!(!FetchResponse::new(404, "").is_ok());
        assert!(FetchResponse::new(404, "").is_not_found());
        assert!(!FetchResponse::new(500, "").is_not_found());
    }

    #[test]
    fn test_json_body() {
        let response = FetchResponse::new(200, r#"{"latest":{"version":"1.120.4"}}"#);
        let value: serde_json::Value = response.json("https://example.test/version.json").unwrap();
        assert_eq!(value["latest"]["version"], "1.120.4");

        let broken = FetchResponse::new(200, "<html>");
        assert!(broken.json::<serde_json::Value>("https://example.test").is_err());
    }

    #[tokio::test]
    async fn test_offline_fetcher_always_fails() {
        let fetcher = OfflineFetcher;
        assert!(fetcher.fetch("https://ui5.sap.com/version.json").await.is_err());
    }
}
