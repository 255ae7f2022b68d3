//! Scripted [`Fetcher`] that serves canned responses by URL.
//!
//! Unscripted URLs answer 404, like a distribution server that does not
//! publish the requested file. Every requested URL is recorded.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ContextError;
use crate::version::fetch::{FetchResponse, Fetcher};

#[derive(Debug, Clone)]
enum Scripted {
    Response(FetchResponse),
    Failure,
}

#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: FetchResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Response(response));
    }

    pub fn respond_json(&self, url: &str, value: serde_json::Value) {
        self.respond(url, FetchResponse::new(200, value.to_string()));
    }

    pub fn respond_status(&self, url: &str, status: u16) {
        self.respond(url, FetchResponse::new(status, Vec::new()));
    }

    /// Make requests for `url` fail at the transport level.
    pub fn fail(&self, url: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Failure);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, ContextError> {
        self.requests.lock().unwrap().push(url.to_string());
        let scripted = self.responses.lock().unwrap().get(url).cloned();
        match scripted {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Failure) => Err(ContextError::Fetch {
                url: url.to_string(),
                message: "scripted failure".to_string(),
            }),
            None => Ok(FetchResponse::new(404, Vec::new())),
        }
    }
}
