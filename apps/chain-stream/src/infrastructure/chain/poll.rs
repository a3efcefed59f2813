//! Poll Source (HTTP)
//!
//! `GET {poll_base}/chain/snapshot?symbol=<key>` returning a JSON body.

use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{PollSource, TransportError};

/// [`PollSource`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpPollSource {
    client: reqwest::Client,
    base: String,
}

impl HttpPollSource {
    /// Create a source rooted at `base` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base))
    }

    /// Create a source using an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PollSource for HttpPollSource {
    async fn fetch(&self, instrument_key: &str) -> Result<serde_json::Value, TransportError> {
        let url = format!("{}/chain/snapshot", self.base);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", instrument_key)])
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))
    }
}
