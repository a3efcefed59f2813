//! Push Transport (WebSocket)
//!
//! Opens `{push_base}/chain?symbol=<key>` and exposes inbound messages as a
//! stream of [`PushFrame`]s. Protocol-level ping/pong is answered by the
//! WebSocket layer while the stream is polled.
//!
//! The handshake is bounded by a connect timeout. A peer that accepts TCP
//! but never upgrades is reported as a connect failure.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use reqwest::Url;
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{PushFrame, PushStream, PushTransport, TransportError};

/// Handshake bound used by [`WsPushTransport::new`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`PushTransport`] backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsPushTransport {
    base: String,
    connect_timeout: Duration,
}

impl WsPushTransport {
    /// Create a transport rooted at `base` (e.g. `wss://feed.example`).
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Full URL for `instrument_key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured base is not a valid URL.
    pub fn url_for(&self, instrument_key: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(&format!("{}/chain", self.base.trim_end_matches('/')))
            .map_err(|e| TransportError::Connect(format!("invalid push URL: {e}")))?;
        url.query_pairs_mut().append_pair("symbol", instrument_key);
        Ok(url)
    }
}

#[async_trait]
impl PushTransport for WsPushTransport {
    async fn connect(&self, instrument_key: &str) -> Result<PushStream, TransportError> {
        let url = self.url_for(instrument_key)?;
        tracing::debug!(url = %url, "Connecting push transport");

        let handshake = tokio_tungstenite::connect_async(url.as_str());
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::Connect(format!(
                    "handshake timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let frames = ws
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(PushFrame::Text(text.to_string())),
                    Ok(Message::Binary(bytes)) => {
                        String::from_utf8(bytes.to_vec()).ok().map(PushFrame::Text)
                    }
                    Ok(Message::Close(_)) => Some(PushFrame::Closed),
                    Ok(_) => None,
                    Err(e) => Some(PushFrame::Error(e.to_string())),
                }
            })
            .chain(stream::once(async { PushFrame::Closed }));

        Ok(frames.boxed())
    }
}
