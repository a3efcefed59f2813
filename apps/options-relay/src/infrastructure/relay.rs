//! Reconnecting Relay Client
//!
//! Keeps one outbound WebSocket connection to the ingestion sink and forwards
//! simulated market ticks over it.
//!
//! A single task owns the connection, both venue timers and the pending
//! reconnect deadline, so no two connection attempts can ever overlap.
//! Ticks produced while disconnected are dropped, never buffered.

use std::future;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::config::RelayConfig;
use super::reconnect::{ReconnectPolicy, ReconnectSchedule};
use crate::domain::{ControlMessage, MarketSimulator, RelayEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Shortest tick cadence; `interval` rejects a zero period.
const MIN_CADENCE: Duration = Duration::from_millis(1);

// =============================================================================
// Status and Errors
// =============================================================================

/// Lifecycle notifications published by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayStatus {
    /// Connection to the sink established.
    Connected,
    /// An established connection was lost.
    Disconnected,
    /// A reconnect attempt is pending after `delay`.
    ReconnectScheduled {
        /// Time until the attempt.
        delay: Duration,
    },
    /// Inbound message from the sink.
    Control(ControlMessage),
    /// Ticks discarded because no connection was open.
    Dropped {
        /// Venue that produced them.
        source: &'static str,
        /// Number of events discarded.
        count: usize,
    },
}

/// Relay connection errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// WebSocket handshake failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Handshake did not finish in time.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Event could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Frame could not be written.
    #[error("send failed: {0}")]
    Send(String),
}

// =============================================================================
// Client
// =============================================================================

/// Handle to the relay task.
pub struct RelayClient {
    config: RelayConfig,
    status_tx: mpsc::Sender<RelayStatus>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayClient {
    /// Create a client that publishes status on `status_tx`.
    ///
    /// Nothing connects until [`start`](Self::start).
    #[must_use]
    pub fn new(config: RelayConfig, status_tx: mpsc::Sender<RelayStatus>) -> Self {
        Self {
            config,
            status_tx,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Connect and begin emitting ticks. Returns immediately.
    ///
    /// Calling it again while running does nothing. A stopped client stays
    /// stopped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() || self.cancel.is_cancelled() {
            return;
        }

        tracing::info!(sink = %self.config.sink_url, "Starting relay");
        let relay = RelayLoop::new(
            self.config.clone(),
            self.status_tx.clone(),
            self.cancel.clone(),
        );
        *task = Some(tokio::spawn(relay.run()));
    }

    /// Close the connection and cancel every timer.
    ///
    /// Safe to call without a prior `start`, and more than once.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Relay task ended abnormally");
        }
    }

    /// Whether the relay task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Run Loop
// =============================================================================

struct RelayLoop {
    config: RelayConfig,
    status_tx: mpsc::Sender<RelayStatus>,
    cancel: CancellationToken,
    policy: ReconnectPolicy,
    schedule: ReconnectSchedule,
    socket: Option<WsStream>,
}

impl RelayLoop {
    fn new(
        config: RelayConfig,
        status_tx: mpsc::Sender<RelayStatus>,
        cancel: CancellationToken,
    ) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        Self {
            config,
            status_tx,
            cancel,
            policy,
            schedule: ReconnectSchedule::new(),
            socket: None,
        }
    }

    async fn run(mut self) {
        let primary =
            MarketSimulator::zeta().with_cadence(self.config.primary_cadence.max(MIN_CADENCE));
        let secondary = MarketSimulator::psyoptions()
            .with_cadence(self.config.secondary_cadence.max(MIN_CADENCE));

        let started = Instant::now();
        let mut primary_ticks = interval_at(started + primary.cadence(), primary.cadence());
        primary_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut secondary_ticks = interval_at(started + secondary.cadence(), secondary.cadence());
        secondary_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.connect().await;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                () = sleep_until_deadline(self.schedule.deadline()) => {
                    if self.schedule.take_due(Instant::now()) {
                        self.connect().await;
                    }
                }

                frame = next_frame(&mut self.socket) => self.handle_frame(frame).await,

                _ = primary_ticks.tick() => self.emit(&primary).await,

                _ = secondary_ticks.tick() => self.emit(&secondary).await,
            }
        }

        self.schedule.cancel();
        self.close().await;
        tracing::info!("Relay stopped");
    }

    async fn connect(&mut self) {
        let url = self.config.sink_url.clone();
        tracing::info!(sink = %url, attempt = self.policy.attempt_count() + 1, "Connecting to sink");

        let attempt = timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        );
        let result = tokio::select! {
            () = self.cancel.cancelled() => return,
            result = attempt => match result {
                Ok(Ok((ws, _response))) => Ok(ws),
                Ok(Err(e)) => Err(RelayError::Connect(e.to_string())),
                Err(_) => Err(RelayError::Timeout(self.config.connect_timeout)),
            },
        };

        match result {
            Ok(ws) => {
                tracing::info!(sink = %url, "Connected to sink");
                self.socket = Some(ws);
                self.policy.reset();
                self.publish(RelayStatus::Connected);
            }
            Err(e) => {
                tracing::warn!(sink = %url, error = %e, "Sink connection failed");
                self.schedule_reconnect();
            }
        }
    }

    async fn handle_frame(
        &mut self,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) {
        match frame {
            Some(Ok(Message::Text(text))) => self.handle_inbound(&text).await,
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => self.handle_inbound(text).await,
                Err(_) => tracing::debug!(len = data.len(), "Ignoring non-UTF8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "Sink closed connection");
                self.on_disconnect();
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Sink connection error");
                self.on_disconnect();
            }
            None => {
                tracing::info!("Sink stream ended");
                self.on_disconnect();
            }
        }
    }

    async fn handle_inbound(&mut self, text: &str) {
        let message = match ControlMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unparsable inbound frame");
                return;
            }
        };

        tracing::debug!(message_type = %message.message_type, "Inbound control message");

        if message.is_liveness_probe() {
            self.send(&[RelayEvent::pong(Utc::now())], "pong").await;
        }

        self.publish(RelayStatus::Control(message));
    }

    async fn emit(&mut self, venue: &MarketSimulator) {
        let events = venue.tick(Utc::now());
        self.send(&events, venue.source()).await;
    }

    /// Write `events` in order. Anything not written is reported as dropped.
    async fn send(&mut self, events: &[RelayEvent], source: &'static str) {
        let result = match self.socket.as_mut() {
            Some(ws) => write_events(ws, events).await,
            None => Err((0, None)),
        };

        let Err((sent, error)) = result else {
            tracing::debug!(source, count = events.len(), "Ticks forwarded");
            return;
        };

        let count = events.len() - sent;
        match error {
            Some(RelayError::Encode(e)) => {
                tracing::warn!(source, error = %e, "Failed to encode tick");
            }
            Some(e) => {
                tracing::warn!(source, error = %e, "Failed to forward ticks");
                self.on_disconnect();
            }
            None => tracing::debug!(source, count, "Not connected, dropping ticks"),
        }
        self.publish(RelayStatus::Dropped { source, count });
    }

    fn on_disconnect(&mut self) {
        if self.socket.take().is_some() {
            self.publish(RelayStatus::Disconnected);
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.schedule.is_pending() {
            tracing::debug!("Reconnect already pending");
            return;
        }

        let delay = self.policy.next_delay();
        self.schedule.schedule(Instant::now(), delay);
        tracing::info!(
            attempt = self.policy.attempt_count(),
            delay_ms = delay.as_millis(),
            "Reconnect scheduled"
        );
        self.publish(RelayStatus::ReconnectScheduled { delay });
    }

    async fn close(&mut self) {
        if let Some(mut ws) = self.socket.take() {
            match timeout(CLOSE_TIMEOUT, ws.close(None)).await {
                Ok(Ok(())) => tracing::debug!("Sink connection closed"),
                Ok(Err(e)) => tracing::debug!(error = %e, "Close handshake failed"),
                Err(_) => tracing::debug!("Close handshake timed out"),
            }
        }
    }

    fn publish(&self, status: RelayStatus) {
        if let Err(TrySendError::Full(status)) = self.status_tx.try_send(status) {
            tracing::debug!(?status, "Status channel full, dropping");
        }
    }
}

/// On failure returns how many events were written and why it stopped.
async fn write_events(
    ws: &mut WsStream,
    events: &[RelayEvent],
) -> Result<(), (usize, Option<RelayError>)> {
    for (sent, event) in events.iter().enumerate() {
        let json = event
            .to_json()
            .map_err(|e| (sent, Some(RelayError::from(e))))?;
        ws.send(Message::Text(json.into()))
            .await
            .map_err(|e| (sent, Some(RelayError::Send(e.to_string()))))?;
    }
    Ok(())
}

async fn next_frame(
    socket: &mut Option<WsStream>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(ws) => ws.next().await,
        None => future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::reconnect::ReconnectConfig;

    fn unreachable_config() -> RelayConfig {
        RelayConfig::default()
            .with_sink_url("ws://127.0.0.1:1/ingest")
            .with_reconnect(ReconnectConfig::fixed(Duration::from_secs(5)))
            .with_cadences(Duration::from_millis(100), Duration::from_millis(140))
    }

    #[tokio::test]
    async fn stop_without_start_is_safe() {
        let (tx, _rx) = mpsc::channel(8);
        let client = RelayClient::new(RelayConfig::default(), tx);

        client.stop().await;
        client.stop().await;

        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn failed_connect_schedules_one_reconnect() {
        let (tx, mut rx) = mpsc::channel(64);
        let client = RelayClient::new(unreachable_config(), tx);
        client.start();
        client.start();

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(
            first,
            Some(RelayStatus::ReconnectScheduled { delay: Duration::from_secs(5) })
        );

        // Ticks keep firing while the reconnect is pending, and nothing else
        // is scheduled.
        tokio::time::sleep(Duration::from_millis(400)).await;
        client.stop().await;

        let mut rest = Vec::new();
        while let Ok(status) = rx.try_recv() {
            rest.push(status);
        }
        assert!(
            !rest
                .iter()
                .any(|s| matches!(s, RelayStatus::ReconnectScheduled { .. }))
        );
        assert!(rest.iter().any(|s| matches!(
            s,
            RelayStatus::Dropped { source: "zeta", count: 3 }
        )));
        assert!(rest.iter().any(|s| matches!(
            s,
            RelayStatus::Dropped { source: "psyoptions", count: 3 }
        )));
    }

    #[tokio::test]
    async fn zero_cadence_keeps_relay_running() {
        let (tx, mut rx) = mpsc::channel(64);
        let config = unreachable_config().with_cadences(Duration::ZERO, Duration::from_secs(7));
        let client = RelayClient::new(config, tx);
        client.start();

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(first, Some(RelayStatus::ReconnectScheduled { .. })));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.is_running());
        assert!(std::iter::from_fn(|| rx.try_recv().ok()).any(|s| matches!(
            s,
            RelayStatus::Dropped { source: "zeta", .. }
        )));

        client.stop().await;
    }

    #[tokio::test]
    async fn stopped_client_does_not_restart() {
        let (tx, mut rx) = mpsc::channel(8);
        let client = RelayClient::new(unreachable_config(), tx);

        client.stop().await;
        client.start();

        assert!(!client.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
