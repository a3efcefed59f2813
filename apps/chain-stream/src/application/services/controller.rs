//! Feed Controller
//!
//! Owns every subscription and drives its tier ladder.
//!
//! # Structure
//!
//! ```text
//!  subscribe() ──► driver task ◄── TierEvent ── push | poll | synthetic task
//!                      │                           (one at a time)
//!                      ▼
//!                 on_snapshot
//! ```
//!
//! Each subscription gets a driver task that owns an event channel. The
//! active tier runs as its own task under a child cancellation token and
//! reports snapshots and failures into that channel. The driver applies
//! failures to the pure [`transition`] function and starts the next tier.
//!
//! Every tier activation is tagged with a generation number. Events carrying
//! an older generation come from a tier that has already been replaced and
//! are dropped, so a late push message or in-flight poll response can never
//! reach the subscriber after a demotion.
//!
//! # Teardown
//!
//! [`SubscriptionHandle::unsubscribe`] flips a liveness flag under the same
//! reentrant lock that guards callback delivery. Once it returns, no
//! callback can start, and calling it from inside the callback is fine.
//! Callbacks of two subscriptions must not unsubscribe each other; see
//! [`SubscriptionHandle::unsubscribe`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PollSource, PushFrame, PushTransport, SnapshotSink};
use crate::domain::snapshot::Snapshot;
use crate::domain::synthetic;
use crate::domain::tier::{FeedSignal, Tier, TierAction, TierState, Transition, transition};
use crate::infrastructure::chain::{
    HttpPollSource, WsPushTransport, normalize_poll_body, parse_push_frame,
};
use crate::infrastructure::config::FeedConfig;
use crate::infrastructure::metrics as feed_metrics;

const EVENT_BUFFER: usize = 64;
const MIN_INTERVAL: Duration = Duration::from_millis(1);

// =============================================================================
// Error Type
// =============================================================================

/// Errors building a [`FeedController`].
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The poll tier HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

// =============================================================================
// Subscription Identity
// =============================================================================

/// Process-unique subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Summary of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Instrument being followed.
    pub instrument_key: String,
    /// Currently active tier.
    pub tier: Tier,
}

// =============================================================================
// Tier Events
// =============================================================================

#[derive(Debug)]
struct TierEvent {
    generation: u64,
    tier: Tier,
    kind: TierEventKind,
}

#[derive(Debug)]
enum TierEventKind {
    Snapshot(Snapshot),
    Failed(String),
}

/// Sending half handed to a tier task.
#[derive(Clone)]
struct TierReporter {
    tier: Tier,
    generation: u64,
    tx: mpsc::Sender<TierEvent>,
}

impl TierReporter {
    /// Returns `false` once the driver has gone away.
    async fn snapshot(&self, snapshot: Snapshot) -> bool {
        self.send(TierEventKind::Snapshot(snapshot)).await
    }

    async fn failed(&self, reason: String) {
        let _ = self.send(TierEventKind::Failed(reason)).await;
    }

    async fn send(&self, kind: TierEventKind) -> bool {
        self.tx
            .send(TierEvent {
                generation: self.generation,
                tier: self.tier,
                kind,
            })
            .await
            .is_ok()
    }
}

// =============================================================================
// Subscription State
// =============================================================================

struct Subscription {
    id: SubscriptionId,
    instrument_key: String,
    state: Mutex<TierState>,
    live: AtomicBool,
    sink: ReentrantMutex<RefCell<Box<dyn SnapshotSink>>>,
    cancel: CancellationToken,
}

impl Subscription {
    fn new(id: SubscriptionId, instrument_key: String, sink: Box<dyn SnapshotSink>) -> Self {
        Self {
            id,
            instrument_key,
            state: Mutex::new(TierState::INITIAL),
            live: AtomicBool::new(true),
            sink: ReentrantMutex::new(RefCell::new(sink)),
            cancel: CancellationToken::new(),
        }
    }

    /// Hand a snapshot to the subscriber. Returns whether it was delivered.
    fn deliver(&self, snapshot: Snapshot) -> bool {
        let guard = self.sink.lock();
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        let Ok(mut sink) = guard.try_borrow_mut() else {
            return false;
        };
        sink.deliver(snapshot);
        true
    }

    fn apply(&self, signal: FeedSignal) -> Transition {
        let mut state = self.state.lock();
        let step = transition(*state, signal);
        *state = step.next;
        step
    }

    fn tier(&self) -> Option<Tier> {
        self.state.lock().tier()
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Returns `true` for the call that actually tore the subscription down.
    fn tear_down(&self) -> bool {
        let _delivery = self.sink.lock();
        if !self.live.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.apply(FeedSignal::Unsubscribed);
        self.cancel.cancel();
        true
    }
}

#[derive(Default)]
struct Registry {
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Subscription>>>,
}

impl Registry {
    fn insert(&self, subscription: Arc<Subscription>) -> usize {
        let mut subs = self.subscriptions.write();
        subs.insert(subscription.id, subscription);
        subs.len()
    }

    fn remove(&self, id: SubscriptionId) -> usize {
        let mut subs = self.subscriptions.write();
        subs.remove(&id);
        subs.len()
    }

    fn all(&self) -> Vec<Arc<Subscription>> {
        self.subscriptions.read().values().cloned().collect()
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Handle returned by [`FeedController::subscribe`].
///
/// Cloning is cheap. Dropping a handle does not unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe) explicitly.
#[derive(Clone)]
pub struct SubscriptionHandle {
    subscription: Arc<Subscription>,
    registry: Arc<Registry>,
}

impl SubscriptionHandle {
    /// Subscription identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id
    }

    /// Instrument being followed.
    #[must_use]
    pub fn instrument_key(&self) -> &str {
        &self.subscription.instrument_key
    }

    /// Currently active tier, `None` after unsubscribe.
    #[must_use]
    pub fn tier(&self) -> Option<Tier> {
        self.subscription.tier()
    }

    /// Whether the subscription is still delivering.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription.is_live()
    }

    /// Tear the subscription down.
    ///
    /// Idempotent and safe to call from inside the snapshot callback. No
    /// callback starts after this returns, so a call from another thread
    /// waits for an in-flight callback of this subscription to finish.
    ///
    /// A callback may unsubscribe a different subscription, but two callbacks
    /// must not unsubscribe each other: each would wait on the other's
    /// delivery and both drivers deadlock. Hand mutual teardown to a separate
    /// task instead.
    pub fn unsubscribe(&self) {
        if !self.subscription.tear_down() {
            return;
        }

        let remaining = self.registry.remove(self.subscription.id);
        feed_metrics::set_active_subscriptions(remaining);

        tracing::info!(
            subscription = %self.subscription.id,
            instrument = %self.subscription.instrument_key,
            "Unsubscribed"
        );
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.subscription.id)
            .field("instrument_key", &self.subscription.instrument_key)
            .field("tier", &self.tier())
            .finish()
    }
}

// =============================================================================
// Feed Controller
// =============================================================================

#[derive(Clone)]
struct TierContext {
    push: Arc<dyn PushTransport>,
    poll: Arc<dyn PollSource>,
    poll_interval: Duration,
    synthetic_interval: Duration,
}

/// Tiered snapshot feed.
///
/// Cloning yields another handle to the same set of subscriptions.
#[derive(Clone)]
pub struct FeedController {
    tiers: TierContext,
    registry: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}

impl FeedController {
    /// Create a controller with the WebSocket and HTTP adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let push = Arc::new(
            WsPushTransport::new(config.push_base.clone())
                .with_connect_timeout(config.connect_timeout),
        );
        let poll = Arc::new(HttpPollSource::new(
            config.poll_base.clone(),
            config.request_timeout,
        )?);
        Ok(Self::with_transports(config, push, poll))
    }

    /// Create a controller with the given transports.
    #[must_use]
    pub fn with_transports(
        config: &FeedConfig,
        push: Arc<dyn PushTransport>,
        poll: Arc<dyn PollSource>,
    ) -> Self {
        Self {
            tiers: TierContext {
                push,
                poll,
                poll_interval: config.poll_interval.max(MIN_INTERVAL),
                synthetic_interval: config.synthetic_interval.max(MIN_INTERVAL),
            },
            registry: Arc::new(Registry::default()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start following `instrument_key`, calling `on_snapshot` for every
    /// snapshot the active tier produces.
    ///
    /// Returns immediately; the push tier is attempted in the background.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn subscribe<S>(&self, instrument_key: impl Into<String>, on_snapshot: S) -> SubscriptionHandle
    where
        S: SnapshotSink,
    {
        self.subscribe_with_events(instrument_key.into(), Box::new(on_snapshot))
            .0
    }

    fn subscribe_with_events(
        &self,
        instrument_key: String,
        sink: Box<dyn SnapshotSink>,
    ) -> (SubscriptionHandle, mpsc::Sender<TierEvent>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let subscription = Arc::new(Subscription::new(id, instrument_key, sink));

        let count = self.registry.insert(Arc::clone(&subscription));
        feed_metrics::set_active_subscriptions(count);

        tracing::info!(
            subscription = %id,
            instrument = %subscription.instrument_key,
            "Subscribed"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let _driver = tokio::spawn(drive(
            Arc::clone(&subscription),
            self.tiers.clone(),
            tx.clone(),
            rx,
        ));

        let handle = SubscriptionHandle {
            subscription,
            registry: Arc::clone(&self.registry),
        };
        (handle, tx)
    }

    /// Live subscriptions ordered by id.
    #[must_use]
    pub fn active_subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> = self
            .registry
            .all()
            .into_iter()
            .filter_map(|sub| {
                sub.tier().map(|tier| SubscriptionInfo {
                    id: sub.id,
                    instrument_key: sub.instrument_key.clone(),
                    tier,
                })
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Unsubscribe everything.
    pub fn unsubscribe_all(&self) {
        for subscription in self.registry.all() {
            SubscriptionHandle {
                subscription,
                registry: Arc::clone(&self.registry),
            }
            .unsubscribe();
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

async fn drive(
    subscription: Arc<Subscription>,
    tiers: TierContext,
    tx: mpsc::Sender<TierEvent>,
    mut rx: mpsc::Receiver<TierEvent>,
) {
    let mut generation = 0_u64;
    let mut tier_cancel = subscription.cancel.child_token();
    tiers.spawn(
        Tier::Push,
        &subscription.instrument_key,
        TierReporter {
            tier: Tier::Push,
            generation,
            tx: tx.clone(),
        },
        tier_cancel.clone(),
    );

    loop {
        let event = tokio::select! {
            biased;
            () = subscription.cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if event.generation != generation {
            tracing::debug!(
                subscription = %subscription.id,
                tier = %event.tier,
                "Dropping event from superseded tier"
            );
            feed_metrics::record_stale_event(event.tier);
            continue;
        }

        match event.kind {
            TierEventKind::Snapshot(snapshot) => {
                if subscription.deliver(snapshot) {
                    feed_metrics::record_snapshot_delivered(event.tier);
                }
            }
            TierEventKind::Failed(reason) => {
                let step = subscription.apply(FeedSignal::TierFailed(event.tier));
                let Some(TierAction::Activate(next)) = step.action else {
                    continue;
                };

                tracing::warn!(
                    subscription = %subscription.id,
                    instrument = %subscription.instrument_key,
                    from = %event.tier,
                    to = %next,
                    reason = %reason,
                    "Tier failed, demoting"
                );
                feed_metrics::record_demotion(event.tier, next);

                tier_cancel.cancel();
                generation += 1;
                tier_cancel = subscription.cancel.child_token();
                tiers.spawn(
                    next,
                    &subscription.instrument_key,
                    TierReporter {
                        tier: next,
                        generation,
                        tx: tx.clone(),
                    },
                    tier_cancel.clone(),
                );
            }
        }
    }

    tier_cancel.cancel();
    tracing::debug!(subscription = %subscription.id, "Subscription driver stopped");
}

impl TierContext {
    fn spawn(
        &self,
        tier: Tier,
        instrument_key: &str,
        reporter: TierReporter,
        cancel: CancellationToken,
    ) {
        let key = instrument_key.to_string();
        tracing::debug!(instrument = %key, tier = %tier, "Activating tier");

        let _task = match tier {
            Tier::Push => tokio::spawn(run_push(Arc::clone(&self.push), key, reporter, cancel)),
            Tier::Poll => tokio::spawn(run_poll(
                Arc::clone(&self.poll),
                self.poll_interval,
                key,
                reporter,
                cancel,
            )),
            Tier::Synthetic => tokio::spawn(run_synthetic(
                self.synthetic_interval,
                key,
                reporter,
                cancel,
            )),
        };
    }
}

// =============================================================================
// Tier Tasks
// =============================================================================

async fn run_push(
    transport: Arc<dyn PushTransport>,
    key: String,
    reporter: TierReporter,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        () = cancel.cancelled() => return,
        result = transport.connect(&key) => result,
    };

    let mut frames = match connected {
        Ok(frames) => frames,
        Err(e) => {
            reporter.failed(e.to_string()).await;
            return;
        }
    };

    tracing::debug!(instrument = %key, "Push tier connected");

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => return,
            frame = frames.next() => frame,
        };

        match frame {
            Some(PushFrame::Text(text)) => match parse_push_frame(&text, &key) {
                Ok(snapshot) => {
                    if !reporter.snapshot(snapshot).await {
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!(instrument = %key, error = %e, "Discarding push frame");
                    feed_metrics::record_push_frame_discarded();
                }
            },
            Some(PushFrame::Error(reason)) => {
                reporter.failed(reason).await;
                return;
            }
            Some(PushFrame::Closed) | None => {
                reporter.failed("connection closed".to_string()).await;
                return;
            }
        }
    }
}

async fn run_poll(
    source: Arc<dyn PollSource>,
    period: Duration,
    key: String,
    reporter: TierReporter,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        let fetched = tokio::select! {
            () = cancel.cancelled() => return,
            result = source.fetch(&key) => result,
        };

        let outcome = fetched.map_err(|e| e.to_string()).and_then(|body| {
            normalize_poll_body(&body, &key).map_err(|e| e.to_string())
        });
        feed_metrics::record_poll_duration(started.elapsed(), outcome.is_ok());

        match outcome {
            Ok(snapshot) => {
                if !reporter.snapshot(snapshot).await {
                    return;
                }
            }
            Err(reason) => {
                reporter.failed(reason).await;
                return;
            }
        }
    }
}

async fn run_synthetic(
    period: Duration,
    key: String,
    reporter: TierReporter,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if !reporter.snapshot(synthetic::generate(&key)).await {
            return;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockPollSource, PushStream, TransportError};
    use crate::domain::synthetic::SYNTHETIC_ROWS;
    use async_trait::async_trait;
    use futures::channel::mpsc as push_channel;
    use serde_json::json;
    use std::sync::OnceLock;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::error::TryRecvError;

    struct RefusingPush;

    #[async_trait]
    impl PushTransport for RefusingPush {
        async fn connect(&self, _instrument_key: &str) -> Result<PushStream, TransportError> {
            Err(TransportError::Connect("connection refused".to_string()))
        }
    }

    /// Push transport whose single connection is fed by the test.
    struct ScriptedPush {
        frames: Mutex<Option<push_channel::UnboundedReceiver<PushFrame>>>,
    }

    impl ScriptedPush {
        fn new() -> (Arc<Self>, push_channel::UnboundedSender<PushFrame>) {
            let (tx, rx) = push_channel::unbounded();
            let push = Arc::new(Self {
                frames: Mutex::new(Some(rx)),
            });
            (push, tx)
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedPush {
        async fn connect(&self, _instrument_key: &str) -> Result<PushStream, TransportError> {
            self.frames
                .lock()
                .take()
                .map(StreamExt::boxed)
                .ok_or(TransportError::Closed)
        }
    }

    fn config() -> FeedConfig {
        FeedConfig::default()
            .with_poll_interval(Duration::from_secs(3))
            .with_synthetic_interval(Duration::from_millis(1_500))
    }

    fn poll_never() -> Arc<MockPollSource> {
        let mut poll = MockPollSource::new();
        poll.expect_fetch().never();
        Arc::new(poll)
    }

    fn poll_failing() -> Arc<MockPollSource> {
        let mut poll = MockPollSource::new();
        poll.expect_fetch()
            .returning(|_| Err(TransportError::Status(503)));
        Arc::new(poll)
    }

    fn poll_ok(calls: Arc<AtomicUsize>) -> Arc<MockPollSource> {
        let mut poll = MockPollSource::new();
        poll.expect_fetch().returning(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({
                "underlying": "ETH",
                "chain": [{ "k": 2700, "callBid": 10, "callAsk": 11, "putBid": 9, "putAsk": 9.5, "ivC": 0.5, "ivP": 0.48 }]
            }))
        });
        Arc::new(poll)
    }

    fn collector() -> (
        impl FnMut(Snapshot) + Send + 'static,
        mpsc::UnboundedReceiver<Snapshot>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |snapshot| {
                let _ = tx.send(snapshot);
            },
            rx,
        )
    }

    fn frame(json: &serde_json::Value) -> PushFrame {
        PushFrame::Text(json.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn push_snapshots_are_delivered_live() {
        let (push, frames) = ScriptedPush::new();
        let controller = FeedController::with_transports(&config(), push, poll_never());
        let (sink, mut snapshots) = collector();

        let handle = controller.subscribe("BTC", sink);
        frames
            .unbounded_send(frame(&json!({ "rows": [{ "strike": 60000, "callBid": 900 }] })))
            .unwrap();

        let snap = snapshots.recv().await.unwrap();
        assert!(snap.is_live);
        assert_eq!(snap.instrument_key, "BTC");
        assert_eq!(snap.rows[0].call_bid, 900.0);
        assert_eq!(handle.tier(), Some(Tier::Push));
    }

    #[tokio::test(start_paused = true)]
    async fn unparsable_push_frames_do_not_demote() {
        let (push, frames) = ScriptedPush::new();
        let controller = FeedController::with_transports(&config(), push, poll_never());
        let (sink, mut snapshots) = collector();

        let handle = controller.subscribe("BTC", sink);
        frames.unbounded_send(PushFrame::Text("garbage".into())).unwrap();
        frames.unbounded_send(frame(&json!({ "type": "hello" }))).unwrap();
        frames
            .unbounded_send(frame(&json!({ "rows": [{ "strike": 1 }] })))
            .unwrap();

        let snap = snapshots.recv().await.unwrap();
        assert_eq!(snap.strikes(), vec![1.0]);
        assert_eq!(handle.tier(), Some(Tier::Push));
    }

    #[tokio::test(start_paused = true)]
    async fn push_failure_falls_back_to_live_poll() {
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = FeedController::with_transports(
            &config(),
            Arc::new(RefusingPush),
            poll_ok(Arc::clone(&calls)),
        );
        let (sink, mut snapshots) = collector();

        let handle = controller.subscribe("BTC", sink);

        let snap = snapshots.recv().await.unwrap();
        assert!(snap.is_live);
        assert!(snap.rows.len() <= 20);
        assert_eq!(snap.instrument_key, "ETH");
        assert_eq!(handle.tier(), Some(Tier::Poll));
    }

    #[tokio::test(start_paused = true)]
    async fn push_and_poll_failure_fall_back_to_synthetic() {
        let controller =
            FeedController::with_transports(&config(), Arc::new(RefusingPush), poll_failing());
        let (sink, mut snapshots) = collector();

        let handle = controller.subscribe("BTC", sink);

        let snap = snapshots.recv().await.unwrap();
        assert!(!snap.is_live);
        assert_eq!(snap.rows.len(), SYNTHETIC_ROWS);
        assert_eq!(handle.tier(), Some(Tier::Synthetic));
    }

    #[tokio::test(start_paused = true)]
    async fn error_then_close_demotes_once() {
        let (push, frames) = ScriptedPush::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller =
            FeedController::with_transports(&config(), push, poll_ok(Arc::clone(&calls)));
        let (sink, mut snapshots) = collector();

        let handle = controller.subscribe("BTC", sink);
        frames.unbounded_send(PushFrame::Error("reset".into())).unwrap();
        frames.unbounded_send(PushFrame::Closed).unwrap();

        let snap = snapshots.recv().await.unwrap();
        assert!(snap.is_live);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.tier(), Some(Tier::Poll));
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_snapshots_keep_their_shape() {
        let controller =
            FeedController::with_transports(&config(), Arc::new(RefusingPush), poll_failing());
        let (sink, mut snapshots) = collector();

        let _handle = controller.subscribe("BTC", sink);

        let first = snapshots.recv().await.unwrap();
        let second = snapshots.recv().await.unwrap();
        let third = snapshots.recv().await.unwrap();

        assert_eq!(first.strikes(), second.strikes());
        assert_eq!(second.strikes(), third.strikes());
        assert!(!third.is_live);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_stops_delivery() {
        let controller =
            FeedController::with_transports(&config(), Arc::new(RefusingPush), poll_failing());
        let (sink, mut snapshots) = collector();

        let handle = controller.subscribe("BTC", sink);
        snapshots.recv().await.unwrap();

        handle.unsubscribe();
        assert_eq!(handle.tier(), None);
        assert!(!handle.is_active());
        assert!(controller.active_subscriptions().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(matches!(
            snapshots.try_recv(),
            Err(TryRecvError::Empty | TryRecvError::Disconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_is_idempotent_and_isolated() {
        let controller =
            FeedController::with_transports(&config(), Arc::new(RefusingPush), poll_failing());
        let (sink_a, _snapshots_a) = collector();
        let (sink_b, mut snapshots_b) = collector();

        let a = controller.subscribe("BTC", sink_a);
        let b = controller.subscribe("ETH", sink_b);

        a.unsubscribe();
        a.clone().unsubscribe();

        let snap = snapshots_b.recv().await.unwrap();
        assert_eq!(snap.instrument_key, "ETH");
        assert!(b.is_active());

        let active = controller.active_subscriptions();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id());
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_from_inside_callback() {
        let controller =
            FeedController::with_transports(&config(), Arc::new(RefusingPush), poll_failing());
        let cell: Arc<OnceLock<SubscriptionHandle>> = Arc::new(OnceLock::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = {
            let cell = Arc::clone(&cell);
            let calls = Arc::clone(&calls);
            controller.subscribe("BTC", move |_snapshot: Snapshot| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = cell.get() {
                    handle.unsubscribe();
                    handle.unsubscribe();
                }
            })
        };
        cell.set(handle.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn callback_may_unsubscribe_another_subscription() {
        let controller =
            FeedController::with_transports(&config(), Arc::new(RefusingPush), poll_failing());
        let target: Arc<OnceLock<SubscriptionHandle>> = Arc::new(OnceLock::new());

        let other = controller.subscribe("ETH", |_snapshot: Snapshot| {});
        let closer = {
            let target = Arc::clone(&target);
            controller.subscribe("BTC", move |_snapshot: Snapshot| {
                if let Some(handle) = target.get() {
                    handle.unsubscribe();
                }
            })
        };
        target.set(other.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!other.is_active());
        assert!(closer.is_active());
        let remaining: Vec<String> = controller
            .active_subscriptions()
            .into_iter()
            .map(|info| info.instrument_key)
            .collect();
        assert_eq!(remaining, vec!["BTC".to_string()]);

        closer.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_tier_events_are_dropped() {
        let (push, _frames) = ScriptedPush::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller =
            FeedController::with_transports(&config(), push, poll_ok(Arc::clone(&calls)));
        let (sink, mut snapshots) = collector();

        let (handle, events) =
            controller.subscribe_with_events("BTC".to_string(), Box::new(sink));

        events
            .send(TierEvent {
                generation: 0,
                tier: Tier::Push,
                kind: TierEventKind::Failed("reset".into()),
            })
            .await
            .unwrap();
        events
            .send(TierEvent {
                generation: 0,
                tier: Tier::Push,
                kind: TierEventKind::Snapshot(Snapshot::live("STALE", None, vec![])),
            })
            .await
            .unwrap();

        let snap = snapshots.recv().await.unwrap();
        assert_eq!(snap.instrument_key, "ETH");

        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(snap) = snapshots.try_recv() {
            assert_ne!(snap.instrument_key, "STALE");
        }
        assert_eq!(handle.tier(), Some(Tier::Poll));
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_all_tears_everything_down() {
        let controller =
            FeedController::with_transports(&config(), Arc::new(RefusingPush), poll_failing());
        let (sink_a, _a) = collector();
        let (sink_b, _b) = collector();

        let a = controller.subscribe("BTC", sink_a);
        let b = controller.subscribe("SOL", sink_b);
        assert_eq!(controller.active_subscriptions().len(), 2);

        controller.unsubscribe_all();

        assert!(!a.is_active());
        assert!(!b.is_active());
        assert!(controller.active_subscriptions().is_empty());
    }
}
