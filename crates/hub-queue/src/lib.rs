//! # hub-queue
//!
//! A durable, privacy-gated outbox for network-bound "hits" (telemetry
//! beacons, rule-conditioned calls to a remote endpoint). Hits survive a
//! process restart because they are written to `hub-store`'s `SqliteDataQueue`
//! before this crate ever attempts to send them.
//!
//! # Overview
//!
//! 1. `enqueue` durably appends a hit and wakes the worker.
//! 2. The worker pulls up to `batch_limit` hits in FIFO order and hands them
//!    to a [`HitProcessor`].
//! 3. [`HitOutcome::Success`] and [`HitOutcome::Fatal`] both remove the batch
//!    (the difference is only in what gets logged); [`HitOutcome::Recoverable`]
//!    leaves it in place and the worker sleeps `processor.retry_interval`
//!    before trying again.
//! 4. An `optedOut` privacy status clears the queue outright and the worker
//!    idles until privacy changes again (§7's privacy gating).
//!
//! This mirrors the trichotomy `hub-core::classify_http_status` already
//! defines for HTTP-shaped outcomes, generalized to any processor.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use hub_core::PrivacyStatus;
use hub_store::{QueuedItem, SqliteDataQueue};

const DEFAULT_BATCH_LIMIT: usize = 20;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// A single durable record waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub seq: i64,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
}

impl From<QueuedItem> for Hit {
    fn from(item: QueuedItem) -> Self {
        Self {
            seq: item.seq,
            id: item.unique_id,
            timestamp: DateTime::from_timestamp(item.timestamp, 0).unwrap_or_else(Utc::now),
            data: item.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitOutcome {
    Success,
    Recoverable { reason: String },
    Fatal { reason: String },
}

/// Sends a batch of hits somewhere (HTTP, a local sink, whatever the
/// embedding extension wires up). Kept generic so this crate never has to
/// know about `reqwest` or any particular wire format.
#[async_trait]
pub trait HitProcessor: Send + Sync + 'static {
    async fn process_batch(&self, hits: &[Hit]) -> HitOutcome;

    /// How long to wait before retrying after a [`HitOutcome::Recoverable`].
    fn retry_interval(&self, _hits: &[Hit]) -> Duration {
        DEFAULT_RETRY_INTERVAL
    }
}

struct Inner {
    store: Arc<SqliteDataQueue>,
    processor: Arc<dyn HitProcessor>,
    batch_limit: AtomicUsize,
    privacy: parking_lot::Mutex<PrivacyStatus>,
    closed: AtomicBool,
    wake: Notify,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// A persistent, single-worker hit queue.
#[derive(Clone)]
pub struct PersistentHitQueue {
    inner: Arc<Inner>,
}

impl PersistentHitQueue {
    #[must_use]
    pub fn new(store: Arc<SqliteDataQueue>, processor: Arc<dyn HitProcessor>) -> Self {
        let inner = Arc::new(Inner {
            store,
            processor,
            batch_limit: AtomicUsize::new(DEFAULT_BATCH_LIMIT),
            privacy: parking_lot::Mutex::new(PrivacyStatus::Unknown),
            closed: AtomicBool::new(false),
            wake: Notify::new(),
            worker: tokio::sync::Mutex::new(None),
        });
        let queue = Self { inner };
        queue.spawn_worker();
        queue
    }

    fn spawn_worker(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                if inner.closed.load(Ordering::Acquire) {
                    return;
                }

                // Only an explicit opt-in drains the queue; `Unknown` accumulates
                // hits the same as `OptedOut`, it just doesn't clear them.
                if *inner.privacy.lock() != PrivacyStatus::OptedIn {
                    inner.wake.notified().await;
                    continue;
                }

                let limit = inner.batch_limit.load(Ordering::Acquire);
                let pending = match inner.store.count() {
                    Ok(count) => count,
                    Err(err) => {
                        tracing::error!(%err, "hit queue failed to read pending count");
                        tokio::time::sleep(DEFAULT_RETRY_INTERVAL).await;
                        continue;
                    }
                };

                // `batch_limit = 0` means no threshold: drain whatever is there.
                // Otherwise wait until at least `limit` hits have accumulated.
                if limit > 0 && pending < limit {
                    inner.wake.notified().await;
                    continue;
                }

                let peek_limit = if limit == 0 { pending } else { limit };
                let batch = match inner.store.peek(peek_limit) {
                    Ok(items) => items,
                    Err(err) => {
                        tracing::error!(%err, "hit queue failed to read pending batch");
                        tokio::time::sleep(DEFAULT_RETRY_INTERVAL).await;
                        continue;
                    }
                };

                if batch.is_empty() {
                    inner.wake.notified().await;
                    continue;
                }

                let seqs: Vec<i64> = batch.iter().map(|item| item.seq).collect();
                let hits: Vec<Hit> = batch.into_iter().map(Hit::from).collect();

                match inner.processor.process_batch(&hits).await {
                    HitOutcome::Success => {
                        if let Err(err) = inner.store.remove_batch(&seqs) {
                            tracing::error!(%err, "failed to remove sent hit batch");
                        }
                    }
                    HitOutcome::Fatal { reason } => {
                        tracing::warn!(%reason, count = hits.len(), "dropping hit batch after fatal outcome");
                        if let Err(err) = inner.store.remove_batch(&seqs) {
                            tracing::error!(%err, "failed to remove fatally-failed hit batch");
                        }
                    }
                    HitOutcome::Recoverable { reason } => {
                        let wait = inner.processor.retry_interval(&hits);
                        tracing::debug!(%reason, ?wait, "hit batch recoverable, retrying later");
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        });
        if let Ok(mut guard) = self.inner.worker.try_lock() {
            *guard = Some(handle);
        }
    }

    /// Durably appends `data` to the queue and wakes the worker.
    pub fn enqueue(&self, id: &str, timestamp: DateTime<Utc>, data: &[u8]) -> hub_core::HubResult<()> {
        self.inner
            .store
            .push(id, timestamp.timestamp(), data)
            .map_err(|err| hub_core::HubError::StorageUnavailable { reason: err.to_string() })?;
        self.inner.wake.notify_one();
        Ok(())
    }

    /// `0` disables the threshold: the worker drains whatever is queued as
    /// soon as it's there, instead of waiting for `limit` hits to accumulate.
    pub fn set_batch_limit(&self, limit: usize) {
        self.inner.batch_limit.store(limit, Ordering::Release);
    }

    pub fn count(&self) -> hub_core::HubResult<usize> {
        self.inner
            .store
            .count()
            .map_err(|err| hub_core::HubError::StorageUnavailable { reason: err.to_string() })
    }

    pub fn clear(&self) -> hub_core::HubResult<()> {
        self.inner
            .store
            .clear()
            .map_err(|err| hub_core::HubError::StorageUnavailable { reason: err.to_string() })
    }

    /// Applies a privacy status change (§7): `optedOut` clears every pending
    /// hit and idles the worker until privacy changes again.
    pub fn handle_privacy_change(&self, status: PrivacyStatus) {
        *self.inner.privacy.lock() = status;
        if status == PrivacyStatus::OptedOut {
            if let Err(err) = self.clear() {
                tracing::error!(%err, "failed to clear hit queue on opt-out");
            }
        }
        self.inner.wake.notify_one();
    }

    /// Stops the worker. Already-enqueued hits remain durable and will be
    /// picked up again the next time a queue is opened against the same
    /// database file.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.wake.notify_one();
        if let Some(handle) = self.inner.worker.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use tokio::sync::Mutex as AsyncMutex;

    struct CountingProcessor {
        calls: StdAtomicUsize,
        outcomes: AsyncMutex<Vec<HitOutcome>>,
    }

    impl CountingProcessor {
        fn always_success() -> Self {
            Self { calls: StdAtomicUsize::new(0), outcomes: AsyncMutex::new(vec![HitOutcome::Success]) }
        }

        fn sequence(outcomes: Vec<HitOutcome>) -> Self {
            Self { calls: StdAtomicUsize::new(0), outcomes: AsyncMutex::new(outcomes) }
        }
    }

    #[async_trait]
    impl HitProcessor for CountingProcessor {
        async fn process_batch(&self, _hits: &[Hit]) -> HitOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().await;
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes[0].clone()
            }
        }

        fn retry_interval(&self, _hits: &[Hit]) -> Duration {
            Duration::from_millis(5)
        }
    }

    fn memory_queue(processor: Arc<dyn HitProcessor>) -> (PersistentHitQueue, Arc<SqliteDataQueue>) {
        let store = Arc::new(SqliteDataQueue::open_in_memory().unwrap());
        let queue = PersistentHitQueue::new(store.clone(), processor);
        queue.set_batch_limit(1);
        queue.handle_privacy_change(PrivacyStatus::OptedIn);
        (queue, store)
    }

    #[tokio::test]
    async fn success_removes_the_batch() {
        let processor = Arc::new(CountingProcessor::always_success());
        let (queue, store) = memory_queue(processor);
        queue.enqueue("a", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn recoverable_outcome_keeps_hit_for_retry() {
        let processor = Arc::new(CountingProcessor::sequence(vec![
            HitOutcome::Recoverable { reason: "503".to_string() },
            HitOutcome::Success,
        ]));
        let (queue, store) = memory_queue(processor.clone());
        queue.enqueue("a", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.count().unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.count().unwrap(), 0);
        assert!(processor.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn fatal_outcome_drops_the_batch() {
        let processor = Arc::new(CountingProcessor::sequence(vec![HitOutcome::Fatal {
            reason: "400".to_string(),
        }]));
        let (queue, store) = memory_queue(processor);
        queue.enqueue("a", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn worker_waits_for_batch_limit_before_processing() {
        let processor = Arc::new(CountingProcessor::always_success());
        let store = Arc::new(SqliteDataQueue::open_in_memory().unwrap());
        let queue = PersistentHitQueue::new(store.clone(), processor.clone());
        queue.set_batch_limit(3);
        queue.handle_privacy_change(PrivacyStatus::OptedIn);

        queue.enqueue("a", Utc::now(), b"hit").unwrap();
        queue.enqueue("b", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.count().unwrap(), 2, "below threshold, nothing should be sent yet");
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);

        queue.enqueue("c", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.count().unwrap(), 0, "threshold reached, the whole batch should drain");
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_batch_limit_disables_the_threshold() {
        let processor = Arc::new(CountingProcessor::always_success());
        let store = Arc::new(SqliteDataQueue::open_in_memory().unwrap());
        let queue = PersistentHitQueue::new(store.clone(), processor.clone());
        queue.set_batch_limit(0);
        queue.handle_privacy_change(PrivacyStatus::OptedIn);

        queue.enqueue("a", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_privacy_accumulates_hits_without_clearing() {
        let processor = Arc::new(CountingProcessor::always_success());
        let store = Arc::new(SqliteDataQueue::open_in_memory().unwrap());
        let queue = PersistentHitQueue::new(store.clone(), processor.clone());
        queue.set_batch_limit(1);
        queue.enqueue("a", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);

        queue.handle_privacy_change(PrivacyStatus::OptedIn);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn opt_out_clears_the_queue_and_halts_sends() {
        let processor = Arc::new(CountingProcessor::always_success());
        let store = Arc::new(SqliteDataQueue::open_in_memory().unwrap());
        let queue = PersistentHitQueue::new(store.clone(), processor.clone());
        queue.set_batch_limit(1);
        queue.handle_privacy_change(PrivacyStatus::OptedIn);
        queue.enqueue("a", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.handle_privacy_change(PrivacyStatus::OptedOut);
        queue.enqueue("b", Utc::now(), b"hit").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.count().unwrap(), 1);
    }

    /// Records the payload bytes it was handed on each call, alongside a
    /// scripted outcome sequence. Used by `s5_hit_retry` to confirm the same
    /// bytes are re-presented on every retry.
    struct PayloadTrackingProcessor {
        calls: StdAtomicUsize,
        outcomes: AsyncMutex<Vec<HitOutcome>>,
        seen_payloads: AsyncMutex<Vec<Vec<u8>>>,
        retry_interval: Duration,
    }

    impl PayloadTrackingProcessor {
        fn new(outcomes: Vec<HitOutcome>, retry_interval: Duration) -> Self {
            Self {
                calls: StdAtomicUsize::new(0),
                outcomes: AsyncMutex::new(outcomes),
                seen_payloads: AsyncMutex::new(Vec::new()),
                retry_interval,
            }
        }
    }

    #[async_trait]
    impl HitProcessor for PayloadTrackingProcessor {
        async fn process_batch(&self, hits: &[Hit]) -> HitOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_payloads.lock().await.push(hits[0].data.clone());
            let mut outcomes = self.outcomes.lock().await;
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes[0].clone()
            }
        }

        fn retry_interval(&self, _hits: &[Hit]) -> Duration {
            self.retry_interval
        }
    }

    #[tokio::test]
    async fn s5_hit_retry_re_presents_the_same_payload_until_it_succeeds() {
        let retry_interval = Duration::from_millis(20);
        let processor = Arc::new(PayloadTrackingProcessor::new(
            vec![
                HitOutcome::Recoverable { reason: "503".to_string() },
                HitOutcome::Recoverable { reason: "503".to_string() },
                HitOutcome::Success,
            ],
            retry_interval,
        ));
        let (queue, store) = memory_queue(processor.clone());
        let start = std::time::Instant::now();
        queue.enqueue("a", Utc::now(), b"hit-payload").unwrap();

        while store.count().unwrap() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let elapsed = start.elapsed();

        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= retry_interval * 2, "elapsed {elapsed:?} should be at least two retry intervals");
        let seen = processor.seen_payloads.lock().await;
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|payload| payload == b"hit-payload"));
    }

    /// Returns `Success` on every call, but sleeps past its own return on the
    /// second call so the test can toggle privacy while that call is still
    /// in flight, matching `s6`'s "during processing of hit #2" wording.
    struct SlowOnSecondCallProcessor {
        calls: StdAtomicUsize,
        stall: Duration,
    }

    #[async_trait]
    impl HitProcessor for SlowOnSecondCallProcessor {
        async fn process_batch(&self, _hits: &[Hit]) -> HitOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == 2 {
                tokio::time::sleep(self.stall).await;
            }
            HitOutcome::Success
        }
    }

    #[tokio::test]
    async fn s6_privacy_opt_out_mid_flight_clears_the_remainder() {
        let processor = Arc::new(SlowOnSecondCallProcessor { calls: StdAtomicUsize::new(0), stall: Duration::from_millis(40) });
        let store = Arc::new(SqliteDataQueue::open_in_memory().unwrap());
        let queue = PersistentHitQueue::new(store.clone(), processor.clone());
        queue.set_batch_limit(1);
        queue.handle_privacy_change(PrivacyStatus::OptedIn);
        for id in ["a", "b", "c", "d", "e"] {
            queue.enqueue(id, Utc::now(), b"hit").unwrap();
        }

        // Let hit #1 finish and hit #2 start before flipping privacy.
        tokio::time::sleep(Duration::from_millis(15)).await;
        queue.handle_privacy_change(PrivacyStatus::OptedOut);

        // Give hit #2's in-flight call time to complete and the clear to land.
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 2);
    }
}
