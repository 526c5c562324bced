//! Periodic and adaptive polling of a remote collection into an [`EntityStore`].
//!
//! Two timers drive a scheduler:
//! - the base timer, running for as long as the scheduler is live and enabled;
//! - the fast timer, started when a refresh leaves a transient entity in the
//!   store and stopped by itself once none is left.
//!
//! Every poll goes through [`SyncScheduler::poll_once`], which skips (rather
//! than queues) when the [`BusyFlag`] is held and checks the liveness token
//! before writing anything fetched from the network.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FailurePolicy, PollConfig};
use crate::error::SyncError;
use crate::gateway::{CollectionResponse, RemoteGateway};
use crate::store::EntityStore;
use crate::types::Entity;

/// Held while a fetch, delete or bulk delete is in flight.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicUsize>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> BusyGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        BusyGuard(Arc::clone(&self.0))
    }

    /// Take the flag only if nobody holds it.
    pub fn try_enter(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(Arc::clone(&self.0)))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }
}

/// Releases the busy flag on drop.
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicUsize>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Why a poll did not reach the gateway (or did not write its result).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Busy,
    Stopped,
}

/// Result of one poll attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Refreshed { count: usize },
    Skipped(SkipReason),
    Failed(SyncError),
}

impl PollOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, PollOutcome::Refreshed { .. })
    }
}

/// Server-reported counts from the last successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteSummary {
    pub total_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<u64>,
}

impl<E> From<&CollectionResponse<E>> for RemoteSummary {
    fn from(resp: &CollectionResponse<E>) -> Self {
        Self {
            total_count: resp.total_count,
            indexed_count: resp.indexed_count,
            processing_count: resp.processing_count,
            failed_count: resp.failed_count,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    polls: AtomicU64,
    skipped: AtomicU64,
    regressions: AtomicU64,
}

/// Keeps one [`EntityStore`] eventually consistent with its gateway.
pub struct SyncScheduler<G: RemoteGateway> {
    gateway: Arc<G>,
    store: Arc<EntityStore<G::Item>>,
    config: PollConfig,
    busy: BusyFlag,
    live: CancellationToken,
    error: Mutex<Option<SyncError>>,
    summary: Mutex<Option<RemoteSummary>>,
    fast_running: AtomicBool,
    timers: Mutex<Vec<JoinHandle<()>>>,
    counters: Counters,
    weak_self: Weak<Self>,
}

impl<G: RemoteGateway> SyncScheduler<G> {
    pub fn new(gateway: Arc<G>, store: Arc<EntityStore<G::Item>>, config: PollConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            gateway,
            store,
            config,
            busy: BusyFlag::new(),
            live: CancellationToken::new(),
            error: Mutex::new(None),
            summary: Mutex::new(None),
            fast_running: AtomicBool::new(false),
            timers: Mutex::new(Vec::new()),
            counters: Counters::default(),
            weak_self: weak_self.clone(),
        })
    }

    pub fn store(&self) -> &Arc<EntityStore<G::Item>> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn busy(&self) -> &BusyFlag {
        &self.busy
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// False once [`shutdown`](Self::shutdown) has run.
    pub fn is_live(&self) -> bool {
        !self.live.is_cancelled()
    }

    /// Token cancelled on teardown; continuations check it before writing.
    pub fn liveness(&self) -> CancellationToken {
        self.live.clone()
    }

    /// Error from the most recent failed poll, cleared by the next success.
    pub fn error(&self) -> Option<SyncError> {
        lock(&self.error).clone()
    }

    pub fn summary(&self) -> Option<RemoteSummary> {
        lock(&self.summary).clone()
    }

    pub fn is_fast_polling(&self) -> bool {
        self.fast_running.load(Ordering::SeqCst)
    }

    /// Polls that reached the gateway.
    pub fn polls_issued(&self) -> u64 {
        self.counters.polls.load(Ordering::SeqCst)
    }

    /// Polls skipped because the busy flag was held.
    pub fn ticks_skipped(&self) -> u64 {
        self.counters.skipped.load(Ordering::SeqCst)
    }

    /// Refreshed entities whose status went backwards since the previous
    /// snapshot.
    pub fn regressions_observed(&self) -> u64 {
        self.counters.regressions.load(Ordering::SeqCst)
    }

    /// Start the base timer. Its first tick fires immediately and performs the
    /// initial fetch. Does nothing when polling is disabled.
    pub fn start(&self) {
        if !self.config.enabled {
            info!(resource = G::Item::RESOURCE, "polling disabled");
            return;
        }
        if !self.is_live() {
            return;
        }
        let period = self.config.base_interval();
        info!(
            resource = G::Item::RESOURCE,
            interval_ms = period.as_millis() as u64,
            "starting base polling"
        );
        let handle = self.spawn_ticker(Instant::now(), period, |_| true);
        self.track(handle);
    }

    /// Fetch the collection once and publish it to the store.
    pub async fn poll_once(&self) -> PollOutcome {
        if !self.is_live() {
            return PollOutcome::Skipped(SkipReason::Stopped);
        }
        let Some(guard) = self.busy.try_enter() else {
            self.counters.skipped.fetch_add(1, Ordering::SeqCst);
            debug!(resource = G::Item::RESOURCE, "poll skipped: busy");
            return PollOutcome::Skipped(SkipReason::Busy);
        };
        self.counters.polls.fetch_add(1, Ordering::SeqCst);
        let result = self.gateway.fetch_collection().await;
        drop(guard);

        if !self.is_live() {
            debug!(resource = G::Item::RESOURCE, "discarding fetch result after teardown");
            return PollOutcome::Skipped(SkipReason::Stopped);
        }

        match result {
            Ok(response) => {
                *lock(&self.summary) = Some(RemoteSummary::from(&response));
                let count = response.items.len();
                self.note_regressions(&response.items);
                self.store.replace(response.items);
                *lock(&self.error) = None;
                debug!(resource = G::Item::RESOURCE, count, "collection refreshed");
                self.ensure_fast_polling();
                PollOutcome::Refreshed { count }
            }
            Err(e) => {
                let err = SyncError::from(e);
                warn!(
                    resource = G::Item::RESOURCE,
                    code = ?err.code,
                    policy = ?self.config.on_failure,
                    "poll failed: {}",
                    err
                );
                if self.config.on_failure == FailurePolicy::Clear {
                    self.store.clear();
                }
                *lock(&self.error) = Some(err.clone());
                PollOutcome::Failed(err)
            }
        }
    }

    /// Warn about entities whose status moved backwards. The server's copy
    /// is still published as-is.
    fn note_regressions(&self, incoming: &[G::Item]) {
        let current = self.store.snapshot();
        let prior: HashMap<&str, &G::Item> = current.items.iter().map(|e| (e.id(), e)).collect();
        for item in incoming {
            let Some(before) = prior.get(item.id()) else {
                continue;
            };
            if item.regressed_from(before) {
                self.counters.regressions.fetch_add(1, Ordering::SeqCst);
                warn!(
                    resource = G::Item::RESOURCE,
                    id = item.id(),
                    from = before.status_label(),
                    to = item.status_label(),
                    "status moved backwards"
                );
            }
        }
    }

    /// Poll once after `delay`, unless torn down first. Used for
    /// reconciliation after a mutation.
    pub fn schedule_refresh(&self, delay: Duration) {
        let weak = self.weak_self.clone();
        let live = self.live.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = live.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(this) = weak.upgrade() {
                        let outcome = this.poll_once().await;
                        debug!(resource = G::Item::RESOURCE, ?outcome, "reconciliation poll");
                    }
                }
            }
        });
        self.track(handle);
    }

    /// Start the fast timer if it is configured, not yet running, and the
    /// store holds a transient entity.
    pub fn ensure_fast_polling(&self) {
        let Some(period) = self.config.fast_interval() else {
            return;
        };
        if !self.config.enabled || !self.is_live() || !self.store.snapshot().has_transient() {
            return;
        }
        if self.fast_running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            resource = G::Item::RESOURCE,
            interval_ms = period.as_millis() as u64,
            "transient entities present, starting fast polling"
        );
        let handle = self.spawn_ticker(Instant::now() + period, period, |this: &Self| {
            if this.store.snapshot().has_transient() {
                true
            } else {
                this.fast_running.store(false, Ordering::SeqCst);
                info!(resource = G::Item::RESOURCE, "no transient entities, stopping fast polling");
                false
            }
        });
        self.track(handle);
    }

    /// Cancel every timer and mark the scheduler dead. In-flight fetches may
    /// still resolve but their results are discarded.
    pub fn shutdown(&self) {
        if self.live.is_cancelled() {
            return;
        }
        self.live.cancel();
        self.fast_running.store(false, Ordering::SeqCst);
        for handle in lock(&self.timers).drain(..) {
            handle.abort();
        }
        info!(resource = G::Item::RESOURCE, "scheduler stopped");
    }

    /// Spawn a ticking loop. `keep_going` runs before every tick's poll and
    /// ends the loop when it returns false. Each tick's poll runs on its own
    /// task, so a tick landing during a slow fetch reaches the busy check.
    fn spawn_ticker<F>(&self, start: Instant, period: Duration, keep_going: F) -> JoinHandle<()>
    where
        F: Fn(&Self) -> bool + Send + 'static,
    {
        let weak = self.weak_self.clone();
        let live = self.live.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = live.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(this) = weak.upgrade() else { break };
                        if !keep_going(this.as_ref()) {
                            break;
                        }
                        tokio::spawn(async move {
                            this.poll_once().await;
                        });
                    }
                }
            }
        })
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut timers = lock(&self.timers);
        timers.retain(|h| !h.is_finished());
        timers.push(handle);
    }
}

impl<G: RemoteGateway> Drop for SyncScheduler<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
