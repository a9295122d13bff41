//! Consumer-facing analytics surface.
//!
//! `AnalyticsService::get_stats` implements stale-while-revalidate on top of
//! `CacheStore`, `FetchGuard` and `FetchCoordinator`: fresh entries come back
//! immediately and are refreshed shortly after in the background, absent or
//! stale entries go through a full fetch, and concurrent non-forced calls for
//! the same subject share a single batch. Every state change for a subject is
//! published on a `watch` channel that views can subscribe to.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, StatsSource};
use crate::cache::{CacheEntry, CacheStore, DiskStore, SystemClock};
use crate::config::Config;
use crate::coordinator::FetchCoordinator;
use crate::error::AnalyticsError;
use crate::guard::{FetchGuard, InFlight};
use crate::models::{SubjectId, ViewModel};
use crate::normalizer::normalize;

// ============================================================================
// Constants
// ============================================================================

/// Delay between serving a cached entry and revalidating it.
pub const DEFAULT_BACKGROUND_REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Maximum subjects fetched at once by `prefetch`.
const MAX_CONCURRENT_PREFETCH: usize = 4;

// ============================================================================
// Snapshot Types
// ============================================================================

/// Outcome of the most recent visible load for a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum StatsStatus {
    Ready,
    AuthRequired,
    Failed(String),
}

/// What a view renders for one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub subject: SubjectId,
    pub data: ViewModel,
    /// A first fetch (cache miss or stale entry) is running
    pub is_initial_load: bool,
    /// A background refresh is running; `data` stays displayed meanwhile
    pub is_refreshing: bool,
    pub status: StatsStatus,
    /// Epoch milliseconds the data was fetched at, `None` before any data
    pub updated_at: Option<i64>,
    /// Number of batches that have settled for this subject
    pub revision: u64,
}

impl StatsSnapshot {
    fn empty(subject: &SubjectId) -> Self {
        Self {
            subject: subject.clone(),
            data: ViewModel::default(),
            is_initial_load: false,
            is_refreshing: false,
            status: StatsStatus::Ready,
            updated_at: None,
            revision: 0,
        }
    }

    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            data: entry.data.clone(),
            updated_at: Some(entry.written_at),
            ..Self::empty(&entry.key)
        }
    }

    pub fn has_data(&self) -> bool {
        self.updated_at.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.is_initial_load || self.is_refreshing
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetStatsOptions {
    /// Skip the cache and the in-flight check
    pub force_refresh: bool,
}

impl GetStatsOptions {
    pub fn forced() -> Self {
        Self { force_refresh: true }
    }
}

/// Which indicator a batch raises while it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    Initial,
    Background,
}

// ============================================================================
// Service
// ============================================================================

struct Inner {
    coordinator: FetchCoordinator,
    cache: Arc<CacheStore>,
    guard: Arc<FetchGuard>,
    channels: Mutex<HashMap<SubjectId, Arc<watch::Sender<StatsSnapshot>>>>,
    auth_blocked: Mutex<HashSet<SubjectId>>,
    background_refresh_delay: Duration,
}

/// Shared handle to the analytics layer. Clone is cheap.
#[derive(Clone)]
pub struct AnalyticsService {
    inner: Arc<Inner>,
}

impl AnalyticsService {
    pub fn new(source: Arc<dyn StatsSource>, cache: Arc<CacheStore>) -> Self {
        Self::with_refresh_delay(source, cache, DEFAULT_BACKGROUND_REFRESH_DELAY)
    }

    /// Like `new`, with a custom delay between serving a cached entry and
    /// revalidating it.
    pub fn with_refresh_delay(
        source: Arc<dyn StatsSource>,
        cache: Arc<CacheStore>,
        background_refresh_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                coordinator: FetchCoordinator::new(source),
                cache,
                guard: Arc::new(FetchGuard::new()),
                channels: Mutex::new(HashMap::new()),
                auth_blocked: Mutex::new(HashSet::new()),
                background_refresh_delay,
            }),
        }
    }

    /// Build the HTTP-backed service described by `config`.
    pub fn from_config(config: &Config, token: Option<String>) -> anyhow::Result<Self> {
        let mut api = ApiClient::new(&config.api_base_url)?;
        if let Some(token) = token {
            api.set_token(token);
        }

        let mut cache = CacheStore::new(
            config.cache_ttl(),
            config.max_cache_entries,
            Arc::new(SystemClock),
        );
        if config.persist_cache {
            match config.cache_dir().and_then(DiskStore::new) {
                Ok(disk) => cache = cache.with_disk(disk),
                Err(e) => warn!(error = %e, "Cache directory unavailable, caching in memory only"),
            }
        }

        Ok(Self::with_refresh_delay(
            Arc::new(api),
            Arc::new(cache),
            config.background_refresh_delay(),
        ))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn guard(&self) -> &FetchGuard {
        &self.inner.guard
    }

    /// Current statistics for `subject`.
    ///
    /// A fresh cache entry is returned without awaiting any network call and
    /// a background refresh is scheduled. Otherwise the sources are fetched,
    /// or, when a batch for the subject is already in flight, its result is
    /// awaited instead.
    pub async fn get_stats(
        &self,
        subject: &SubjectId,
        options: GetStatsOptions,
    ) -> Result<StatsSnapshot, AnalyticsError> {
        if options.force_refresh {
            return self.refresh(subject).await;
        }

        if let Some(entry) = self.inner.cache.read_fresh(subject) {
            debug!(subject = %subject, "Serving cached stats");
            let snapshot = self.inner.show_entry(&entry);
            self.schedule_background_refresh(subject);
            return Ok(snapshot);
        }

        let tx = self.inner.channel(subject);
        let mut rx = tx.subscribe();
        let seen = rx.borrow_and_update().revision;

        match self.inner.guard.try_enter(subject) {
            Some(token) => self.inner.run_batch(subject, token, BatchKind::Initial).await,
            None => {
                debug!(subject = %subject, "Waiting for in-flight stats fetch");
                let settled = rx
                    .wait_for(|s| s.revision > seen)
                    .await
                    .map(|s| s.clone())
                    .map_err(|_| AnalyticsError::BatchFailed("stats channel closed".to_string()))?;
                match settled.status {
                    StatsStatus::AuthRequired => Err(AnalyticsError::AuthenticationRequired),
                    StatsStatus::Failed(msg) => Err(AnalyticsError::BatchFailed(msg)),
                    StatsStatus::Ready if !settled.has_data() => Err(AnalyticsError::BatchFailed(
                        "in-flight fetch returned no data".to_string(),
                    )),
                    StatsStatus::Ready => Ok(settled),
                }
            }
        }
    }

    /// Fetch `subject` now, even if a batch for it is already in flight.
    pub async fn refresh(&self, subject: &SubjectId) -> Result<StatsSnapshot, AnalyticsError> {
        let token = self.inner.guard.force_enter(subject);
        let kind = if self.inner.channel(subject).borrow().has_data()
            || self.inner.cache.read(subject).is_some()
        {
            BatchKind::Background
        } else {
            BatchKind::Initial
        };
        self.inner.run_batch(subject, token, kind).await
    }

    /// Watch every state change for `subject`. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self, subject: &SubjectId) -> watch::Receiver<StatsSnapshot> {
        self.inner.channel(subject).subscribe()
    }

    /// Load several subjects with bounded concurrency, e.g. to warm a member
    /// list. Results come back in completion order.
    pub async fn prefetch(
        &self,
        subjects: Vec<SubjectId>,
    ) -> Vec<(SubjectId, Result<StatsSnapshot, AnalyticsError>)> {
        stream::iter(subjects)
            .map(|subject| async move {
                let result = self.get_stats(&subject, GetStatsOptions::default()).await;
                (subject, result)
            })
            .buffer_unordered(MAX_CONCURRENT_PREFETCH)
            .collect()
            .await
    }

    /// Subject whose last fetch was rejected for lack of authentication.
    /// Background refreshes leave it alone until `reauthenticated`.
    pub fn is_auth_blocked(&self, subject: &SubjectId) -> bool {
        self.inner.lock_auth_blocked().contains(subject)
    }

    /// Call after the user signs in again so blocked subjects resume refreshing.
    pub fn reauthenticated(&self) {
        let cleared = std::mem::take(&mut *self.inner.lock_auth_blocked());
        if !cleared.is_empty() {
            info!(count = cleared.len(), "Resuming refresh after re-authentication");
        }
    }

    /// Background refresh on the periodic timer; failures stay invisible.
    pub(crate) async fn poll_refresh(&self, subject: &SubjectId) {
        if self.is_auth_blocked(subject) {
            debug!(subject = %subject, "Skipping refresh until re-authentication");
            return;
        }
        if let Err(e) = self.refresh(subject).await {
            debug!(subject = %subject, error = %e, "Periodic refresh failed");
        }
    }

    fn schedule_background_refresh(&self, subject: &SubjectId) {
        let inner = Arc::clone(&self.inner);
        let subject = subject.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.background_refresh_delay).await;
            if inner.lock_auth_blocked().contains(&subject) {
                return;
            }
            match inner.guard.try_enter(&subject) {
                Some(token) => {
                    if let Err(e) = inner.run_batch(&subject, token, BatchKind::Background).await {
                        debug!(subject = %subject, error = %e, "Background refresh failed");
                    }
                }
                None => debug!(subject = %subject, "Background refresh skipped, fetch already in flight"),
            }
        });
    }
}

impl Inner {
    fn lock_channels(&self) -> MutexGuard<'_, HashMap<SubjectId, Arc<watch::Sender<StatsSnapshot>>>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_auth_blocked(&self) -> MutexGuard<'_, HashSet<SubjectId>> {
        self.auth_blocked.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot channel for `subject`, seeded from the cache on first use
    fn channel(&self, subject: &SubjectId) -> Arc<watch::Sender<StatsSnapshot>> {
        if let Some(tx) = self.lock_channels().get(subject) {
            return Arc::clone(tx);
        }

        let initial = match self.cache.read(subject) {
            Some(entry) => StatsSnapshot::from_entry(&entry),
            None => StatsSnapshot::empty(subject),
        };
        let mut channels = self.lock_channels();
        let tx = channels
            .entry(subject.clone())
            .or_insert_with(|| Arc::new(watch::channel(initial).0));
        Arc::clone(tx)
    }

    /// Publish a cached entry if the channel is showing something older
    fn show_entry(&self, entry: &CacheEntry) -> StatsSnapshot {
        let tx = self.channel(&entry.key);
        tx.send_if_modified(|s| {
            if s.updated_at >= Some(entry.written_at) {
                return false;
            }
            s.data = entry.data.clone();
            s.updated_at = Some(entry.written_at);
            s.status = StatsStatus::Ready;
            true
        });
        let snapshot = tx.borrow().clone();
        snapshot
    }

    /// Run one batch on its own task so it completes (and releases its
    /// in-flight mark) even if the caller stops waiting.
    async fn run_batch(
        self: &Arc<Self>,
        subject: &SubjectId,
        token: InFlight,
        kind: BatchKind,
    ) -> Result<StatsSnapshot, AnalyticsError> {
        let inner = Arc::clone(self);
        let task_subject = subject.clone();
        let handle = tokio::spawn(async move {
            let outcome = inner.execute_batch(&task_subject, kind).await;
            // Followers that see the settled revision must find the mark gone
            drop(token);
            inner.settle(&task_subject, kind, outcome)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(subject = %subject, error = %e, "Stats batch task failed");
                let message = "stats batch task failed".to_string();
                self.settle(subject, kind, Err(AnalyticsError::BatchFailed(message)))
            }
        }
    }

    async fn execute_batch(
        &self,
        subject: &SubjectId,
        kind: BatchKind,
    ) -> Result<CacheEntry, AnalyticsError> {
        self.channel(subject).send_modify(|s| match kind {
            BatchKind::Initial => s.is_initial_load = true,
            BatchKind::Background => s.is_refreshing = true,
        });

        let fetched = AssertUnwindSafe(self.coordinator.fetch_all(subject))
            .catch_unwind()
            .await;

        let raw = match fetched {
            Ok(raw) => raw,
            Err(_) => {
                error!(subject = %subject, "Stats batch panicked");
                return Err(AnalyticsError::BatchFailed("stats batch panicked".to_string()));
            }
        };

        if raw.auth_failure() {
            warn!(subject = %subject, "Stats require authentication, pausing refresh");
            self.lock_auth_blocked().insert(subject.clone());
            return Err(AnalyticsError::AuthenticationRequired);
        }

        if raw.all_failed() && self.cache.read(subject).is_some() {
            // Writing all-zero stats over a good entry would lose data
            warn!(subject = %subject, "Every stats source failed, keeping cached data");
            return Err(AnalyticsError::BatchFailed("all statistics sources failed".to_string()));
        }

        let entry = self.cache.write(subject, normalize(&raw));
        self.lock_auth_blocked().remove(subject);
        info!(subject = %subject, failed_sources = raw.failed_count(), "Stats refreshed");
        Ok(entry)
    }

    /// Publish the outcome of a batch and clear its indicator.
    fn settle(
        &self,
        subject: &SubjectId,
        kind: BatchKind,
        outcome: Result<CacheEntry, AnalyticsError>,
    ) -> Result<StatsSnapshot, AnalyticsError> {
        let tx = self.channel(subject);
        tx.send_modify(|s| {
            match &outcome {
                Ok(entry) => {
                    s.data = entry.data.clone();
                    s.updated_at = Some(entry.written_at);
                    s.status = StatsStatus::Ready;
                }
                Err(AnalyticsError::AuthenticationRequired) => {
                    s.status = StatsStatus::AuthRequired;
                }
                // A failed background refresh leaves the displayed data as is
                Err(AnalyticsError::BatchFailed(msg)) => {
                    if kind == BatchKind::Initial {
                        s.status = StatsStatus::Failed(msg.clone());
                    }
                }
            }
            match kind {
                BatchKind::Initial => s.is_initial_load = false,
                BatchKind::Background => s.is_refreshing = false,
            }
            s.revision += 1;
        });
        let snapshot = tx.borrow().clone();
        outcome.map(|_| snapshot)
    }
}

// ============================================================================
// Tests
// ============================================================================
