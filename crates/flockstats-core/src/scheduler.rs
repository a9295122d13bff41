//! Refresh lifecycle for open views.
//!
//! `start` runs the stale-while-revalidate sequence for a subject right away
//! and then refreshes it on a fixed period until the returned token is
//! cancelled. Cancelling stops the timer; a batch already in flight still
//! completes and updates the cache, but the cancelled view's loop does
//! nothing further with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::SubjectId;
use crate::service::{AnalyticsService, GetStatsOptions};

/// Period of the background refresh while a view is open.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30_000);

/// Shorter periods (including zero from a config file) are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

type Registry = Arc<Mutex<HashMap<u64, (SubjectId, CancellationToken)>>>;

pub struct RefreshScheduler {
    service: AnalyticsService,
    poll_interval: Duration,
    views: Registry,
    next_id: AtomicU64,
}

impl RefreshScheduler {
    pub fn new(service: AnalyticsService, poll_interval: Duration) -> Self {
        if poll_interval < MIN_POLL_INTERVAL {
            warn!(
                requested_ms = poll_interval.as_millis() as u64,
                "Poll interval too short, using minimum"
            );
        }
        Self {
            service,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            views: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn service(&self) -> &AnalyticsService {
        &self.service
    }

    fn lock_views(&self) -> MutexGuard<'_, HashMap<u64, (SubjectId, CancellationToken)>> {
        self.views.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Begin serving `subject` to a view. Snapshots arrive through
    /// `AnalyticsService::subscribe`; cancel the token when the view closes.
    pub fn start(&self, subject: &SubjectId) -> CancellationToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.lock_views()
            .insert(id, (subject.clone(), token.clone()));

        info!(subject = %subject, view = id, "Starting stats refresh");
        let view = ViewLoop {
            id,
            subject: subject.clone(),
            service: self.service.clone(),
            poll_interval: self.poll_interval,
            token: token.clone(),
            views: Arc::clone(&self.views),
        };
        tokio::spawn(view.run());
        token
    }

    /// Stop refreshing for the view owning `token`. Safe to call repeatedly.
    pub fn cancel(&self, token: &CancellationToken) {
        token.cancel();
    }

    /// Stop every view, e.g. on shutdown
    pub fn cancel_all(&self) {
        for (_, token) in self.lock_views().values() {
            token.cancel();
        }
    }

    /// Subjects with at least one open view
    pub fn active_subjects(&self) -> Vec<SubjectId> {
        let mut subjects: Vec<SubjectId> = self
            .lock_views()
            .values()
            .filter(|(_, token)| !token.is_cancelled())
            .map(|(subject, _)| subject.clone())
            .collect();
        subjects.sort();
        subjects.dedup();
        subjects
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

struct ViewLoop {
    id: u64,
    subject: SubjectId,
    service: AnalyticsService,
    poll_interval: Duration,
    token: CancellationToken,
    views: Registry,
}

impl ViewLoop {
    async fn run(self) {
        tokio::select! {
            _ = self.token.cancelled() => {
                self.finish();
                return;
            }
            result = self.service.get_stats(&self.subject, GetStatsOptions::default()) => {
                if let Err(e) = result {
                    debug!(subject = %self.subject, error = %e, "Initial stats load failed");
                }
            }
        }

        let mut interval = tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        _ = self.token.cancelled() => break,
                        _ = self.service.poll_refresh(&self.subject) => {}
                    }
                }
            }
        }

        self.finish();
    }

    fn finish(&self) {
        self.views
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
        info!(subject = %self.subject, view = self.id, "Stopped stats refresh");
    }
}

// ============================================================================
// Tests
// ============================================================================
