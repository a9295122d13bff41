//! flockstats core - the analytics data layer behind the flockstats views.
//!
//! Statistics for a user, a member or the whole organization are assembled
//! from four independent sources (giving, attendance, in-gathering and
//! nurturing), normalized into a single `ViewModel` and served
//! stale-while-revalidate from a short-lived cache.
//!
//! - `api`: HTTP client and the `StatsSource` seam
//! - `cache`: TTL cache with an optional on-disk mirror
//! - `guard`: per-subject in-flight deduplication
//! - `coordinator`: settle-all fan-out over the sources
//! - `normalizer`: raw responses to `ViewModel`
//! - `service`: `get_stats` / `subscribe`, the consumer surface
//! - `scheduler`: periodic refresh while a view is open

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod models;
pub mod normalizer;
pub mod scheduler;
pub mod service;
pub mod utils;

pub use api::{ApiClient, ApiError, StatsSource};
pub use cache::{CacheEntry, CacheStore, Clock, SystemClock};
pub use config::Config;
pub use coordinator::{FetchCoordinator, RawResponses};
pub use error::AnalyticsError;
pub use guard::FetchGuard;
pub use models::{SubjectId, ViewModel};
pub use normalizer::normalize;
pub use scheduler::{RefreshScheduler, DEFAULT_POLL_INTERVAL};
pub use service::{AnalyticsService, GetStatsOptions, StatsSnapshot, StatsStatus};
