//! Local caching of analytics view models.
//!
//! `CacheStore` keeps one entry per subject and considers it fresh for
//! 5 minutes. Entries are held in memory (LRU-bounded) and optionally
//! mirrored to JSON files via `DiskStore` so they survive a restart.

pub mod clock;
pub mod disk;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use disk::{DiskStore, StoredEntry};
pub use store::{CacheEntry, CacheStore, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
