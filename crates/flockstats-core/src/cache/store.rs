use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use tracing::{debug, warn};

use crate::models::{SubjectId, ViewModel};

use super::clock::Clock;
use super::disk::{DiskStore, StoredEntry};

/// Entries younger than this are served without a blocking fetch.
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Upper bound on cached subjects; least recently used are evicted first.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

const MILLIS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: SubjectId,
    pub data: ViewModel,
    /// Epoch milliseconds
    pub written_at: i64,
}

impl CacheEntry {
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.written_at
    }

    pub fn age_minutes(&self, now_millis: i64) -> i64 {
        self.age_millis(now_millis) / MILLIS_PER_MINUTE
    }

    pub fn age_display(&self, now_millis: i64) -> String {
        let minutes = self.age_minutes(now_millis);
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Keyed store of analytics view models with a fixed freshness window.
///
/// Entries live in a bounded in-memory LRU map and, when a `DiskStore` is
/// attached, are mirrored to disk so a restart can serve them again. The
/// cache is only ever an optimization: every storage failure is logged and
/// treated as a miss.
pub struct CacheStore {
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
    entries: Mutex<LruCache<SubjectId, CacheEntry>>,
    disk: Option<DiskStore>,
}

impl CacheStore {
    pub fn new(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            clock,
            entries: Mutex::new(LruCache::new(capacity)),
            disk: None,
        }
    }

    /// Mirror entries to the given disk store
    pub fn with_disk(mut self, disk: DiskStore) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.max(0) as u64)
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// A poisoned lock only means another thread panicked mid-update of an
    /// LRU ordering; the map itself is still usable.
    fn lock_entries(&self) -> MutexGuard<'_, LruCache<SubjectId, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.age_millis(self.now_millis()) < self.ttl_ms
    }

    /// Current entry for `key`, fresh or not
    pub fn read(&self, key: &SubjectId) -> Option<CacheEntry> {
        if let Some(entry) = self.lock_entries().get(key) {
            return Some(entry.clone());
        }

        let stored = match self.disk.as_ref()?.load(key) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                debug!(subject = %key, error = %e, "Failed to load cached stats, treating as miss");
                return None;
            }
        };

        let entry = CacheEntry {
            key: key.clone(),
            data: stored.data,
            written_at: stored.timestamp,
        };

        let mut entries = self.lock_entries();
        // A write may have landed while the file was being read
        if let Some(newer) = entries.get(key) {
            return Some(newer.clone());
        }
        entries.put(key.clone(), entry.clone());
        Some(entry)
    }

    /// Entry for `key` only if it is still within the TTL
    pub fn read_fresh(&self, key: &SubjectId) -> Option<CacheEntry> {
        self.read(key).filter(|entry| self.is_fresh(entry))
    }

    /// Replace the entry for `key`, stamping it with the current time.
    pub fn write(&self, key: &SubjectId, data: ViewModel) -> CacheEntry {
        let entry = CacheEntry {
            key: key.clone(),
            data,
            written_at: self.now_millis(),
        };

        let evicted = {
            let mut entries = self.lock_entries();
            match entries.push(key.clone(), entry.clone()) {
                Some((old_key, _)) if old_key != *key => Some(old_key),
                _ => None,
            }
        };

        if let Some(disk) = &self.disk {
            let stored = StoredEntry {
                data: entry.data.clone(),
                timestamp: entry.written_at,
            };
            if let Err(e) = disk.save(key, &stored) {
                warn!(subject = %key, error = %e, "Failed to persist cached stats");
            }
        }

        if let Some(old_key) = evicted {
            debug!(subject = %old_key, "Evicted least recently used stats");
            self.remove_from_disk(&old_key);
        }

        entry
    }

    pub fn invalidate(&self, key: &SubjectId) {
        self.lock_entries().pop(key);
        self.remove_from_disk(key);
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
        if let Some(disk) = &self.disk {
            match disk.subjects() {
                Ok(subjects) => subjects.iter().for_each(|s| self.remove_from_disk(s)),
                Err(e) => warn!(error = %e, "Failed to list cached stats for clearing"),
            }
        }
    }

    /// Every known entry, memory and disk combined, ordered by subject
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut subjects: Vec<SubjectId> =
            self.lock_entries().iter().map(|(k, _)| k.clone()).collect();

        if let Some(disk) = &self.disk {
            match disk.subjects() {
                Ok(on_disk) => subjects.extend(on_disk),
                Err(e) => debug!(error = %e, "Failed to list cached stats on disk"),
            }
        }

        subjects.sort();
        subjects.dedup();
        subjects.iter().filter_map(|s| self.read(s)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_from_disk(&self, key: &SubjectId) {
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove(key) {
                debug!(subject = %key, error = %e, "Failed to remove cached stats file");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    fn store_at(clock: &Arc<ManualClock>, max_entries: usize) -> CacheStore {
        CacheStore::new(DEFAULT_TTL, max_entries, clock.clone())
    }

    fn model(total: f64) -> ViewModel {
        let mut vm = ViewModel::default();
        vm.giving.total = total;
        vm
    }

    #[test]
    fn test_read_absent() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store_at(&clock, 8);
        assert!(store.read(&SubjectId::member("M1")).is_none());
        assert!(store.read_fresh(&SubjectId::member("M1")).is_none());
    }

    #[test]
    fn test_write_then_read_fresh() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = store_at(&clock, 8);
        let key = SubjectId::member("M1");

        let written = store.write(&key, model(10.0));
        assert_eq!(written.written_at, 1_000);

        clock.advance(120_000);
        let entry = store.read_fresh(&key).unwrap();
        assert_eq!(entry.data.giving.total, 10.0);
    }

    #[test]
    fn test_entry_at_ttl_is_stale() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store_at(&clock, 8);
        let key = SubjectId::member("M1");
        store.write(&key, model(1.0));

        clock.set(299_999);
        assert!(store.read_fresh(&key).is_some());

        clock.set(300_000);
        assert!(store.read_fresh(&key).is_none());
        // Stale entries stay readable for display
        assert!(store.read(&key).is_some());
    }

    #[test]
    fn test_last_write_wins() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store_at(&clock, 8);
        let key = SubjectId::Organization;
        store.write(&key, model(1.0));
        clock.advance(5);
        store.write(&key, model(2.0));

        let entry = store.read(&key).unwrap();
        assert_eq!(entry.data.giving.total, 2.0);
        assert_eq!(entry.written_at, 5);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store_at(&clock, 2);
        store.write(&SubjectId::member("a"), model(1.0));
        store.write(&SubjectId::member("b"), model(2.0));
        // Touch "a" so "b" becomes least recently used
        store.read(&SubjectId::member("a"));
        store.write(&SubjectId::member("c"), model(3.0));

        assert_eq!(store.len(), 2);
        assert!(store.read(&SubjectId::member("a")).is_some());
        assert!(store.read(&SubjectId::member("b")).is_none());
        assert!(store.read(&SubjectId::member("c")).is_some());
    }

    #[test]
    fn test_disk_backfills_memory() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(50));
        let key = SubjectId::user("u1");

        {
            let store = store_at(&clock, 8).with_disk(DiskStore::new(dir.path().to_path_buf()).unwrap());
            store.write(&key, model(7.0));
        }

        // A new session sees the persisted entry with its original timestamp
        let store = store_at(&clock, 8).with_disk(DiskStore::new(dir.path().to_path_buf()).unwrap());
        assert!(store.is_empty());
        let entry = store.read(&key).unwrap();
        assert_eq!(entry.data.giving.total, 7.0);
        assert_eq!(entry.written_at, 50);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_corrupt_disk_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("analytics_cache_member_M9.json"), "garbage").unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = store_at(&clock, 8).with_disk(DiskStore::new(dir.path().to_path_buf()).unwrap());

        assert!(store.read(&SubjectId::member("M9")).is_none());
    }

    #[test]
    fn test_eviction_removes_disk_file() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = store_at(&clock, 1).with_disk(DiskStore::new(dir.path().to_path_buf()).unwrap());
        store.write(&SubjectId::member("a"), model(1.0));
        store.write(&SubjectId::member("b"), model(2.0));

        assert!(!dir.path().join("analytics_cache_member_a.json").exists());
        assert!(dir.path().join("analytics_cache_member_b.json").exists());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = store_at(&clock, 8).with_disk(DiskStore::new(dir.path().to_path_buf()).unwrap());
        store.write(&SubjectId::member("a"), model(1.0));
        store.write(&SubjectId::member("b"), model(2.0));
        store.write(&SubjectId::Organization, model(3.0));

        store.invalidate(&SubjectId::member("a"));
        assert!(store.read(&SubjectId::member("a")).is_none());
        assert_eq!(store.entries().len(), 2);

        store.clear();
        assert!(store.entries().is_empty());
        assert!(store.read(&SubjectId::Organization).is_none());
    }

    #[test]
    fn test_age_display() {
        let entry = CacheEntry {
            key: SubjectId::Organization,
            data: ViewModel::default(),
            written_at: 0,
        };
        assert_eq!(entry.age_display(-5_000), "just now");
        assert_eq!(entry.age_display(30_000), "just now");
        assert_eq!(entry.age_display(5 * 60_000), "5m ago");
        assert_eq!(entry.age_display(90 * 60_000), "2h ago");
        assert_eq!(entry.age_display(80 * 60_000), "1h ago");
        assert_eq!(entry.age_display(36 * 60 * 60_000), "2d ago");
        assert_eq!(entry.age_display(25 * 60 * 60_000), "1d ago");
    }
}
