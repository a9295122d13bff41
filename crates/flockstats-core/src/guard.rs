//! Per-subject in-flight marks.
//!
//! A non-forced fetch only starts when no other batch for the same subject
//! is in flight. Forced refreshes (manual or periodic) always mark and start,
//! so a mark left behind by a batch that never finished cannot stall them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::models::SubjectId;

#[derive(Debug, Default)]
pub struct FetchGuard {
    marks: Mutex<HashMap<SubjectId, bool>>,
}

impl FetchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_marks(&self) -> MutexGuard<'_, HashMap<SubjectId, bool>> {
        self.marks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `key` in flight unless it already is. Returns whether the caller
    /// now owns the batch.
    pub fn try_begin(&self, key: &SubjectId) -> bool {
        let mut marks = self.lock_marks();
        if marks.get(key).copied().unwrap_or(false) {
            debug!(subject = %key, "Fetch already in flight, not starting another");
            return false;
        }
        marks.insert(key.clone(), true);
        true
    }

    /// Mark `key` in flight regardless of any existing mark.
    pub fn force_begin(&self, key: &SubjectId) {
        let previous = self.lock_marks().insert(key.clone(), true);
        if previous == Some(true) {
            debug!(subject = %key, "Forcing fetch past existing in-flight mark");
        }
    }

    /// Clear the mark for `key` unconditionally.
    pub fn end(&self, key: &SubjectId) {
        self.lock_marks().remove(key);
    }

    pub fn is_in_flight(&self, key: &SubjectId) -> bool {
        self.lock_marks().get(key).copied().unwrap_or(false)
    }

    /// `try_begin` returning a token that ends the mark when dropped
    pub fn try_enter(self: &Arc<Self>, key: &SubjectId) -> Option<InFlight> {
        if self.try_begin(key) {
            Some(InFlight::new(self, key))
        } else {
            None
        }
    }

    /// `force_begin` returning a token that ends the mark when dropped
    pub fn force_enter(self: &Arc<Self>, key: &SubjectId) -> InFlight {
        self.force_begin(key);
        InFlight::new(self, key)
    }
}

/// Holds a subject's in-flight mark for the duration of one batch. The mark
/// is cleared on drop, including when the batch panics.
#[must_use = "the in-flight mark is released as soon as this is dropped"]
pub struct InFlight {
    guard: Arc<FetchGuard>,
    key: SubjectId,
}

impl InFlight {
    fn new(guard: &Arc<FetchGuard>, key: &SubjectId) -> Self {
        Self {
            guard: Arc::clone(guard),
            key: key.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.guard.end(&self.key);
    }
}
