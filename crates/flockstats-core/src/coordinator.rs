//! Fan-out/fan-in of the upstream statistics sources.
//!
//! Every source for a subject is requested concurrently and the batch settles
//! only when all of them have answered, successfully or not. A failing source
//! never fails its siblings.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ApiError, StatsSource};
use crate::models::{ActivityPayload, AttendanceResponse, GivingResponse, SubjectId};

/// Outcome of one source request within a batch
pub type SlotResult<T> = Result<T, ApiError>;

/// Settled results of one fetch batch, one slot per source.
#[derive(Debug)]
pub struct RawResponses {
    pub giving: SlotResult<GivingResponse>,
    pub attendance: SlotResult<AttendanceResponse>,
    pub in_gathering: SlotResult<ActivityPayload>,
    pub nurturing: SlotResult<ActivityPayload>,
}

impl RawResponses {
    fn errors(&self) -> [Option<&ApiError>; 4] {
        [
            self.giving.as_ref().err(),
            self.attendance.as_ref().err(),
            self.in_gathering.as_ref().err(),
            self.nurturing.as_ref().err(),
        ]
    }

    /// Any source rejected the request for lack of authentication
    pub fn auth_failure(&self) -> bool {
        self.errors().iter().flatten().any(|e| e.is_auth())
    }

    /// No source answered successfully
    pub fn all_failed(&self) -> bool {
        self.errors().iter().all(|e| e.is_some())
    }

    pub fn failed_count(&self) -> usize {
        self.errors().iter().flatten().count()
    }
}

/// Issues the per-source requests for a subject.
#[derive(Clone)]
pub struct FetchCoordinator {
    source: Arc<dyn StatsSource>,
}

impl FetchCoordinator {
    pub fn new(source: Arc<dyn StatsSource>) -> Self {
        Self { source }
    }

    /// Fetch every source for `subject` concurrently and wait for all of them.
    pub async fn fetch_all(&self, subject: &SubjectId) -> RawResponses {
        info!(subject = %subject, "Fetching analytics sources");

        let (giving, attendance, in_gathering, nurturing) = tokio::join!(
            self.source.giving(subject),
            self.source.attendance(subject),
            self.source.in_gathering(subject),
            self.source.nurturing(subject),
        );

        let responses = RawResponses {
            giving: log_slot(subject, "Giving", giving),
            attendance: log_slot(subject, "Attendance", attendance),
            in_gathering: log_slot(subject, "InGathering", in_gathering),
            nurturing: log_slot(subject, "Nurturing", nurturing),
        };

        info!(
            subject = %subject,
            failed = responses.failed_count(),
            "Analytics sources settled"
        );
        responses
    }
}

/// Record the reason a slot failed; the slot result itself is passed through.
fn log_slot<T>(subject: &SubjectId, name: &str, result: SlotResult<T>) -> SlotResult<T> {
    match &result {
        Ok(_) => debug!(subject = %subject, "{} fetched successfully", name),
        Err(e) if e.is_auth() => warn!(subject = %subject, error = %e, "{} fetch needs authentication", name),
        Err(e) if e.is_transient() => debug!(subject = %subject, error = %e, "{} fetch failed, using default", name),
        Err(e) => warn!(subject = %subject, error = %e, "{} fetch rejected, using default", name),
    }
    result
}
