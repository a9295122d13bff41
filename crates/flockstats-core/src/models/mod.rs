//! Data models for the analytics layer.
//!
//! - `SubjectId`: the user, member or whole organization being summarized
//! - Upstream response shapes: `GivingResponse`, `AttendanceResponse`,
//!   `ActivityPayload` (bare array or paged history)
//! - The canonical `ViewModel` and its sub-records

pub mod stats;
pub mod subject;
pub mod upstream;

pub use stats::{
    ActivitySummary, AttendanceStats, GivingStats, InGatheringSummary, NurturingSummary,
    ViewModel, RECENT_RECORDS_LIMIT,
};
pub use subject::SubjectId;
pub use upstream::{
    ActivityPayload, ActivityRecord, AttendanceResponse, DonationKind, DonationRecord,
    GivingResponse, GivingTotals,
};
