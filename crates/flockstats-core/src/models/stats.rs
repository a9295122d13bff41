use serde::{Deserialize, Serialize};

use super::upstream::ActivityRecord;

/// Maximum number of recent records kept per outreach summary
pub const RECENT_RECORDS_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct GivingStats {
    pub tithe: f64,
    pub offering: f64,
    #[serde(rename = "extraGivings")]
    pub extra_givings: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AttendanceStats {
    pub attended: u64,
    pub missed: u64,
    /// Percentage in `0.0..=100.0`
    pub rate: f64,
}

impl AttendanceStats {
    pub fn sessions(&self) -> u64 {
        self.attended + self.missed
    }
}

/// Count plus the most recent records of an outreach activity
/// (in-gathering or nurturing).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ActivitySummary {
    pub count: u64,
    #[serde(rename = "recentRecords", default)]
    pub recent_records: Vec<ActivityRecord>,
}

pub type InGatheringSummary = ActivitySummary;
pub type NurturingSummary = ActivitySummary;

/// Canonical statistics bundle for one subject. Every field is always
/// populated; a failed source leaves its zero value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ViewModel {
    #[serde(default)]
    pub giving: GivingStats,
    #[serde(default)]
    pub attendance: AttendanceStats,
    #[serde(rename = "inGathering", default)]
    pub in_gathering: InGatheringSummary,
    #[serde(default)]
    pub nurturing: NurturingSummary,
}
