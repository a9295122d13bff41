//! Conversion of raw source responses into the canonical `ViewModel`.
//!
//! Everything here is pure: identical `RawResponses` always produce an
//! identical `ViewModel`, and a failed slot contributes its zero value.

use crate::coordinator::{RawResponses, SlotResult};
use crate::models::{
    ActivityPayload, ActivitySummary, AttendanceResponse, AttendanceStats, DonationKind,
    GivingResponse, GivingStats, ViewModel, RECENT_RECORDS_LIMIT,
};

/// Build the view model for one settled batch.
pub fn normalize(raw: &RawResponses) -> ViewModel {
    ViewModel {
        giving: slot(&raw.giving, normalize_giving),
        attendance: slot(&raw.attendance, normalize_attendance),
        in_gathering: slot(&raw.in_gathering, normalize_activity),
        nurturing: slot(&raw.nurturing, normalize_activity),
    }
}

fn slot<T, R: Default>(result: &SlotResult<T>, f: impl Fn(&T) -> R) -> R {
    match result {
        Ok(payload) => f(payload),
        Err(_) => R::default(),
    }
}

/// Prefer server-reported totals; derive them from completed history
/// when the backend only sends raw records.
pub fn normalize_giving(response: &GivingResponse) -> GivingStats {
    if let Some(ref totals) = response.stats {
        let tithe = totals.total_tithe.unwrap_or(0.0);
        let offering = totals.total_offering.unwrap_or(0.0);
        let extra_givings = totals.total_extra_givings.unwrap_or(0.0);
        return GivingStats {
            tithe,
            offering,
            extra_givings,
            total: totals
                .total_giving
                .unwrap_or(tithe + offering + extra_givings),
        };
    }

    let mut stats = GivingStats::default();
    for record in response.history.iter().filter(|r| r.is_completed()) {
        match record.kind() {
            DonationKind::Tithe => stats.tithe += record.amount,
            DonationKind::Offering => stats.offering += record.amount,
            DonationKind::Extra => stats.extra_givings += record.amount,
        }
    }
    stats.total = stats.tithe + stats.offering + stats.extra_givings;
    stats
}

pub fn normalize_attendance(response: &AttendanceResponse) -> AttendanceStats {
    let sessions = response.attended + response.missed;
    let rate = if sessions == 0 {
        0.0
    } else {
        response.attended as f64 / sessions as f64 * 100.0
    };
    AttendanceStats {
        attended: response.attended,
        missed: response.missed,
        rate,
    }
}

/// Records arrive most-recent first; only the head is kept.
pub fn normalize_activity(payload: &ActivityPayload) -> ActivitySummary {
    let (records, count) = match payload {
        ActivityPayload::Array(records) => (records, records.len() as u64),
        ActivityPayload::Paged { history, total } => {
            (history, total.unwrap_or(history.len() as u64))
        }
    };
    ActivitySummary {
        count,
        recent_records: records.iter().take(RECENT_RECORDS_LIMIT).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::models::{ActivityRecord, DonationRecord, GivingTotals};

    fn donation(amount: f64, status: &str, kind: &str) -> DonationRecord {
        DonationRecord {
            amount,
            status: Some(status.to_string()),
            donation_type: Some(kind.to_string()),
            date: None,
        }
    }

    fn records(n: usize) -> Vec<ActivityRecord> {
        (0..n)
            .map(|i| ActivityRecord {
                id: Some(format!("r{}", i)),
                ..ActivityRecord::default()
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Giving
    // -------------------------------------------------------------------------

    #[test]
    fn test_giving_derived_from_history() {
        // Member with a single completed tithe and no server totals
        let response = GivingResponse {
            history: vec![donation(100.0, "Completed", "Tithe")],
            stats: None,
        };
        assert_eq!(
            normalize_giving(&response),
            GivingStats { tithe: 100.0, offering: 0.0, extra_givings: 0.0, total: 100.0 }
        );
    }

    #[test]
    fn test_giving_ignores_incomplete_donations() {
        let response = GivingResponse {
            history: vec![
                donation(50.0, "completed", "Offering"),
                donation(20.0, "Pending", "Tithe"),
                donation(30.0, "Failed", "Offering"),
                donation(15.0, "COMPLETED", "Building Fund"),
            ],
            stats: None,
        };
        let stats = normalize_giving(&response);
        assert_eq!(stats.tithe, 0.0);
        assert_eq!(stats.offering, 50.0);
        assert_eq!(stats.extra_givings, 15.0);
        assert_eq!(stats.total, 65.0);
    }

    #[test]
    fn test_giving_prefers_server_totals() {
        let response = GivingResponse {
            history: vec![donation(100.0, "Completed", "Tithe")],
            stats: Some(GivingTotals {
                total_tithe: Some(400.0),
                total_offering: Some(60.0),
                total_extra_givings: Some(40.0),
                total_giving: Some(500.0),
            }),
        };
        assert_eq!(
            normalize_giving(&response),
            GivingStats { tithe: 400.0, offering: 60.0, extra_givings: 40.0, total: 500.0 }
        );
    }

    #[test]
    fn test_giving_server_totals_without_grand_total() {
        let response = GivingResponse {
            history: vec![],
            stats: Some(GivingTotals {
                total_tithe: Some(10.0),
                total_offering: None,
                total_extra_givings: Some(5.0),
                total_giving: None,
            }),
        };
        assert_eq!(normalize_giving(&response).total, 15.0);
    }

    // -------------------------------------------------------------------------
    // Attendance
    // -------------------------------------------------------------------------

    #[test]
    fn test_attendance_rate() {
        let stats = normalize_attendance(&AttendanceResponse { attended: 3, missed: 1, attendance_rate: None });
        assert_eq!(stats.rate, 75.0);
        assert_eq!(stats.sessions(), 4);
    }

    #[test]
    fn test_attendance_rate_no_sessions() {
        let stats = normalize_attendance(&AttendanceResponse::default());
        assert_eq!(stats.rate, 0.0);
    }

    #[test]
    fn test_attendance_rate_computed_not_copied() {
        let stats = normalize_attendance(&AttendanceResponse { attended: 1, missed: 1, attendance_rate: Some(99.0) });
        assert_eq!(stats.rate, 50.0);
    }

    // -------------------------------------------------------------------------
    // In-gathering / Nurturing
    // -------------------------------------------------------------------------

    #[test]
    fn test_activity_bare_array_truncated() {
        let summary = normalize_activity(&ActivityPayload::Array(records(7)));
        assert_eq!(summary.count, 7);
        assert_eq!(summary.recent_records.len(), 5);
        assert_eq!(summary.recent_records[0].id.as_deref(), Some("r0"));
        assert_eq!(summary.recent_records[4].id.as_deref(), Some("r4"));
    }

    #[test]
    fn test_activity_paged_prefers_total() {
        let summary = normalize_activity(&ActivityPayload::Paged { history: records(3), total: Some(42) });
        assert_eq!(summary.count, 42);
        assert_eq!(summary.recent_records.len(), 3);
    }

    #[test]
    fn test_activity_paged_without_total() {
        let summary = normalize_activity(&ActivityPayload::Paged { history: records(6), total: None });
        assert_eq!(summary.count, 6);
        assert_eq!(summary.recent_records.len(), 5);
    }

    // -------------------------------------------------------------------------
    // Whole batch
    // -------------------------------------------------------------------------

    #[test]
    fn test_failed_slot_yields_zero_value() {
        let mut raw = RawResponses::empty();
        raw.giving = Ok(GivingResponse {
            history: vec![donation(10.0, "Completed", "Offering")],
            stats: None,
        });
        raw.attendance = Ok(AttendanceResponse { attended: 2, missed: 2, attendance_rate: None });
        raw.in_gathering = Ok(ActivityPayload::Array(records(2)));
        raw.nurturing = Err(ApiError::ServerError("boom".into()));

        let vm = normalize(&raw);
        assert_eq!(vm.nurturing, ActivitySummary::default());
        assert_eq!(vm.giving.offering, 10.0);
        assert_eq!(vm.attendance.rate, 50.0);
        assert_eq!(vm.in_gathering.count, 2);
    }

    #[test]
    fn test_single_failure_matches_empty_success() {
        // Each sibling equals what it would be had the failed source answered
        // with an empty result; the failed one equals its zero value.
        let build = |nurturing| RawResponses {
            giving: Ok(GivingResponse { history: vec![donation(5.0, "Completed", "Tithe")], stats: None }),
            attendance: Ok(AttendanceResponse { attended: 1, missed: 0, attendance_rate: None }),
            in_gathering: Ok(ActivityPayload::Array(records(1))),
            nurturing,
        };
        let failed = normalize(&build(Err(ApiError::RateLimited)));
        let empty = normalize(&build(Ok(ActivityPayload::default())));
        assert_eq!(failed, empty);
        assert_eq!(failed.nurturing, ActivitySummary::default());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let mut raw = RawResponses::empty();
        raw.giving = Ok(GivingResponse {
            history: vec![
                donation(0.1, "Completed", "Tithe"),
                donation(0.2, "Completed", "Tithe"),
                donation(7.5, "Completed", "Missions"),
            ],
            stats: None,
        });
        raw.in_gathering = Ok(ActivityPayload::Paged { history: records(9), total: None });

        let first = normalize(&raw);
        let second = normalize(&raw);
        assert_eq!(first, second);
        assert_eq!(first.giving.tithe.to_bits(), second.giving.tithe.to_bits());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
