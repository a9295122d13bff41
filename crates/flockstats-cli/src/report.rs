//! Plain-text rendering of stats snapshots and cache listings.

use std::fmt::Write;

use flockstats_core::cache::CacheEntry;
use flockstats_core::models::ActivitySummary;
use flockstats_core::utils::{format_count, format_date, format_money, format_percent, truncate_string};
use flockstats_core::{StatsSnapshot, StatsStatus};

/// Width of record names in the recent-activity lists
const RECORD_NAME_WIDTH: usize = 40;

/// One-line state indicator for a snapshot
pub fn status_line(snapshot: &StatsSnapshot) -> String {
    let state = if snapshot.is_initial_load {
        "loading...".to_string()
    } else if snapshot.is_refreshing {
        "refreshing...".to_string()
    } else {
        match &snapshot.status {
            StatsStatus::Ready if snapshot.has_data() => "up to date".to_string(),
            StatsStatus::Ready => "no data".to_string(),
            StatsStatus::AuthRequired => "sign in required".to_string(),
            StatsStatus::Failed(msg) => format!("error: {}", msg),
        }
    };
    format!("[{}] {}", snapshot.subject, state)
}

/// Full report for a snapshot
pub fn render(snapshot: &StatsSnapshot) -> String {
    let data = &snapshot.data;
    let mut out = String::new();

    let _ = writeln!(out, "{}", status_line(snapshot));
    if !snapshot.has_data() {
        return out;
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Giving");
    let _ = writeln!(out, "  Tithe           {:>14}", format_money(data.giving.tithe));
    let _ = writeln!(out, "  Offering        {:>14}", format_money(data.giving.offering));
    let _ = writeln!(out, "  Extra givings   {:>14}", format_money(data.giving.extra_givings));
    let _ = writeln!(out, "  Total           {:>14}", format_money(data.giving.total));

    let _ = writeln!(out);
    let _ = writeln!(out, "Attendance");
    let _ = writeln!(
        out,
        "  {} of {} sessions ({})",
        format_count(data.attendance.attended),
        format_count(data.attendance.sessions()),
        format_percent(data.attendance.rate)
    );

    render_activity(&mut out, "In-gathering", &data.in_gathering);
    render_activity(&mut out, "Nurturing", &data.nurturing);
    out
}

fn render_activity(out: &mut String, title: &str, summary: &ActivitySummary) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{} ({})", title, format_count(summary.count));
    for record in &summary.recent_records {
        let name = record
            .name
            .as_deref()
            .or(record.id.as_deref())
            .unwrap_or("(unnamed)");
        let date = record.date.as_deref().map(format_date).unwrap_or_default();
        let _ = writeln!(
            out,
            "  {:<width$} {}",
            truncate_string(name, RECORD_NAME_WIDTH),
            date,
            width = RECORD_NAME_WIDTH
        );
    }
}

/// One line of `flockstats cache`
pub fn cache_line(entry: &CacheEntry, now_millis: i64, fresh: bool) -> String {
    format!(
        "{:<24} {:<10} {:<6} giving {}",
        entry.key.to_string(),
        entry.age_display(now_millis),
        if fresh { "fresh" } else { "stale" },
        format_money(entry.data.giving.total)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flockstats_core::models::{ActivityRecord, SubjectId, ViewModel};

    fn snapshot() -> StatsSnapshot {
        let mut data = ViewModel::default();
        data.giving.tithe = 1200.0;
        data.giving.total = 1200.0;
        data.attendance.attended = 2;
        data.attendance.missed = 1;
        data.attendance.rate = 200.0 / 3.0;
        data.nurturing.count = 12;
        data.nurturing.recent_records = vec![ActivityRecord {
            name: Some("Home visit".to_string()),
            date: Some("2025-03-04".to_string()),
            ..ActivityRecord::default()
        }];
        StatsSnapshot {
            subject: SubjectId::member("M1"),
            data,
            is_initial_load: false,
            is_refreshing: false,
            status: StatsStatus::Ready,
            updated_at: Some(0),
            revision: 1,
        }
    }

    #[test]
    fn test_render_report() {
        let text = render(&snapshot());
        assert!(text.starts_with("[member:M1] up to date"));
        assert!(text.contains("$1,200.00"));
        assert!(text.contains("2 of 3 sessions (66.7%)"));
        assert!(text.contains("Nurturing (12)"));
        assert!(text.contains("Home visit"));
        assert!(text.contains("Mar 04, 2025"));
    }

    #[test]
    fn test_status_line_states() {
        let mut s = snapshot();
        s.is_refreshing = true;
        assert_eq!(status_line(&s), "[member:M1] refreshing...");

        s.is_refreshing = false;
        s.status = StatsStatus::AuthRequired;
        assert_eq!(status_line(&s), "[member:M1] sign in required");

        s.status = StatsStatus::Failed("boom".to_string());
        assert_eq!(status_line(&s), "[member:M1] error: boom");
    }

    #[test]
    fn test_render_without_data_is_status_only() {
        let mut s = snapshot();
        s.updated_at = None;
        s.is_initial_load = true;
        assert_eq!(render(&s), "[member:M1] loading...\n");
    }
}
