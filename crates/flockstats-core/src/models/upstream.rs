// Allow dead code: API response structs have fields for completeness
#![allow(dead_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ===== Giving =====

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GivingResponse {
    #[serde(default)]
    pub history: Vec<DonationRecord>,
    #[serde(default)]
    pub stats: Option<GivingTotals>,
}

/// Server-reported aggregate totals. Some backends omit this entirely.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GivingTotals {
    #[serde(rename = "totalTithe", default)]
    pub total_tithe: Option<f64>,
    #[serde(rename = "totalOffering", default)]
    pub total_offering: Option<f64>,
    #[serde(rename = "totalExtraGivings", default)]
    pub total_extra_givings: Option<f64>,
    #[serde(rename = "totalGiving", default)]
    pub total_giving: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DonationRecord {
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "donationType", default)]
    pub donation_type: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl DonationRecord {
    pub fn is_completed(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case("completed"))
            .unwrap_or(false)
    }

    pub fn kind(&self) -> DonationKind {
        DonationKind::from_str(self.donation_type.as_deref())
    }
}

/// Donation bucket used when totals have to be derived from history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationKind {
    Tithe,
    Offering,
    /// Everything else: building fund, missions, special appeals...
    Extra,
}

impl DonationKind {
    pub fn from_str(s: Option<&str>) -> Self {
        match s.map(|t| t.trim().to_lowercase()) {
            Some(t) if t == "tithe" || t == "tithes" => DonationKind::Tithe,
            Some(t) if t == "offering" || t == "offerings" => DonationKind::Offering,
            _ => DonationKind::Extra,
        }
    }
}

// ===== Attendance =====

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AttendanceResponse {
    #[serde(default)]
    pub attended: u64,
    #[serde(default)]
    pub missed: u64,
    #[serde(rename = "attendanceRate", default)]
    pub attendance_rate: Option<f64>,
}

// ===== In-gathering / Nurturing =====

/// Outreach record as returned by the in-gathering and nurturing endpoints.
/// Only the fields the dashboards show are typed; the rest is kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ActivityRecord {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub date: Option<String>,
    #[serde(default, alias = "fullName")]
    pub name: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// The two shapes the outreach endpoints answer with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ActivityPayload {
    /// A bare sequence of records
    Array(Vec<ActivityRecord>),
    /// A page of history with a separately reported total
    Paged {
        #[serde(default)]
        history: Vec<ActivityRecord>,
        #[serde(default)]
        total: Option<u64>,
    },
}

impl Default for ActivityPayload {
    fn default() -> Self {
        ActivityPayload::Array(Vec::new())
    }
}
