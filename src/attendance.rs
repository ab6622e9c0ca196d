use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::grading::round_half_up;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Permitted,
    Sick,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Permitted => "permitted",
            AttendanceStatus::Sick => "sick",
            AttendanceStatus::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "permitted" => Some(AttendanceStatus::Permitted),
            "sick" => Some(AttendanceStatus::Sick),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub schedule_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub permitted: usize,
    pub sick: usize,
    pub absent: usize,
    pub present_pct: f64,
}

impl AttendanceSummary {
    pub fn is_below(&self, threshold_pct: f64) -> bool {
        self.total > 0 && self.present_pct < threshold_pct
    }
}

/// Tallies an already-filtered record set. Only `Present` counts toward the
/// percentage; an empty set yields 0% rather than dividing by zero.
pub fn summarize<'a, I>(records: I) -> AttendanceSummary
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut out = AttendanceSummary::default();
    for r in records {
        out.total += 1;
        match r.status {
            AttendanceStatus::Present => out.present += 1,
            AttendanceStatus::Permitted => out.permitted += 1,
            AttendanceStatus::Sick => out.sick += 1,
            AttendanceStatus::Absent => out.absent += 1,
        }
    }
    out.present_pct = if out.total > 0 {
        round_half_up(out.present as f64 / out.total as f64 * 100.0, 2)
    } else {
        0.0
    };
    out
}

/// Partitions `records` by `key` and summarizes each partition on its own.
pub fn summarize_groups<K, F>(records: &[AttendanceRecord], key: F) -> BTreeMap<K, AttendanceSummary>
where
    K: Ord,
    F: Fn(&AttendanceRecord) -> K,
{
    let mut groups: BTreeMap<K, Vec<&AttendanceRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(key(r)).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|(k, rows)| (k, summarize(rows)))
        .collect()
}
