use crate::model::{AttendanceRecord, OutcomeKind};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DAILY_REPORT_KEY: &str = "analytics/daily.json";
pub const WEEKLY_REPORT_KEY: &str = "analytics/weekly.json";

/// Days covered by the weekly count, today included.
const WEEK_DAYS: i64 = 7;

/// Matched attendance per identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub daily_counts: BTreeMap<String, u32>,
    pub weekly_counts: BTreeMap<String, u32>,
}

pub fn summarize(records: &[AttendanceRecord], now: DateTime<Utc>) -> AttendanceSummary {
    let today = now.date_naive();
    let week_start = today - Duration::days(WEEK_DAYS - 1);

    let mut summary = AttendanceSummary::default();
    for record in records
        .iter()
        .filter(|record| record.outcome_kind == OutcomeKind::Matched)
    {
        let day = record.observed_at.date_naive();
        if day > today || day < week_start {
            continue;
        }

        *summary
            .weekly_counts
            .entry(record.identity_id.clone())
            .or_default() += 1;
        if day == today {
            *summary
                .daily_counts
                .entry(record.identity_id.clone())
                .or_default() += 1;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(identity_id: &str, day: u32, kind: OutcomeKind) -> AttendanceRecord {
        AttendanceRecord {
            identity_id: identity_id.into(),
            observed_at: Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap(),
            dedup_key: format!("{identity_id}-{day}"),
            outcome_kind: kind,
            image_key: format!("{identity_id}/photo.jpg"),
            confidence: Some(99.0),
        }
    }

    #[test]
    fn counts_today_and_last_seven_days() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap();
        let records = vec![
            record("emp1", 10, OutcomeKind::Matched),
            record("emp1", 9, OutcomeKind::Matched),
            record("emp1", 4, OutcomeKind::Matched),
            record("emp1", 3, OutcomeKind::Matched), // outside the week
            record("emp2", 10, OutcomeKind::Matched),
            record("Unknown", 10, OutcomeKind::NoMatch),
            record("emp3", 10, OutcomeKind::Registered),
        ];

        let summary = summarize(&records, now);

        assert_eq!(
            summary.daily_counts,
            BTreeMap::from([("emp1".to_string(), 1), ("emp2".to_string(), 1)])
        );
        assert_eq!(
            summary.weekly_counts,
            BTreeMap::from([("emp1".to_string(), 3), ("emp2".to_string(), 1)])
        );
    }

    #[test]
    fn empty_ledger_gives_empty_summary() {
        let summary = summarize(&[], Utc::now());
        assert_eq!(summary, AttendanceSummary::default());
    }
}
