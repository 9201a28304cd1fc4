use chrono::{DateTime, Local};

use crate::models::StudentRecord;

/// Why a scan was turned away without touching the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Payload does not match the calendar date of the scan instant, so the
    /// code is stale or forged.
    InvalidCode,
    /// The scan instant itself could not be parsed.
    MalformedInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDecision {
    Accepted { tally: i32 },
    Warned { tally: i32 },
    Penalized { tally: i32 },
    Rejected(RejectReason),
}

/// Proposed mutation for the caller to persist. The validator itself never
/// performs I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDelta {
    /// Append `timestamp` to the attendance set and store `new_tally`.
    MarkPresent { timestamp: String, new_tally: i32 },
    /// Remove `timestamp` from the attendance set and store `new_tally`.
    RevokeScan { timestamp: String, new_tally: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub decision: ScanDecision,
    pub delta: Option<RecordDelta>,
    /// Updated in-session repeat counter. Volatile state: it lives only as
    /// long as one scanning session and is deliberately not persisted, so a
    /// fresh session restores the one-time grace for a duplicate scan.
    pub repeat_count: u32,
}

impl ScanOutcome {
    fn unchanged(decision: ScanDecision, repeat_count: u32) -> Self {
        Self {
            decision,
            delta: None,
            repeat_count,
        }
    }
}

/// Decide the outcome of one scan.
///
/// `payload` is the decoded QR text, expected to equal the calendar date of
/// `now` (an RFC 3339 instant). `repeat_count` is the session's running
/// count of duplicate attempts, threaded through explicitly so the function
/// stays pure:
///
/// 1. payload != date(now): rejected, no mutation.
/// 2. no timestamp for today yet: accepted, timestamp appended, tally +1.
/// 3. already scanned today, first repeat this session: warned, no mutation.
/// 4. already scanned today, second or later repeat: one matching timestamp
///    removed, tally -1, counter reset.
pub fn evaluate_scan(
    payload: &str,
    now: &str,
    record: &StudentRecord,
    repeat_count: u32,
) -> ScanOutcome {
    let Ok(instant) = DateTime::parse_from_rfc3339(now) else {
        return ScanOutcome::unchanged(
            ScanDecision::Rejected(RejectReason::MalformedInput),
            repeat_count,
        );
    };
    let today = instant.date_naive().format("%Y-%m-%d").to_string();

    if payload != today {
        return ScanOutcome::unchanged(
            ScanDecision::Rejected(RejectReason::InvalidCode),
            repeat_count,
        );
    }

    let scanned_today = record
        .class_dates
        .iter()
        .find(|date| date.starts_with(&today));

    match scanned_today {
        None => {
            let new_tally = record.tally + 1;
            ScanOutcome {
                decision: ScanDecision::Accepted { tally: new_tally },
                delta: Some(RecordDelta::MarkPresent {
                    timestamp: now.to_string(),
                    new_tally,
                }),
                repeat_count: 0,
            }
        }
        Some(_) if repeat_count == 0 => ScanOutcome::unchanged(
            ScanDecision::Warned {
                tally: record.tally,
            },
            1,
        ),
        Some(existing) => {
            let new_tally = record.tally - 1;
            ScanOutcome {
                decision: ScanDecision::Penalized { tally: new_tally },
                delta: Some(RecordDelta::RevokeScan {
                    timestamp: existing.clone(),
                    new_tally,
                }),
                repeat_count: 0,
            }
        }
    }
}

/// One scanning session. Owns the volatile repeat counter so callers feed
/// scans through without tracking it themselves.
#[derive(Debug, Default)]
pub struct ScanSession {
    repeat_count: u32,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, payload: &str, now: &str, record: &StudentRecord) -> ScanOutcome {
        let outcome = evaluate_scan(payload, now, record, self.repeat_count);
        self.repeat_count = outcome.repeat_count;
        outcome
    }
}

/// Today's QR payload: the plain local calendar date, `YYYY-MM-DD`.
pub fn today_payload() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_record(tally: i32, class_dates: &[&str]) -> StudentRecord {
        StudentRecord {
            email: "avery.lee@example.com".to_string(),
            name: "Avery Lee".to_string(),
            section: "ITM302".to_string(),
            tally,
            class_dates: class_dates.iter().map(|d| d.to_string()).collect(),
            created_at: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            student_id: "48213".to_string(),
        }
    }

    #[test]
    fn stale_payload_is_rejected_without_mutation() {
        let record = sample_record(2, &["2024-04-30T08:00:00Z"]);
        let outcome = evaluate_scan("2024-04-30", "2024-05-01T08:00:00Z", &record, 0);
        assert_eq!(
            outcome.decision,
            ScanDecision::Rejected(RejectReason::InvalidCode)
        );
        assert_eq!(outcome.delta, None);
        assert_eq!(outcome.repeat_count, 0);
    }

    #[test]
    fn malformed_instant_is_rejected_not_panicked() {
        let record = sample_record(0, &[]);
        let outcome = evaluate_scan("2024-05-01", "yesterday at noon", &record, 0);
        assert_eq!(
            outcome.decision,
            ScanDecision::Rejected(RejectReason::MalformedInput)
        );
        assert_eq!(outcome.delta, None);
    }

    #[test]
    fn first_scan_of_the_day_marks_present() {
        let record = sample_record(2, &["2024-04-30T08:00:00Z"]);
        let outcome = evaluate_scan("2024-05-01", "2024-05-01T08:00:00Z", &record, 0);
        assert_eq!(outcome.decision, ScanDecision::Accepted { tally: 3 });
        assert_eq!(
            outcome.delta,
            Some(RecordDelta::MarkPresent {
                timestamp: "2024-05-01T08:00:00Z".to_string(),
                new_tally: 3,
            })
        );
        assert_eq!(outcome.repeat_count, 0);
    }

    #[test]
    fn first_repeat_warns_without_mutation() {
        let record = sample_record(2, &["2024-05-01T08:00:00Z"]);
        let outcome = evaluate_scan("2024-05-01", "2024-05-01T08:05:00Z", &record, 0);
        assert_eq!(outcome.decision, ScanDecision::Warned { tally: 2 });
        assert_eq!(outcome.delta, None);
        assert_eq!(outcome.repeat_count, 1);
    }

    #[test]
    fn second_repeat_revokes_the_matching_timestamp() {
        let record = sample_record(2, &["2024-05-01T08:00:00Z"]);
        let outcome = evaluate_scan("2024-05-01", "2024-05-01T08:10:00Z", &record, 1);
        assert_eq!(outcome.decision, ScanDecision::Penalized { tally: 1 });
        assert_eq!(
            outcome.delta,
            Some(RecordDelta::RevokeScan {
                timestamp: "2024-05-01T08:00:00Z".to_string(),
                new_tally: 1,
            })
        );
        assert_eq!(outcome.repeat_count, 0);
    }

    #[test]
    fn revoke_targets_todays_timestamp_among_many() {
        let record = sample_record(
            3,
            &[
                "2024-04-29T08:00:00Z",
                "2024-05-01T08:00:00Z",
                "2024-04-30T08:00:00Z",
            ],
        );
        let outcome = evaluate_scan("2024-05-01", "2024-05-01T09:00:00Z", &record, 1);
        assert_eq!(
            outcome.delta,
            Some(RecordDelta::RevokeScan {
                timestamp: "2024-05-01T08:00:00Z".to_string(),
                new_tally: 2,
            })
        );
    }

    #[test]
    fn fresh_session_restores_the_duplicate_grace() {
        let record = sample_record(2, &["2024-05-01T08:00:00Z"]);

        let mut session = ScanSession::new();
        let first = session.scan("2024-05-01", "2024-05-01T08:05:00Z", &record);
        assert_eq!(first.decision, ScanDecision::Warned { tally: 2 });

        // Re-opening the scanner drops the counter, so the next duplicate
        // warns again instead of penalizing.
        let mut reopened = ScanSession::new();
        let again = reopened.scan("2024-05-01", "2024-05-01T08:20:00Z", &record);
        assert_eq!(again.decision, ScanDecision::Warned { tally: 2 });
    }

    #[test]
    fn session_walks_warn_then_penalize() {
        let record = sample_record(2, &["2024-05-01T08:00:00Z"]);
        let mut session = ScanSession::new();

        let warned = session.scan("2024-05-01", "2024-05-01T08:05:00Z", &record);
        assert_eq!(warned.decision, ScanDecision::Warned { tally: 2 });

        let penalized = session.scan("2024-05-01", "2024-05-01T08:10:00Z", &record);
        assert_eq!(penalized.decision, ScanDecision::Penalized { tally: 1 });
        assert_eq!(penalized.repeat_count, 0);
    }

    #[test]
    fn accepted_scan_resets_the_repeat_counter() {
        let record = sample_record(0, &[]);
        let outcome = evaluate_scan("2024-05-01", "2024-05-01T08:00:00Z", &record, 1);
        assert_eq!(outcome.decision, ScanDecision::Accepted { tally: 1 });
        assert_eq!(outcome.repeat_count, 0);
    }

    #[test]
    fn rejection_leaves_the_repeat_counter_alone() {
        let record = sample_record(1, &["2024-05-01T08:00:00Z"]);
        let outcome = evaluate_scan("2024-04-30", "2024-05-01T08:05:00Z", &record, 1);
        assert_eq!(
            outcome.decision,
            ScanDecision::Rejected(RejectReason::InvalidCode)
        );
        assert_eq!(outcome.repeat_count, 1);
    }
}
