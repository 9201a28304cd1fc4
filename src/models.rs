use chrono::NaiveDate;
use serde::Serialize;

/// Fallback section every student belongs to until a teacher files them
/// somewhere else, and the section they return to when removed from one.
pub const DEFAULT_SECTION: &str = "ITM302";

/// One student record, keyed by enrollment email.
#[derive(Debug, Clone, Serialize)]
pub struct StudentRecord {
    pub email: String,
    pub name: String,
    pub section: String,
    pub tally: i32,
    /// RFC 3339 instants, one per successful scan. A calendar date appears
    /// at most once under normal operation; duplicate detection matches on
    /// the `YYYY-MM-DD` prefix.
    pub class_dates: Vec<String>,
    pub created_at: NaiveDate,
    /// 5-digit numeric string, unique across all records.
    pub student_id: String,
}

#[derive(Debug, Clone)]
pub struct TeacherRecord {
    pub email: String,
    pub password_salt: String,
    pub password_hash: String,
}

/// Reward/punishment thresholds, stored as a singleton settings row.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ThresholdSettings {
    pub warning: i32,
    pub community_service: i32,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            warning: 3,
            community_service: 5,
        }
    }
}

/// Where a tally stands against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    None,
    Warning,
    CommunityService,
}

pub fn escalation(tally: i32, settings: &ThresholdSettings) -> Escalation {
    if tally >= settings.community_service {
        Escalation::CommunityService
    } else if tally >= settings.warning {
        Escalation::Warning
    } else {
        Escalation::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_follows_thresholds() {
        let settings = ThresholdSettings::default();
        assert_eq!(escalation(0, &settings), Escalation::None);
        assert_eq!(escalation(2, &settings), Escalation::None);
        assert_eq!(escalation(3, &settings), Escalation::Warning);
        assert_eq!(escalation(4, &settings), Escalation::Warning);
        assert_eq!(escalation(5, &settings), Escalation::CommunityService);
        assert_eq!(escalation(9, &settings), Escalation::CommunityService);
    }
}
