use std::cmp::Ordering;
use std::fmt::Write as _;
use std::io;

use chrono::{DateTime, Utc};

use crate::models::{escalation, Escalation, StudentRecord, ThresholdSettings};

/// Compare two stored scan timestamps as instants. Scans may carry any
/// RFC 3339 offset, so plain string order is not chronological; unparseable
/// entries fall back to string order.
fn compare_scan_instants(a: &str, b: &str) -> Ordering {
    match (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn latest_scan(class_dates: &[String]) -> Option<&String> {
    class_dates
        .iter()
        .max_by(|a, b| compare_scan_instants(a, b))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EscalationSummary {
    pub ok: usize,
    pub warning: usize,
    pub community_service: usize,
}

pub fn summarize_escalations(
    students: &[StudentRecord],
    settings: &ThresholdSettings,
) -> EscalationSummary {
    let mut summary = EscalationSummary::default();
    for student in students {
        match escalation(student.tally, settings) {
            Escalation::None => summary.ok += 1,
            Escalation::Warning => summary.warning += 1,
            Escalation::CommunityService => summary.community_service += 1,
        }
    }
    summary
}

pub fn build_report(
    section: Option<&str>,
    students: &[StudentRecord],
    settings: &ThresholdSettings,
    deadline: Option<DateTime<Utc>>,
) -> String {
    let summary = summarize_escalations(students, settings);
    let section_label = section.unwrap_or("all sections");

    let mut output = String::new();
    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} students)",
        section_label,
        students.len()
    );
    if let Some(deadline) = deadline {
        let _ = writeln!(output, "Deadline: {}", deadline.format("%Y-%m-%d"));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Threshold Standing");
    let _ = writeln!(
        output,
        "- below warning ({}): {}",
        settings.warning, summary.ok
    );
    let _ = writeln!(
        output,
        "- at warning ({}): {}",
        settings.warning, summary.warning
    );
    let _ = writeln!(
        output,
        "- at community service ({}): {}",
        settings.community_service, summary.community_service
    );

    let mut by_tally = students.to_vec();
    by_tally.sort_by(|a, b| b.tally.cmp(&a.tally).then(a.name.cmp(&b.name)));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Tallies");
    if by_tally.is_empty() {
        let _ = writeln!(output, "No students on the roster.");
    } else {
        for student in by_tally.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) tally {} across {} scans",
                student.name,
                student.email,
                student.section,
                student.tally,
                student.class_dates.len()
            );
        }
    }

    let mut recent: Vec<(&StudentRecord, &String)> = students
        .iter()
        .filter_map(|s| latest_scan(&s.class_dates).map(|d| (s, d)))
        .collect();
    recent.sort_by(|a, b| compare_scan_instants(b.1, a.1));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Scans");
    if recent.is_empty() {
        let _ = writeln!(output, "No scans recorded.");
    } else {
        for (student, timestamp) in recent.iter().take(5) {
            let _ = writeln!(output, "- {} at {}", student.name, timestamp);
        }
    }

    output
}

/// Write the roster as CSV. One row per student; the attendance set is
/// flattened to a count plus the most recent scan.
pub fn write_csv<W: io::Write>(students: &[StudentRecord], writer: W) -> csv::Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "email",
        "name",
        "section",
        "student_id",
        "tally",
        "scan_count",
        "last_scan",
        "created_at",
    ])?;

    for student in students {
        let last_scan = latest_scan(&student.class_dates)
            .cloned()
            .unwrap_or_default();
        csv_writer.write_record([
            student.email.as_str(),
            student.name.as_str(),
            student.section.as_str(),
            student.student_id.as_str(),
            &student.tally.to_string(),
            &student.class_dates.len().to_string(),
            &last_scan,
            &student.created_at.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(students.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn student(name: &str, tally: i32, class_dates: &[&str]) -> StudentRecord {
        StudentRecord {
            email: format!("{}@school.edu", name.to_lowercase()),
            name: name.to_string(),
            section: "ITM302".to_string(),
            tally,
            class_dates: class_dates.iter().map(|d| d.to_string()).collect(),
            created_at: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            student_id: "48213".to_string(),
        }
    }

    #[test]
    fn summary_buckets_students_by_threshold() {
        let settings = ThresholdSettings::default();
        let students = vec![
            student("Avery", 0, &[]),
            student("Jules", 3, &[]),
            student("Kiara", 6, &[]),
        ];
        let summary = summarize_escalations(&students, &settings);
        assert_eq!(
            summary,
            EscalationSummary {
                ok: 1,
                warning: 1,
                community_service: 1,
            }
        );
    }

    #[test]
    fn report_lists_highest_tallies_first() {
        let settings = ThresholdSettings::default();
        let students = vec![
            student("Avery", 1, &["2024-05-01T08:00:00Z"]),
            student("Jules", 4, &["2024-05-02T08:00:00Z"]),
        ];
        let report = build_report(Some("ITM302"), &students, &settings, None);
        assert!(report.contains("Generated for ITM302 (2 students)"));
        let jules = report.find("Jules").unwrap();
        let avery = report.find("Avery").unwrap();
        assert!(jules < avery);
    }

    #[test]
    fn empty_roster_still_renders() {
        let settings = ThresholdSettings::default();
        let report = build_report(None, &[], &settings, None);
        assert!(report.contains("No students on the roster."));
        assert!(report.contains("No scans recorded."));
    }

    #[test]
    fn latest_scan_compares_instants_not_strings() {
        // 23:00+08:00 is 15:00Z; string order would wrongly pick it over
        // the later 16:00Z scan.
        let dates = vec![
            "2024-05-01T23:00:00+08:00".to_string(),
            "2024-05-01T16:00:00Z".to_string(),
        ];
        assert_eq!(latest_scan(&dates), Some(&"2024-05-01T16:00:00Z".to_string()));
    }

    #[test]
    fn recent_scans_order_mixed_offsets_chronologically() {
        let settings = ThresholdSettings::default();
        let students = vec![
            student("Avery", 1, &["2024-05-01T23:00:00+08:00"]),
            student("Jules", 1, &["2024-05-01T16:00:00Z"]),
        ];
        let report = build_report(None, &students, &settings, None);
        let recent = report.find("## Recent Scans").unwrap();
        let jules = report[recent..].find("Jules").unwrap();
        let avery = report[recent..].find("Avery").unwrap();
        assert!(jules < avery);
    }

    #[test]
    fn csv_export_writes_one_row_per_student() {
        let students = vec![
            student("Avery", 1, &["2024-05-01T08:00:00Z", "2024-05-02T08:00:00Z"]),
            student("Jules", 0, &[]),
        ];
        let mut buffer = Vec::new();
        let written = write_csv(&students, &mut buffer).unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("2024-05-02T08:00:00Z"));
        assert!(lines[1].contains(",2,"));
    }
}
