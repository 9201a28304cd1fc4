use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};

use crate::auth::Credential;
use crate::error::AppError;
use crate::models::{StudentRecord, TeacherRecord, ThresholdSettings, DEFAULT_SECTION};
use crate::scan::RecordDelta;

const SETTINGS_KEY: &str = "reward_punishment";

pub async fn init_db(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> Result<(), AppError> {
    let teacher_credential = crate::auth::hash_password("change-me");
    upsert_teacher(pool, "teacher@school.edu", &teacher_credential).await?;
    save_settings(pool, ThresholdSettings::default(), None).await?;

    let today = Utc::now().date_naive();
    let students = vec![
        ("avery.lee@school.edu", "Avery Lee", "ITM302", "48213"),
        ("jules.moreno@school.edu", "Jules Moreno", "ITM302", "17904"),
        ("kiara.patel@school.edu", "Kiara Patel", "ITM305", "65330"),
    ];

    for (email, name, section, student_id) in students {
        let credential = crate::auth::hash_password("student-pass");
        let record = StudentRecord {
            email: email.to_string(),
            name: name.to_string(),
            section: section.to_string(),
            tally: 0,
            class_dates: Vec::new(),
            created_at: today,
            student_id: student_id.to_string(),
        };
        sqlx::query(
            r#"
            INSERT INTO qr_attendance.students
            (email, name, section, tally, class_dates, created_at, student_id,
             password_salt, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(&record.email)
        .bind(&record.name)
        .bind(&record.section)
        .bind(record.tally)
        .bind(&record.class_dates)
        .bind(record.created_at)
        .bind(&record.student_id)
        .bind(&credential.salt)
        .bind(&credential.hash)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> StudentRecord {
    StudentRecord {
        email: row.get("email"),
        name: row.get("name"),
        section: row.get("section"),
        tally: row.get("tally"),
        class_dates: row.get("class_dates"),
        created_at: row.get("created_at"),
        student_id: row.get("student_id"),
    }
}

pub async fn fetch_student(pool: &PgPool, email: &str) -> Result<StudentRecord, AppError> {
    let row = sqlx::query(
        "SELECT email, name, section, tally, class_dates, created_at, student_id \
         FROM qr_attendance.students WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("student", email))?;

    Ok(student_from_row(&row))
}

pub async fn fetch_students(
    pool: &PgPool,
    section: Option<&str>,
) -> Result<Vec<StudentRecord>, AppError> {
    let mut query = String::from(
        "SELECT email, name, section, tally, class_dates, created_at, student_id \
         FROM qr_attendance.students",
    );
    if section.is_some() {
        query.push_str(" WHERE section = $1");
    }
    query.push_str(" ORDER BY name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = section {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(student_from_row).collect())
}

pub async fn existing_student_ids(pool: &PgPool) -> Result<HashSet<String>, AppError> {
    let rows = sqlx::query("SELECT student_id FROM qr_attendance.students")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("student_id")).collect())
}

pub async fn student_exists(pool: &PgPool, email: &str) -> Result<bool, AppError> {
    let row = sqlx::query("SELECT 1 AS one FROM qr_attendance.students WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn create_student(
    pool: &PgPool,
    record: &StudentRecord,
    credential: &Credential,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO qr_attendance.students
        (email, name, section, tally, class_dates, created_at, student_id,
         password_salt, password_hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&record.email)
    .bind(&record.name)
    .bind(&record.section)
    .bind(record.tally)
    .bind(&record.class_dates)
    .bind(record.created_at)
    .bind(&record.student_id)
    .bind(&credential.salt)
    .bind(&credential.hash)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist a validator delta: the array add/remove and the tally land in one
/// statement so a scan never half-applies.
pub async fn apply_delta(pool: &PgPool, email: &str, delta: &RecordDelta) -> Result<(), AppError> {
    let (query, timestamp, tally) = match delta {
        RecordDelta::MarkPresent {
            timestamp,
            new_tally,
        } => (
            "UPDATE qr_attendance.students \
             SET tally = $2, class_dates = array_append(class_dates, $3) \
             WHERE email = $1",
            timestamp,
            *new_tally,
        ),
        RecordDelta::RevokeScan {
            timestamp,
            new_tally,
        } => (
            "UPDATE qr_attendance.students \
             SET tally = $2, class_dates = array_remove(class_dates, $3) \
             WHERE email = $1",
            timestamp,
            *new_tally,
        ),
    };

    let result = sqlx::query(query)
        .bind(email)
        .bind(tally)
        .bind(timestamp)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("student", email));
    }
    Ok(())
}

pub async fn update_section(pool: &PgPool, email: &str, section: &str) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE qr_attendance.students SET section = $2 WHERE email = $1")
        .bind(email)
        .bind(section)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("student", email));
    }
    Ok(())
}

pub async fn unassign_section(pool: &PgPool, email: &str) -> Result<(), AppError> {
    update_section(pool, email, DEFAULT_SECTION).await
}

pub async fn reset_tally(pool: &PgPool, email: &str) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE qr_attendance.students SET tally = 0 WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("student", email));
    }
    Ok(())
}

pub async fn delete_student(pool: &PgPool, email: &str) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM qr_attendance.students WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("student", email));
    }
    Ok(())
}

/// Outcome of a batch mutation, item by item, so callers can tell partial
/// from total failure.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn record(&mut self, key: &str, result: Result<(), AppError>) {
        match result {
            Ok(()) => self.succeeded.push(key.to_string()),
            Err(error) => {
                log::warn!("batch item {key} failed: {error}");
                self.failed.push((key.to_string(), error.to_string()));
            }
        }
    }
}

pub async fn reset_all_tallies(
    pool: &PgPool,
    section: Option<&str>,
) -> Result<BatchReport, AppError> {
    let students = fetch_students(pool, section).await?;
    let mut report = BatchReport::default();
    for student in &students {
        let result = reset_tally(pool, &student.email).await;
        report.record(&student.email, result);
    }
    Ok(report)
}

pub async fn delete_all_students(pool: &PgPool) -> Result<BatchReport, AppError> {
    let students = fetch_students(pool, None).await?;
    let mut report = BatchReport::default();
    for student in &students {
        let result = delete_student(pool, &student.email).await;
        report.record(&student.email, result);
    }
    Ok(report)
}

pub async fn fetch_teacher(pool: &PgPool, email: &str) -> Result<TeacherRecord, AppError> {
    let row = sqlx::query(
        "SELECT email, password_salt, password_hash \
         FROM qr_attendance.teachers WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("teacher", email))?;

    Ok(TeacherRecord {
        email: row.get("email"),
        password_salt: row.get("password_salt"),
        password_hash: row.get("password_hash"),
    })
}

pub async fn upsert_teacher(
    pool: &PgPool,
    email: &str,
    credential: &Credential,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO qr_attendance.teachers (email, password_salt, password_hash)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
        SET password_salt = EXCLUDED.password_salt,
            password_hash = EXCLUDED.password_hash
        "#,
    )
    .bind(email)
    .bind(&credential.salt)
    .bind(&credential.hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_settings(
    pool: &PgPool,
) -> Result<(ThresholdSettings, Option<DateTime<Utc>>), AppError> {
    let row = sqlx::query(
        "SELECT warning_threshold, community_service_threshold, deadline \
         FROM qr_attendance.settings WHERE id = $1",
    )
    .bind(SETTINGS_KEY)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok((
            ThresholdSettings {
                warning: row.get("warning_threshold"),
                community_service: row.get("community_service_threshold"),
            },
            row.get("deadline"),
        )),
        None => Ok((ThresholdSettings::default(), None)),
    }
}

pub async fn save_settings(
    pool: &PgPool,
    thresholds: ThresholdSettings,
    deadline: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO qr_attendance.settings
        (id, warning_threshold, community_service_threshold, deadline)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET warning_threshold = EXCLUDED.warning_threshold,
            community_service_threshold = EXCLUDED.community_service_threshold,
            deadline = EXCLUDED.deadline
        "#,
    )
    .bind(SETTINGS_KEY)
    .bind(thresholds.warning)
    .bind(thresholds.community_service)
    .bind(deadline)
    .execute(pool)
    .await?;
    Ok(())
}

pub fn today_naive() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_report_separates_partial_from_total_failure() {
        let mut report = BatchReport::default();
        report.record("avery.lee@school.edu", Ok(()));
        report.record(
            "jules.moreno@school.edu",
            Err(AppError::not_found("student", "jules.moreno@school.edu")),
        );

        assert_eq!(report.succeeded, vec!["avery.lee@school.edu".to_string()]);
        assert_eq!(report.failed.len(), 1);
        let (key, reason) = &report.failed[0];
        assert_eq!(key, "jules.moreno@school.edu");
        assert!(reason.contains("not found"));
    }

    #[test]
    fn batch_report_with_no_failures_names_every_key() {
        let mut report = BatchReport::default();
        report.record("a@school.edu", Ok(()));
        report.record("b@school.edu", Ok(()));
        assert_eq!(report.succeeded.len(), 2);
        assert!(report.failed.is_empty());
    }
}
