use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod auth;
mod db;
mod error;
mod ids;
mod models;
mod report;
mod scan;

use models::{StudentRecord, DEFAULT_SECTION};
use scan::{RejectReason, ScanDecision, ScanSession};

#[derive(Parser)]
#[command(name = "qr-attendance")]
#[command(about = "QR attendance tracker: daily codes, scans, tallies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Store a teacher credential (salted digest)
    CreateTeacher {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create a student record with a fresh unique student id
    CreateStudent {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = DEFAULT_SECTION)]
        section: String,
    },
    /// Print today's QR payload (the plain local date)
    GenerateCode,
    /// Run one scanning session for a student; each --code is one attempt
    Scan {
        #[arg(long)]
        email: String,
        #[arg(long = "code", required = true)]
        codes: Vec<String>,
        /// Scan instant override (RFC 3339), for testing
        #[arg(long)]
        at: Option<String>,
    },
    /// List student records
    List {
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Move a student into a section
    AssignSection {
        #[arg(long)]
        email: String,
        #[arg(long)]
        section: String,
    },
    /// Return a student to the fallback section
    UnassignSection {
        #[arg(long)]
        email: String,
    },
    /// Reset tallies to zero (requires teacher re-authentication)
    #[command(group(
        ArgGroup::new("scope")
            .args(["email", "all"])
            .required(true)
            .multiple(false)
    ))]
    ResetTally {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        all: bool,
        /// With --all, limit the reset to one section
        #[arg(long)]
        section: Option<String>,
    },
    /// Delete student records (requires teacher re-authentication)
    #[command(group(
        ArgGroup::new("scope")
            .args(["email", "all"])
            .required(true)
            .multiple(false)
    ))]
    DeleteStudent {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Update the reward/punishment thresholds
    SetThresholds {
        #[arg(long)]
        warning: i32,
        #[arg(long)]
        community_service: i32,
        /// Calendar date (YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<NaiveDate>,
    },
    /// Generate a markdown attendance report
    Report {
        #[arg(long)]
        section: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the roster as CSV
    Export {
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::CreateTeacher { email, password } => {
            let credential = auth::hash_password(&password);
            db::upsert_teacher(&pool, &email, &credential).await?;
            println!("Teacher {email} stored.");
        }
        Commands::CreateStudent {
            email,
            password,
            name,
            section,
        } => {
            create_student(&pool, &email, &password, &name, &section).await?;
        }
        Commands::GenerateCode => {
            println!("{}", scan::today_payload());
        }
        Commands::Scan { email, codes, at } => {
            run_scan_session(&pool, &email, &codes, at.as_deref()).await?;
        }
        Commands::List { section, json } => {
            let students = db::fetch_students(&pool, section.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else if students.is_empty() {
                println!("No students found.");
            } else {
                for student in &students {
                    println!(
                        "{} <{}> id {} section {} tally {} created {}",
                        student.name,
                        student.email,
                        student.student_id,
                        student.section,
                        student.tally,
                        student.created_at
                    );
                }
            }
        }
        Commands::AssignSection { email, section } => {
            db::update_section(&pool, &email, &section).await?;
            println!("{email} moved to {section}.");
        }
        Commands::UnassignSection { email } => {
            db::unassign_section(&pool, &email).await?;
            println!("{email} returned to {DEFAULT_SECTION}.");
        }
        Commands::ResetTally {
            teacher,
            password,
            email,
            all,
            section,
        } => {
            reauthenticate(&pool, &teacher, &password).await?;
            if let Some(email) = email {
                db::reset_tally(&pool, &email).await?;
                println!("Tally reset for {email}.");
            } else if all {
                let batch = db::reset_all_tallies(&pool, section.as_deref()).await?;
                print_batch("Reset", &batch);
            }
        }
        Commands::DeleteStudent {
            teacher,
            password,
            email,
            all,
        } => {
            reauthenticate(&pool, &teacher, &password).await?;
            if let Some(email) = email {
                db::delete_student(&pool, &email).await?;
                println!("Deleted {email}.");
            } else if all {
                let batch = db::delete_all_students(&pool).await?;
                print_batch("Deleted", &batch);
            }
        }
        Commands::SetThresholds {
            warning,
            community_service,
            deadline,
        } => {
            let deadline =
                deadline.map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
            let thresholds = models::ThresholdSettings {
                warning,
                community_service,
            };
            db::save_settings(&pool, thresholds, deadline).await?;
            println!("Settings saved.");
        }
        Commands::Report { section, out } => {
            let students = db::fetch_students(&pool, section.as_deref()).await?;
            let (thresholds, deadline) = db::fetch_settings(&pool).await?;
            let report = report::build_report(section.as_deref(), &students, &thresholds, deadline);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let students = db::fetch_students(&pool, None).await?;
            let file = File::create(&out)?;
            let written = report::write_csv(&students, file)?;
            println!("Exported {written} students to {}.", out.display());
        }
    }

    Ok(())
}

async fn create_student(
    pool: &PgPool,
    email: &str,
    password: &str,
    name: &str,
    section: &str,
) -> anyhow::Result<()> {
    if db::student_exists(pool, email).await? {
        anyhow::bail!("student email already exists; assign them to a section instead");
    }

    let existing = db::existing_student_ids(pool).await?;
    let student_id = ids::generate_student_id(&existing, &mut rand::thread_rng())?;
    let record = StudentRecord {
        email: email.to_string(),
        name: name.to_string(),
        section: section.to_string(),
        tally: 0,
        class_dates: Vec::new(),
        created_at: db::today_naive(),
        student_id: student_id.clone(),
    };
    let credential = auth::hash_password(password);
    db::create_student(pool, &record, &credential).await?;
    println!("Student {name} created with id {student_id}.");
    Ok(())
}

/// One invocation is one scanning session: the duplicate-scan grace counter
/// lives here and nowhere else.
async fn run_scan_session(
    pool: &PgPool,
    email: &str,
    codes: &[String],
    at: Option<&str>,
) -> anyhow::Result<()> {
    let mut session = ScanSession::new();

    for code in codes {
        let record = db::fetch_student(pool, email).await?;
        let now = at
            .map(|s| s.to_string())
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let outcome = session.scan(code, &now, &record);
        log::debug!("scan {code} for {email}: {:?}", outcome.decision);

        if let Some(delta) = &outcome.delta {
            db::apply_delta(pool, email, delta).await?;
        }

        match outcome.decision {
            ScanDecision::Accepted { tally } => {
                println!("Scan successful. {} is present; tally is now {tally}.", record.name);
            }
            ScanDecision::Warned { tally } => {
                println!(
                    "Already scanned today. Scanning again will decrease the tally (currently {tally})."
                );
            }
            ScanDecision::Penalized { tally } => {
                println!("Duplicate scan: today's mark revoked; tally is now {tally}.");
            }
            ScanDecision::Rejected(RejectReason::InvalidCode) => {
                println!("Invalid QR code.");
            }
            ScanDecision::Rejected(RejectReason::MalformedInput) => {
                // Every later scan in the session would hit the same instant.
                return Err(error::AppError::MalformedInput(format!(
                    "scan instant {now} is not RFC 3339"
                ))
                .into());
            }
        }
    }

    Ok(())
}

async fn reauthenticate(pool: &PgPool, teacher: &str, password: &str) -> anyhow::Result<()> {
    let record = db::fetch_teacher(pool, teacher).await?;
    auth::verify_password(&record, password)?;
    Ok(())
}

fn print_batch(action: &str, batch: &db::BatchReport) {
    println!("{action} {} students.", batch.succeeded.len());
    if !batch.failed.is_empty() {
        println!("{} failed:", batch.failed.len());
        for (email, reason) in &batch.failed {
            println!("- {email}: {reason}");
        }
    }
}
