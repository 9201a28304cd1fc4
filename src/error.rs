use thiserror::Error;

/// Application error taxonomy. Everything is surfaced to the user once at
/// the CLI boundary; nothing is retried automatically. Invalid or stale QR
/// codes are scan decisions, not errors (see `scan::RejectReason`).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("backend failure: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("migration failure: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("incorrect password")]
    AuthFailure,

    #[error("student id space exhausted")]
    IdSpaceExhausted,
}

impl AppError {
    pub fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            key: key.into(),
        }
    }
}
