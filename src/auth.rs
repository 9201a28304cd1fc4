use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::TeacherRecord;

/// Salted credential: a random 16-byte salt and the SHA-256 digest of
/// salt || password, both hex-encoded for storage.
pub struct Credential {
    pub salt: String,
    pub hash: String,
}

pub fn hash_password(password: &str) -> Credential {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);
    let hash = digest(&salt, password);
    Credential { salt, hash }
}

/// Re-authentication gate for destructive actions: recompute the salted
/// digest and compare against the stored one.
pub fn verify_password(teacher: &TeacherRecord, password: &str) -> Result<(), AppError> {
    if digest(&teacher.password_salt, password) == teacher.password_hash {
        Ok(())
    } else {
        Err(AppError::AuthFailure)
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
