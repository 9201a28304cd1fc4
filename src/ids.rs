use std::collections::HashSet;

use rand::Rng;

use crate::error::AppError;

const ID_MIN: u32 = 10_000;
const ID_MAX: u32 = 99_999;
const RANDOM_ATTEMPTS: u32 = 32;

/// Generate a 5-digit student id not present in `existing`.
///
/// Samples uniformly from [10000, 99999] a bounded number of times, then
/// falls back to a sequential sweep for the first free value. Errors only
/// when every value in the space is taken.
pub fn generate_student_id<R: Rng>(
    existing: &HashSet<String>,
    rng: &mut R,
) -> Result<String, AppError> {
    for _ in 0..RANDOM_ATTEMPTS {
        let candidate = rng.gen_range(ID_MIN..=ID_MAX).to_string();
        if !existing.contains(&candidate) {
            return Ok(candidate);
        }
    }

    for value in ID_MIN..=ID_MAX {
        let candidate = value.to_string();
        if !existing.contains(&candidate) {
            return Ok(candidate);
        }
    }

    Err(AppError::IdSpaceExhausted)
}
