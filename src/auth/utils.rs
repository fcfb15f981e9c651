//! Small helpers for email validation and verification code generation.

use rand::rngs::OsRng;
use rand::Rng;
use regex::Regex;

/// Basic email format check on already-trimmed input. Emails are stored
/// case-sensitive, so no case folding happens anywhere.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Six-digit verification code, sent by email and typed back by the user.
#[must_use]
pub fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000))
}
