//! One-way password hashing (Argon2id with default parameters).

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};

use crate::domain::Error;

/// Hash a password for storage.
///
/// # Errors
///
/// Returns `Internal` if hashing fails.
pub fn hash(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::Internal(format!("password hashing failed: {err}")))
}

/// Check a password against a stored hash. An unparseable hash counts as
/// a mismatch rather than an error so login keeps its coarse failure mode.
#[must_use]
pub fn verify(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() -> Result<(), Error> {
        let hashed = hash("pw123")?;
        assert_ne!(hashed, "pw123");
        assert!(verify("pw123", &hashed));
        assert!(!verify("wrong", &hashed));
        Ok(())
    }

    #[test]
    fn same_password_hashes_differently() -> Result<(), Error> {
        assert_ne!(hash("pw123")?, hash("pw123")?);
        Ok(())
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        assert!(!verify("pw123", "not-a-hash"));
    }
}
