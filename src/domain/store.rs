use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::domain::{Error, User, VerificationCode, VerificationCodeKind};

/// User persistence port. Implementations return `Error::NotFound` when a
/// lookup misses and `Error::DatabaseQuery` for opaque storage failures.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), Error>;

    async fn find_by_id(&self, id: Ulid) -> Result<User, Error>;

    async fn find_by_email(&self, email: &str) -> Result<User, Error>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, Error>;

    async fn update(&self, user: &User) -> Result<(), Error>;

    async fn update_password(&self, id: Ulid, password_hash: &str) -> Result<(), Error>;

    async fn delete(&self, id: Ulid) -> Result<(), Error>;

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, Error>;

    async fn add_role(&self, id: Ulid, role: &str) -> Result<(), Error>;

    async fn remove_role(&self, id: Ulid, role: &str) -> Result<(), Error>;
}

/// Verification code persistence port. `find_by_user_and_kind` returns the
/// most recently created code so the single-live-code rule holds even if a
/// stale row survives a crashed delete-then-create sequence.
#[async_trait]
pub trait VerificationCodeStore: Send + Sync {
    async fn create(&self, code: &VerificationCode) -> Result<(), Error>;

    async fn find_by_code(&self, code: &str) -> Result<VerificationCode, Error>;

    async fn find_by_user_and_kind(
        &self,
        user_id: Ulid,
        kind: VerificationCodeKind,
    ) -> Result<VerificationCode, Error>;

    async fn delete_by_user_and_kind(
        &self,
        user_id: Ulid,
        kind: VerificationCodeKind,
    ) -> Result<(), Error>;

    /// Periodic cleanup of codes that expired before `before`; runs outside
    /// the request paths.
    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<(), Error>;
}
