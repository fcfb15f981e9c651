//! Postgres-backed store implementations (sqlx runtime queries).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use ulid::Ulid;

use crate::domain::{
    Error, User, UserStore, VerificationCode, VerificationCodeKind, VerificationCodeStore,
};

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn parse_ulid(value: &str) -> Result<Ulid, Error> {
    Ulid::from_string(value).map_err(|_| Error::Internal(format!("corrupt ulid column: {value}")))
}

fn user_from_row(row: &PgRow) -> Result<User, Error> {
    let id: String = row.try_get("id")?;
    Ok(User {
        id: parse_ulid(&id)?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        password: row.try_get("password")?,
        roles: row.try_get("roles")?,
        email_verified: row.try_get("email_verified")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn code_from_row(row: &PgRow) -> Result<VerificationCode, Error> {
    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let kind: String = row.try_get("kind")?;
    Ok(VerificationCode {
        id: parse_ulid(&id)?,
        user_id: parse_ulid(&user_id)?,
        code: row.try_get("code")?,
        kind: VerificationCodeKind::parse(&kind)
            .ok_or_else(|| Error::Internal(format!("corrupt code kind: {kind}")))?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: &User) -> Result<(), Error> {
        let query = "INSERT INTO users (id, name, email, phone, password, roles, email_verified, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user.id.to_string())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.password)
            .bind(&user.roles)
            .bind(user.email_verified)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    Error::UserAlreadyExists
                } else {
                    err.into()
                }
            })?;
        Ok(())
    }

    async fn find_by_id(&self, id: Ulid) -> Result<User, Error> {
        let query = "SELECT id, name, email, phone, password, roles, email_verified, created_at, updated_at \
                     FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
            .ok_or(Error::NotFound)?;
        user_from_row(&row)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, Error> {
        let query = "SELECT id, name, email, phone, password, roles, email_verified, created_at, updated_at \
                     FROM users WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
            .ok_or(Error::NotFound)?;
        user_from_row(&row)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, Error> {
        let query = "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS present";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.try_get("present")?)
    }

    async fn update(&self, user: &User) -> Result<(), Error> {
        let query = "UPDATE users SET name = $2, email = $3, phone = $4, password = $5, roles = $6, \
                     email_verified = $7, updated_at = $8 WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user.id.to_string())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.password)
            .bind(&user.roles)
            .bind(user.email_verified)
            .bind(user.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn update_password(&self, id: Ulid, password_hash: &str) -> Result<(), Error> {
        let query = "UPDATE users SET password = $2, updated_at = $3 WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id.to_string())
            .bind(password_hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Ulid) -> Result<(), Error> {
        let query = "DELETE FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id.to_string())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, Error> {
        let query = "SELECT id, name, email, phone, password, roles, email_verified, created_at, updated_at \
                     FROM users ORDER BY id LIMIT $1 OFFSET $2";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn add_role(&self, id: Ulid, role: &str) -> Result<(), Error> {
        let query = "UPDATE users SET roles = array_append(roles, $2), updated_at = $3 \
                     WHERE id = $1 AND NOT roles @> ARRAY[$2]::text[]";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id.to_string())
            .bind(role)
            .bind(Utc::now())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn remove_role(&self, id: Ulid, role: &str) -> Result<(), Error> {
        let query = "UPDATE users SET roles = array_remove(roles, $2), updated_at = $3 WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id.to_string())
            .bind(role)
            .bind(Utc::now())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgVerificationCodeStore {
    pool: PgPool,
}

impl PgVerificationCodeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationCodeStore for PgVerificationCodeStore {
    async fn create(&self, code: &VerificationCode) -> Result<(), Error> {
        let query = "INSERT INTO verification_codes (id, user_id, code, kind, created_at, expires_at) \
                     VALUES ($1, $2, $3, $4, $5, $6)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(code.id.to_string())
            .bind(code.user_id.to_string())
            .bind(&code.code)
            .bind(code.kind.as_str())
            .bind(code.created_at)
            .bind(code.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<VerificationCode, Error> {
        let query = "SELECT id, user_id, code, kind, created_at, expires_at \
                     FROM verification_codes WHERE code = $1 ORDER BY created_at DESC LIMIT 1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
            .ok_or(Error::NotFound)?;
        code_from_row(&row)
    }

    async fn find_by_user_and_kind(
        &self,
        user_id: Ulid,
        kind: VerificationCodeKind,
    ) -> Result<VerificationCode, Error> {
        let query = "SELECT id, user_id, code, kind, created_at, expires_at \
                     FROM verification_codes WHERE user_id = $1 AND kind = $2 \
                     ORDER BY created_at DESC LIMIT 1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id.to_string())
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
            .ok_or(Error::NotFound)?;
        code_from_row(&row)
    }

    async fn delete_by_user_and_kind(
        &self,
        user_id: Ulid,
        kind: VerificationCodeKind,
    ) -> Result<(), Error> {
        let query = "DELETE FROM verification_codes WHERE user_id = $1 AND kind = $2";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id.to_string())
            .bind(kind.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<(), Error> {
        let query = "DELETE FROM verification_codes WHERE expires_at < $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(before)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}
