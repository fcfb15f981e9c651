//! Authentication orchestrator.
//!
//! Drives the user-facing transitions: register, verify email, login
//! (password, then optionally a second factor), password reset, token
//! refresh, and logout. Storage and delivery failures surface verbatim;
//! the only automatic recovery in the stack is the signing fail-over
//! below this layer.

pub mod email;
pub mod mfa;
pub mod password;
pub mod utils;

pub use email::{EmailSender, LogEmailSender};
pub use mfa::{MfaDisabled, MfaProvider};

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use ulid::Ulid;

use crate::domain::{
    Error, LoginOutcome, TokenPair, User, UserStore, VerificationCode, VerificationCodeKind,
    VerificationCodeStore,
};
use crate::jwt::TokenIssuer;

pub struct AuthService {
    users: Arc<dyn UserStore>,
    codes: Arc<dyn VerificationCodeStore>,
    tokens: Arc<dyn TokenIssuer>,
    email: Arc<dyn EmailSender>,
    mfa: Arc<dyn MfaProvider>,
    verification_code_ttl: Duration,
    reset_code_ttl: Duration,
}

impl AuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: Arc<dyn VerificationCodeStore>,
        tokens: Arc<dyn TokenIssuer>,
        email: Arc<dyn EmailSender>,
        mfa: Arc<dyn MfaProvider>,
        verification_code_ttl: Duration,
        reset_code_ttl: Duration,
    ) -> Self {
        Self {
            users,
            codes,
            tokens,
            email,
            mfa,
            verification_code_ttl,
            reset_code_ttl,
        }
    }

    /// Create an unverified account and send the email verification code.
    ///
    /// The user record is not rolled back when delivery fails;
    /// registration stands and verification can be retried independently.
    ///
    /// # Errors
    ///
    /// `UserAlreadyExists` if the email is taken, `EmailSendFailed` if
    /// delivery fails, storage errors verbatim.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        phone: &str,
    ) -> Result<User, Error> {
        if self.users.exists_by_email(email).await? {
            return Err(Error::UserAlreadyExists);
        }

        let password_hash = password::hash(password)?;
        let user = User::new(
            name.to_string(),
            email.to_string(),
            password_hash,
            phone.to_string(),
        );
        self.users.create(&user).await?;

        info!(user_id = %user.id, "registered new user");

        self.issue_and_send_verification(&user).await?;

        Ok(user)
    }

    /// Flip the user to verified when the supplied code is the live one.
    ///
    /// An expired code is consumed, replaced, and re-sent before the
    /// expiry error is returned, so the user can retry with the new code.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, `InvalidVerificationCode`,
    /// `VerificationCodeExpired`, or storage/delivery errors verbatim.
    #[instrument(skip(self, code))]
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), Error> {
        let mut user = self.find_user(email).await?;

        let stored = self
            .codes
            .find_by_user_and_kind(user.id, VerificationCodeKind::EmailVerification)
            .await
            .map_err(|err| match err {
                Error::NotFound => Error::InvalidVerificationCode,
                other => other,
            })?;

        if stored.code != code {
            return Err(Error::InvalidVerificationCode);
        }

        if stored.is_expired(Utc::now()) {
            self.codes
                .delete_by_user_and_kind(user.id, VerificationCodeKind::EmailVerification)
                .await?;
            self.issue_and_send_verification(&user).await?;
            warn!(user_id = %user.id, "verification code expired, sent a fresh one");
            return Err(Error::VerificationCodeExpired);
        }

        self.codes
            .delete_by_user_and_kind(user.id, VerificationCodeKind::EmailVerification)
            .await?;

        user.email_verified = true;
        user.updated_at = Utc::now();
        self.users.update(&user).await?;

        info!(user_id = %user.id, "email verified");
        Ok(())
    }

    /// Authenticate by password. Yields a token pair, or an MFA ticket
    /// when the account requires a second factor.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for both unknown email and wrong password
    /// (deliberately indistinguishable), `EmailNotVerified` before
    /// verification completes, signing/storage errors verbatim.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, Error> {
        let user = self.users.find_by_email(email).await.map_err(|err| match err {
            Error::NotFound | Error::UserNotFound => Error::InvalidCredentials,
            other => other,
        })?;

        if !password::verify(password, &user.password) {
            return Err(Error::InvalidCredentials);
        }

        if !user.email_verified {
            return Err(Error::EmailNotVerified);
        }

        if self.mfa.is_enabled(user.id).await? {
            let ticket = self.mfa.issue_ticket(user.id).await?;
            info!(user_id = %user.id, "login requires a second factor");
            return Ok(LoginOutcome::MfaRequired(ticket));
        }

        let pair = self.tokens.issue_pair(user.id, &user.roles).await?;
        info!(user_id = %user.id, "login succeeded");
        Ok(LoginOutcome::Tokens(pair))
    }

    /// Replace any pending reset code with a fresh one and send it.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, or any deletion/creation/delivery failure verbatim;
    /// the caller re-invokes the whole operation to retry.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), Error> {
        let user = self.find_user(email).await?;

        self.codes
            .delete_by_user_and_kind(user.id, VerificationCodeKind::PasswordReset)
            .await?;

        let code = utils::generate_code();
        self.codes
            .create(&VerificationCode::new(
                user.id,
                code.clone(),
                VerificationCodeKind::PasswordReset,
                self.reset_code_ttl,
            ))
            .await?;

        self.email
            .send_password_reset_email(&user.email, &code)
            .await?;

        info!(user_id = %user.id, "password reset requested");
        Ok(())
    }

    /// Replace the stored password hash when the reset code is live.
    ///
    /// An expired code is deleted but not re-issued; the user must request
    /// a new reset explicitly.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, `InvalidPasswordChangeCode`,
    /// `PasswordChangeCodeExpired`, or storage errors verbatim.
    #[instrument(skip(self, code, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        let user = self.find_user(email).await?;

        let stored = self
            .codes
            .find_by_user_and_kind(user.id, VerificationCodeKind::PasswordReset)
            .await
            .map_err(|err| match err {
                Error::NotFound => Error::InvalidPasswordChangeCode,
                other => other,
            })?;

        if stored.code != code {
            return Err(Error::InvalidPasswordChangeCode);
        }

        if stored.is_expired(Utc::now()) {
            self.codes
                .delete_by_user_and_kind(user.id, VerificationCodeKind::PasswordReset)
                .await?;
            return Err(Error::PasswordChangeCodeExpired);
        }

        self.codes
            .delete_by_user_and_kind(user.id, VerificationCodeKind::PasswordReset)
            .await?;

        let password_hash = password::hash(new_password)?;
        self.users.update_password(user.id, &password_hash).await?;

        info!(user_id = %user.id, "password reset completed");
        Ok(())
    }

    /// Exchange a valid refresh token for a fresh pair, re-reading the
    /// user's roles so revoked privileges do not survive the exchange.
    ///
    /// # Errors
    ///
    /// Verification errors verbatim (`Expired`, `Revoked`, signature
    /// failures), `InvalidCredentials` when the subject no longer exists.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let claims = self.tokens.validate(refresh_token).await?;

        let user_id = Ulid::from_string(&claims.sub)
            .map_err(|_| Error::Internal("malformed token subject".to_string()))?;
        let user = self.users.find_by_id(user_id).await.map_err(|err| match err {
            Error::NotFound => Error::InvalidCredentials,
            other => other,
        })?;

        self.tokens.issue_pair(user.id, &user.roles).await
    }

    /// Revoke a token until its natural expiry.
    ///
    /// # Errors
    ///
    /// Verification errors verbatim; revoking an already-revoked token
    /// fails with `Revoked` from validation.
    #[instrument(skip(self, token))]
    pub async fn logout(&self, token: &str) -> Result<(), Error> {
        let claims = self.tokens.validate(token).await?;

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
        self.tokens.revoke(&claims.jti, expires_at);

        Ok(())
    }

    async fn find_user(&self, email: &str) -> Result<User, Error> {
        self.users.find_by_email(email).await.map_err(|err| match err {
            Error::NotFound => Error::UserNotFound,
            other => other,
        })
    }

    async fn issue_and_send_verification(&self, user: &User) -> Result<(), Error> {
        let code = utils::generate_code();
        self.codes
            .create(&VerificationCode::new(
                user.id,
                code.clone(),
                VerificationCodeKind::EmailVerification,
                self.verification_code_ttl,
            ))
            .await?;

        self.email
            .send_verification_email(&user.email, &code)
            .await
    }
}
