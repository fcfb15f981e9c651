use thiserror::Error;

/// Error kinds shared by the signing engine, the stores, and the
/// authentication flows. Handlers map these to HTTP status codes; the
/// composite signing strategy keys its fail-over decision on
/// `InvalidClient` / `InvalidKeyConfig` only.
#[derive(Debug, Error)]
pub enum Error {
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email not verified")]
    EmailNotVerified,
    #[error("invalid verification code")]
    InvalidVerificationCode,
    #[error("verification code expired")]
    VerificationCodeExpired,
    #[error("invalid password change code")]
    InvalidPasswordChangeCode,
    #[error("password change code expired")]
    PasswordChangeCodeExpired,
    #[error("failed to send email")]
    EmailSendFailed,
    #[error("failed to sign token")]
    SigningFailed,
    #[error("invalid client")]
    InvalidClient,
    #[error("invalid key configuration")]
    InvalidKeyConfig,
    #[error("key rotation failed")]
    RotationFailed,
    #[error("token revoked")]
    Revoked,
    #[error("token expired")]
    Expired,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid token format")]
    TokenFormat,
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("not found")]
    NotFound,
    #[error("database query failed: {0}")]
    DatabaseQuery(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the error kinds that signal a remote signing backend
    /// outage rather than a bad token.
    #[must_use]
    pub fn is_backend_outage(&self) -> bool {
        matches!(self, Self::InvalidClient | Self::InvalidKeyConfig)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::DatabaseQuery(other.to_string()),
        }
    }
}
