pub mod auth;
pub mod health;
pub mod jwks;

use axum::http::StatusCode;

use crate::domain::Error;

/// Map a domain error to the HTTP response surface. Credential failures
/// stay coarse; code mismatch and code expiry map differently because the
/// client remediation differs.
pub(crate) fn error_response(err: &Error) -> (StatusCode, String) {
    let status = match err {
        Error::UserAlreadyExists => StatusCode::CONFLICT,
        Error::UserNotFound => StatusCode::NOT_FOUND,
        Error::InvalidCredentials
        | Error::Expired
        | Error::Revoked
        | Error::InvalidSignature
        | Error::UnknownKid(_) => StatusCode::UNAUTHORIZED,
        Error::EmailNotVerified => StatusCode::FORBIDDEN,
        Error::InvalidVerificationCode
        | Error::InvalidPasswordChangeCode
        | Error::TokenFormat => StatusCode::BAD_REQUEST,
        Error::VerificationCodeExpired | Error::PasswordChangeCodeExpired => StatusCode::GONE,
        Error::InvalidClient | Error::InvalidKeyConfig => StatusCode::SERVICE_UNAVAILABLE,
        Error::EmailSendFailed
        | Error::SigningFailed
        | Error::RotationFailed
        | Error::NotFound
        | Error::DatabaseQuery(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // Opaque storage/internal failures keep their detail in the logs only.
    let message = match err {
        Error::DatabaseQuery(_) | Error::Internal(_) => "Internal error".to_string(),
        other => other.to_string(),
    };

    (status, message)
}
