//! Authentication flow handlers. Thin translation between HTTP payloads
//! and the orchestrator; all flow logic lives in `auth::AuthService`.

use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::handlers::error_response;
use crate::auth::{utils, AuthService};
use crate::domain::{LoginOutcome, TokenPair};

#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct RegisterResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(TokenPair),
    MfaRequired {
        mfa_ticket: String,
        expires_at: DateTime<Utc>,
    },
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

const MIN_PASSWORD_LENGTH: usize = 8;

#[utoipa::path(
    post,
    path= "/api/register",
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "Registration successful", body = RegisterResponse),
        (status = 400, description = "Invalid payload", body = String),
        (status = 409, description = "A user with that email already exists", body = String),
    ),
    tag = "auth",
)]
#[instrument(skip(service, payload))]
pub async fn register(
    Extension(service): Extension<Arc<AuthService>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let email = request.email.trim();
    if !utils::valid_email(email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return (StatusCode::BAD_REQUEST, "Password too short".to_string()).into_response();
    }

    match service
        .register(request.name.trim(), email, &request.password, request.phone.trim())
        .await
    {
        Ok(user) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                id: user.id.to_string(),
                name: user.name,
                email: user.email,
                email_verified: user.email_verified,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/api/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Token pair or MFA ticket", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 403, description = "Email not verified", body = String),
    ),
    tag = "auth",
)]
#[instrument(skip(service, payload))]
pub async fn login(
    Extension(service): Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service.login(request.email.trim(), &request.password).await {
        Ok(LoginOutcome::Tokens(pair)) => {
            (StatusCode::OK, Json(LoginResponse::Tokens(pair))).into_response()
        }
        Ok(LoginOutcome::MfaRequired(ticket)) => (
            StatusCode::OK,
            Json(LoginResponse::MfaRequired {
                mfa_ticket: ticket.ticket,
                expires_at: ticket.expires_at,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/api/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses (
        (status = 200, description = "Email verified"),
        (status = 400, description = "Invalid verification code", body = String),
        (status = 410, description = "Code expired, a new one was sent", body = String),
    ),
    tag = "auth",
)]
#[instrument(skip(service, payload))]
pub async fn verify_email(
    Extension(service): Extension<Arc<AuthService>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service
        .verify_email(request.email.trim(), request.code.trim())
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/api/auth/request-password-reset",
    request_body = RequestPasswordResetRequest,
    responses (
        (status = 200, description = "Reset code sent"),
        (status = 404, description = "Unknown user", body = String),
    ),
    tag = "auth",
)]
#[instrument(skip(service, payload))]
pub async fn request_password_reset(
    Extension(service): Extension<Arc<AuthService>>,
    payload: Option<Json<RequestPasswordResetRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service.request_password_reset(request.email.trim()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses (
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid reset code", body = String),
        (status = 410, description = "Reset code expired", body = String),
    ),
    tag = "auth",
)]
#[instrument(skip(service, payload))]
pub async fn reset_password(
    Extension(service): Extension<Arc<AuthService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if request.new_password.len() < MIN_PASSWORD_LENGTH {
        return (StatusCode::BAD_REQUEST, "Password too short".to_string()).into_response();
    }

    match service
        .reset_password(request.email.trim(), request.code.trim(), &request.new_password)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/api/auth/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 200, description = "Fresh token pair", body = TokenPair),
        (status = 401, description = "Refresh token rejected", body = String),
    ),
    tag = "auth",
)]
#[instrument(skip(service, payload))]
pub async fn refresh(
    Extension(service): Extension<Arc<AuthService>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service.refresh(request.refresh_token.trim()).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/api/auth/logout",
    params(
        ("Authorization" = String, Header, description = "Bearer token to revoke")
    ),
    responses (
        (status = 200, description = "Token revoked"),
        (status = 401, description = "Token rejected", body = String),
    ),
    tag = "auth",
)]
#[instrument(skip(service, headers))]
pub async fn logout(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::BAD_REQUEST, "Missing bearer token".to_string()).into_response();
    };

    match service.logout(token).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parses_the_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_token_rejects_other_schemes_and_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.remove(AUTHORIZATION);
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn login_response_serializes_flat_token_pair() {
        let response = LoginResponse::Tokens(TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        });
        let value = serde_json::to_value(&response).expect("serializes");
        assert_eq!(
            value,
            serde_json::json!({"access_token": "a", "refresh_token": "r"})
        );
    }
}
