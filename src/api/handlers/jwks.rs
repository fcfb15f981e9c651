use axum::{extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use crate::jwt::TokenIssuer;

#[utoipa::path(
    get,
    path= "/api/.well-known/jwks.json",
    responses (
        (status = 200, description = "Active and recently rotated public keys", body = String, content_type = "application/json"),
        (status = 500, description = "Key export failed", body = String),
    ),
    tag = "jwks",
)]
pub async fn jwks(Extension(tokens): Extension<Arc<dyn TokenIssuer>>) -> impl IntoResponse {
    match tokens.jwks().await {
        Ok(jwks) => match jwks.to_json_pretty() {
            Ok(body) => (StatusCode::OK, body),
            Err(err) => {
                error!("Failed to render JWKS: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "{}".to_string())
            }
        },
        Err(err) => {
            error!("Failed to export key set: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "{}".to_string())
        }
    }
}
