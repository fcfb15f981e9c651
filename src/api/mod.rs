//! HTTP surface: router, middleware stack, OpenAPI document, and the
//! serve loop. Handlers stay thin; everything interesting happens in the
//! services handed in as extensions.

pub mod handlers;

use anyhow::Result;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::AuthService;
use crate::jwt::TokenIssuer;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::jwks::jwks,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::verify_email,
        handlers::auth::request_password_reset,
        handlers::auth::reset_password,
        handlers::auth::refresh,
        handlers::auth::logout,
    ),
    components(schemas(
        handlers::auth::RegisterRequest,
        handlers::auth::RegisterResponse,
        handlers::auth::LoginRequest,
        handlers::auth::LoginResponse,
        handlers::auth::VerifyEmailRequest,
        handlers::auth::RequestPasswordResetRequest,
        handlers::auth::ResetPasswordRequest,
        handlers::auth::RefreshRequest,
        crate::domain::TokenPair,
    )),
    tags(
        (name = "auth", description = "Registration, login, and recovery flows"),
        (name = "jwks", description = "Public signing keys"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Build the application router with all routes and middleware wired.
#[must_use]
pub fn router(service: Arc<AuthService>, tokens: Arc<dyn TokenIssuer>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/verify-email", post(handlers::auth::verify_email))
        .route(
            "/api/auth/request-password-reset",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/.well-known/jwks.json", get(handlers::jwks::jwks))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(service))
                .layer(Extension(tokens)),
        )
}

/// Serve the router until ctrl-c.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(
    port: u16,
    service: Arc<AuthService>,
    tokens: Arc<dyn TokenIssuer>,
) -> Result<()> {
    let app = router(service, tokens);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
