use axum::Json;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

/// Authenticate requests against the configured gateway key
///
/// Expects `Authorization: Bearer <key>`. Health checks and model listings
/// stay public so clients can discover the gateway without credentials.
/// This layer is only installed when a gateway key is configured.
pub async fn auth_middleware(gateway_key: SecretString, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if path == "/health" || path.ends_with("/models") {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return deny(
            StatusCode::UNAUTHORIZED,
            "Missing or invalid Authorization header (Bearer token expected)",
        );
    };

    if token != gateway_key.expose_secret() {
        tracing::warn!(path = %request.uri().path(), "rejected request with invalid API key");
        return deny(StatusCode::FORBIDDEN, "Invalid API Key");
    }

    next.run(request).await
}

fn deny(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({"detail": detail}))).into_response()
}
