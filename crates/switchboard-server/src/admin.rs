//! Admin API for editing the providers and rules documents
//!
//! Both POST endpoints validate the prospective document before anything is
//! written, so a rejected body leaves the file and the running snapshot
//! untouched. The raw text is written verbatim to keep comments intact.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use serde_json::json;
use switchboard_config::{ConfigStore, parse_providers, parse_rules};

#[derive(Clone)]
pub struct AdminState {
    config: Arc<ConfigStore>,
}

/// Build the config-editing router
pub fn admin_router(config: Arc<ConfigStore>) -> Router {
    Router::new()
        .route(
            "/v1/config/models-rules",
            routing::get(get_rules_text).post(save_rules),
        )
        .route(
            "/v1/config/providers",
            routing::get(get_providers_text).post(save_providers),
        )
        .with_state(AdminState { config })
}

/// Handle `GET /v1/config/models-rules`
async fn get_rules_text(State(state): State<AdminState>) -> Response {
    read_config_file(state.config.rules_path())
}

/// Handle `GET /v1/config/providers`
async fn get_providers_text(State(state): State<AdminState>) -> Response {
    read_config_file(state.config.providers_path())
}

fn read_config_file(path: &Path) -> Response {
    match std::fs::read_to_string(path) {
        Ok(text) => text.into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, &format!("{} not found", path.display()))
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read config file");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("could not read {}", path.display()))
        }
    }
}

/// Handle `POST /v1/config/models-rules`
async fn save_rules(State(state): State<AdminState>, body: String) -> Response {
    let providers = state.config.snapshot().providers.clone();
    if let Err(e) = parse_rules(&body, &providers) {
        return validation_error(&e);
    }

    persist_and_reload(state.config.rules_path(), &body, || state.config.reload_rules())
}

/// Handle `POST /v1/config/providers`
async fn save_providers(State(state): State<AdminState>, body: String) -> Response {
    let prospective = match parse_providers(&body) {
        Ok(providers) => providers,
        Err(e) => return validation_error(&e),
    };
    if let Some(fallback) = state.config.fallback_provider()
        && !prospective.contains_key(fallback)
    {
        return validation_error(&anyhow::anyhow!(
            "fallback provider '{fallback}' is not defined in the providers configuration"
        ));
    }

    persist_and_reload(state.config.providers_path(), &body, || state.config.reload_providers())
}

fn persist_and_reload(path: &Path, body: &str, reload: impl FnOnce() -> anyhow::Result<()>) -> Response {
    if let Err(e) = std::fs::write(path, body) {
        tracing::error!(path = %path.display(), error = %e, "failed to write config file");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("could not save {}", path.display()));
    }

    match reload() {
        Ok(()) => {
            tracing::info!(path = %path.display(), "configuration updated and reloaded");
            Json(json!({"message": format!("{} updated and reloaded successfully", file_name(path))})).into_response()
        }
        Err(e) => {
            // The file was already validated, so a reload failure here means
            // the file and the running snapshot have diverged.
            tracing::error!(path = %path.display(), error = %e, "config file updated but reload failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("{} updated, but failed to reload: {e}", file_name(path)),
            )
        }
    }
}

fn validation_error(error: &anyhow::Error) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"detail": "Validation Error", "errors": [error.to_string()]})),
    )
        .into_response()
}

fn error_response(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({"detail": detail}))).into_response()
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
