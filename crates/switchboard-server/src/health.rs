use axum::Json;
use serde_json::{Value, json};

/// `GET /health`, public
pub async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
