//! Mock upstream provider for integration tests
//!
//! Implements a minimal OpenAI-compatible API that serves scripted
//! responses and records the request payloads it receives.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// One scripted completion response
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// 200 with a JSON body
    Json(Value),
    /// Arbitrary status with a JSON body
    Status(u16, Value),
    /// 200 `text/event-stream` sent as a single chunk
    Sse(String),
    /// 200 `text/event-stream` sent as separate delayed chunks
    SseChunks(Vec<String>),
}

impl MockResponse {
    /// The canned non-streaming success body
    pub fn ok() -> Self {
        Self::ok_with_content("Hello from mock provider")
    }

    pub fn ok_with_content(content: &str) -> Self {
        Self::Json(json!({
            "id": "chatcmpl-test-123",
            "object": "chat.completion",
            "created": 1_700_000_000u64,
            "model": "mock-model-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
        }))
    }

    pub fn server_error() -> Self {
        Self::Status(
            500,
            json!({"error": {"message": "mock provider intentional failure", "type": "server_error"}}),
        )
    }
}

struct MockState {
    /// Responses consumed front to back; the last entry repeats
    script: Mutex<VecDeque<MockResponse>>,
    completion_count: AtomicU32,
    bodies: Mutex<Vec<Value>>,
}

/// Mock provider backend bound to a random local port
pub struct MockProvider {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockProvider {
    /// Start with a response script; the last entry repeats forever
    pub async fn start_with_script(script: Vec<MockResponse>) -> anyhow::Result<Self> {
        assert!(!script.is_empty(), "mock script must not be empty");
        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            completion_count: AtomicU32::new(0),
            bodies: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/models", routing::get(handle_models))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Start a provider that always succeeds with the canned body
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_script(vec![MockResponse::ok()]).await
    }

    /// Start a provider that always succeeds with custom content
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_with_script(vec![MockResponse::ok_with_content(content)]).await
    }

    /// Start a provider that fails the first `n` requests with 500
    pub async fn start_failing(n: usize) -> anyhow::Result<Self> {
        let mut script = vec![MockResponse::server_error(); n];
        script.push(MockResponse::ok());
        Self::start_with_script(script).await
    }

    /// Start a provider where every request fails with 500
    pub async fn start_always_failing() -> anyhow::Result<Self> {
        Self::start_with_script(vec![MockResponse::server_error()]).await
    }

    /// Base URL for the providers configuration
    ///
    /// Includes `/v1` since the gateway appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of completion requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Request payloads received, in order
    pub fn request_bodies(&self) -> Vec<Value> {
        self.state.bodies.lock().unwrap().clone()
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_chat_completions(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    state.bodies.lock().unwrap().push(body);

    let response = {
        let mut script = state.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    };

    match response {
        MockResponse::Json(value) => Json(value).into_response(),
        MockResponse::Status(status, value) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(value),
        )
            .into_response(),
        MockResponse::Sse(body) => sse_response(Body::from(body)),
        MockResponse::SseChunks(chunks) => {
            // Delay between chunks so each arrives as its own network read
            let stream = futures_util::stream::iter(chunks).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(25)).await;
                Ok::<_, Infallible>(Bytes::from(chunk))
            });
            sse_response(Body::from_stream(stream))
        }
    }
}

fn sse_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}

async fn handle_models() -> Response {
    Json(json!({
        "object": "list",
        "data": [
            {"id": "mock-model-1", "object": "model", "created": 1_700_000_000u64, "owned_by": "mock"},
            {"id": "mock-model-2", "object": "model", "created": 1_700_000_000u64, "owned_by": "mock"},
        ],
    }))
    .into_response()
}
