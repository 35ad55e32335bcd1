//! Axum route handlers for the OpenAI-compatible surface

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use indexmap::IndexMap;
use serde_json::{Value, json};
use switchboard_config::{Candidate, ConfigSnapshot};
use switchboard_core::{HttpError, RequestContext, redact_messages};

use crate::attempt::{self, AttemptSuccess, SubProviderMode};
use crate::error::GatewayError;
use crate::state::LlmState;

/// Build the LLM router with the completion and model-listing endpoints
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/models", routing::get(list_models))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(State(state): State<LlmState>, headers: HeaderMap, body: Bytes) -> Response {
    let Ok(parsed) = serde_json::from_slice::<Value>(&body) else {
        return error_response(&GatewayError::InvalidBody);
    };

    let caller_key = bearer_token(&headers).unwrap_or_default().to_owned();
    let Some(ctx) = RequestContext::from_body(caller_key, parsed) else {
        return error_response(&GatewayError::MissingModel);
    };

    tracing::debug!(
        model = %ctx.gateway_model,
        streaming = ctx.streaming,
        payload = %redact_messages(&ctx.original_body),
        "chat completion request"
    );

    route_completion(&state, &ctx).await
}

/// Run the candidate loop: rotation, retries, sub-provider expansion
async fn route_completion(state: &LlmState, ctx: &RequestContext) -> Response {
    let inner = state.inner();
    // The snapshot is held for the whole request; concurrent reloads swap a
    // new one in for later requests only.
    let snapshot = inner.config.snapshot();

    let (mut candidates, rotate) = match snapshot.rules.get(&ctx.gateway_model) {
        Some(rule) => (rule.candidates.clone(), rule.rotate),
        None => {
            let Some(fallback) = inner.fallback_provider.clone() else {
                tracing::error!(model = %ctx.gateway_model, "no routing rule and no fallback provider configured");
                return error_response(&GatewayError::AllProvidersFailed {
                    model: ctx.gateway_model.clone(),
                    detail: "no routing rule matched and no fallback provider is configured".to_owned(),
                });
            };
            tracing::info!(
                model = %ctx.gateway_model,
                provider = %fallback,
                "no routing rule found, using fallback provider"
            );
            (vec![Candidate::new(fallback, ctx.gateway_model.clone())], false)
        }
    };

    if rotate && candidates.len() > 1 {
        let start = inner
            .rotation
            .next_index(&ctx.caller_key, &ctx.gateway_model, candidates.len())
            .await;
        tracing::info!(model = %ctx.gateway_model, start_index = start, "model rotation");
        candidates.rotate_left(start);
    }

    let mut last_error = "No providers were attempted.".to_owned();

    for candidate in &candidates {
        let mut rounds_left = candidate.retry_count.unwrap_or(0) + 1;

        while rounds_left > 0 {
            let success = try_candidate(state, &snapshot, ctx, candidate, &mut last_error).await;
            if let Some(success) = success {
                return success_response(success);
            }

            rounds_left -= 1;
            if rounds_left > 0
                && let Some(delay) = candidate.retry_delay
                && delay > 0
                && delay < 120
            {
                tracing::info!(
                    model = %candidate.model,
                    provider = %candidate.provider,
                    delay_seconds = delay,
                    attempts_left = rounds_left,
                    "retrying candidate after delay"
                );
                #[allow(clippy::cast_sign_loss)]
                tokio::time::sleep(Duration::from_secs(delay as u64)).await;
            }
        }
    }

    tracing::error!(model = %ctx.gateway_model, last_error = %last_error, "all providers failed");
    error_response(&GatewayError::AllProvidersFailed {
        model: ctx.gateway_model.clone(),
        detail: last_error,
    })
}

/// One round for one candidate: a single attempt, or the sub-provider
/// expansion when the candidate is configured for it
async fn try_candidate(
    state: &LlmState,
    snapshot: &ConfigSnapshot,
    ctx: &RequestContext,
    candidate: &Candidate,
    last_error: &mut String,
) -> Option<AttemptSuccess> {
    let inner = state.inner();

    if candidate.use_provider_order_as_fallback && !candidate.sub_providers().is_empty() {
        for sub_provider in candidate.sub_providers() {
            tracing::info!(
                model = %candidate.model,
                provider = %candidate.provider,
                sub_provider = %sub_provider,
                "attempting sub-provider"
            );
            match attempt::execute(
                &inner.upstream,
                &snapshot.providers,
                candidate,
                ctx,
                &inner.usage,
                SubProviderMode::Single(sub_provider),
            )
            .await
            {
                Ok(success) => return Some(success),
                Err(e) => {
                    tracing::warn!(
                        model = %candidate.model,
                        provider = %candidate.provider,
                        sub_provider = %sub_provider,
                        error = %e,
                        payload = %redact_messages(&ctx.original_body),
                        "sub-provider attempt failed"
                    );
                    *last_error = format!(
                        "model '{}' failed with provider '{}' via sub-provider '{sub_provider}': {e}",
                        candidate.model, candidate.provider
                    );
                }
            }
        }
        tracing::warn!(provider = %candidate.provider, "all sub-providers failed");
        None
    } else {
        tracing::info!(model = %candidate.model, provider = %candidate.provider, "attempting candidate");
        match attempt::execute(
            &inner.upstream,
            &snapshot.providers,
            candidate,
            ctx,
            &inner.usage,
            SubProviderMode::Inherit,
        )
        .await
        {
            Ok(success) => Some(success),
            Err(e) => {
                tracing::warn!(
                    model = %candidate.model,
                    provider = %candidate.provider,
                    error = %e,
                    payload = %redact_messages(&ctx.original_body),
                    "candidate attempt failed"
                );
                *last_error = format!(
                    "model '{}' failed with provider '{}': {e}",
                    candidate.model, candidate.provider
                );
                None
            }
        }
    }
}

fn success_response(success: AttemptSuccess) -> Response {
    match success {
        AttemptSuccess::Buffered(body) => Json(body).into_response(),
        AttemptSuccess::Stream(relay) => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, "text/event-stream"),
                (HeaderName::from_static("x-accel-buffering"), "no"),
            ],
            Body::from_stream(relay),
        )
            .into_response(),
    }
}

/// Handle `GET /v1/models`
///
/// Merges gateway rule names with the fallback provider's model list; rule
/// entries win on id collisions. Fallback fetch problems degrade to the
/// rule-only list.
async fn list_models(State(state): State<LlmState>) -> Response {
    let inner = state.inner();
    let snapshot = inner.config.snapshot();

    let mut models: IndexMap<String, Value> = snapshot
        .rules
        .keys()
        .map(|name| {
            (
                name.clone(),
                json!({"id": name, "object": "model", "owned_by": "switchboard"}),
            )
        })
        .collect();

    if let Some(fallback) = &inner.fallback_provider {
        match fetch_fallback_models(&state, &snapshot, fallback).await {
            Ok(fetched) => {
                for model in fetched {
                    if let Some(id) = model.get("id").and_then(Value::as_str) {
                        models.entry(id.to_owned()).or_insert(model);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(provider = %fallback, error = %e, "failed to fetch fallback provider models");
            }
        }
    }

    let mut data: Vec<Value> = models.into_values().collect();
    data.sort_by(|a, b| {
        a.get("id")
            .and_then(Value::as_str)
            .cmp(&b.get("id").and_then(Value::as_str))
    });

    Json(json!({"object": "list", "data": data})).into_response()
}

async fn fetch_fallback_models(
    state: &LlmState,
    snapshot: &ConfigSnapshot,
    provider: &str,
) -> anyhow::Result<Vec<Value>> {
    let inner = state.inner();
    let details = snapshot
        .providers
        .get(provider)
        .ok_or_else(|| anyhow::anyhow!("fallback provider '{provider}' not found in providers snapshot"))?;

    let url = format!("{}/models", details.base_url.trim_end_matches('/'));
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = attempt::resolve_api_key(details)
        && let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}"))
    {
        headers.insert(AUTHORIZATION, value);
    }

    let response = inner.upstream.get_json(&url, headers).await?;
    let status = response.status();
    if status.as_u16() >= 400 {
        anyhow::bail!("fallback provider returned {status}");
    }

    let body: Value = response.json().await?;
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("fallback provider models response has no 'data' array"))?;

    Ok(data.clone())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn error_response(error: &impl HttpError) -> Response {
    (error.status_code(), Json(json!({"detail": error.detail()}))).into_response()
}
