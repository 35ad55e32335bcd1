use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use switchboard_config::{Candidate, ProviderDetails, Providers};
use switchboard_core::RequestContext;
use switchboard_store::UsageSink;

use crate::error::AttemptError;
use crate::relay::{RelayBody, commit_stream};
use crate::upstream::UpstreamClient;
use crate::usage::UsageTap;

/// Fixed branding headers sent with every upstream request
const REFERER: &str = "https://github.com/switchboard-gw/switchboard";
const TITLE: &str = "Switchboard";

/// How the candidate's sub-provider order applies to this attempt
#[derive(Debug, Clone, Copy)]
pub(crate) enum SubProviderMode<'a> {
    /// List mode: inject the whole order as an upstream hint when present
    Inherit,
    /// Expansion mode: pin the attempt to one sub-provider
    Single(&'a str),
}

/// A successful attempt: a buffered body or a committed stream
pub(crate) enum AttemptSuccess {
    Buffered(Value),
    Stream(RelayBody),
}

/// Execute one attempt against one candidate
///
/// Builds the per-attempt payload and headers, invokes the upstream, and
/// classifies the outcome. Streaming attempts only succeed once the relay
/// has committed, so a returned stream is safe to hand to the client.
pub(crate) async fn execute(
    client: &UpstreamClient,
    providers: &Providers,
    candidate: &Candidate,
    ctx: &RequestContext,
    sink: &UsageSink,
    mode: SubProviderMode<'_>,
) -> Result<AttemptSuccess, AttemptError> {
    let details = providers
        .get(&candidate.provider)
        .ok_or_else(|| AttemptError::ConfigMissing(candidate.provider.clone()))?;

    let url = completions_url(&details.base_url);
    let headers = build_headers(candidate, details);
    let payload = build_payload(candidate, ctx, mode);
    let mut tap = UsageTap::new(candidate.provider.clone(), candidate.model.clone(), sink.clone());

    if ctx.streaming {
        let response = client
            .open_stream(&url, headers, &payload)
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::HttpStatus { status, body });
        }

        let relay = commit_stream(response, tap).await?;
        Ok(AttemptSuccess::Stream(relay))
    } else {
        let response = client
            .post_json(&url, headers, &payload)
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        if status.as_u16() >= 400 {
            return Err(AttemptError::HttpStatus { status, body });
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|_| {
            AttemptError::InvalidJson(format!("invalid JSON response from {url}: {}", truncate(&body, 200)))
        })?;

        if let Some(detail) = upstream_error_detail(&parsed) {
            return Err(AttemptError::UpstreamJson(detail));
        }

        tap.commit();
        tap.observe_json(&parsed);
        tap.finalize();

        Ok(AttemptSuccess::Buffered(parsed))
    }
}

/// `baseUrl` with exactly one slash before the completions path
fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Resolve the provider key reference to an actual key
///
/// The reference names an environment variable; when no such variable is set
/// (or it is empty) the reference itself is the key. An empty result means
/// no Authorization header at all.
pub(crate) fn resolve_api_key(details: &ProviderDetails) -> Option<String> {
    let key = std::env::var(&details.api_key_ref)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| details.api_key_ref.clone());

    (!key.is_empty()).then_some(key)
}

fn build_headers(candidate: &Candidate, details: &ProviderDetails) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(HeaderName::from_static("http-referer"), HeaderValue::from_static(REFERER));
    headers.insert(HeaderName::from_static("x-title"), HeaderValue::from_static(TITLE));

    if let Some(key) = resolve_api_key(details)
        && let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}"))
    {
        headers.insert(AUTHORIZATION, value);
    }

    for (name, value) in &candidate.custom_headers {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                tracing::warn!(header = %name, value = %other, "skipping non-scalar custom header");
                continue;
            }
        };
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&text)) {
            (Ok(header_name), Ok(header_value)) => {
                headers.insert(header_name, header_value);
            }
            _ => tracing::warn!(header = %name, "skipping invalid custom header"),
        }
    }

    headers
}

/// Per-attempt payload: the client body with candidate overrides applied
///
/// Always a fresh copy so sub-provider injections and model overrides never
/// leak between attempts.
fn build_payload(candidate: &Candidate, ctx: &RequestContext, mode: SubProviderMode<'_>) -> Value {
    let mut payload = ctx.original_body.clone();

    if let Some(body) = payload.as_object_mut() {
        body.insert("model".to_owned(), Value::String(candidate.model.clone()));

        for (key, value) in &candidate.custom_body_params {
            body.insert(key.clone(), value.clone());
        }

        match mode {
            SubProviderMode::Single(sub_provider) => {
                body.insert("provider".to_owned(), json!({ "order": [sub_provider] }));
                body.insert("allow_fallbacks".to_owned(), Value::Bool(false));
            }
            SubProviderMode::Inherit => {
                let order = candidate.sub_providers();
                if !order.is_empty() {
                    body.insert("provider".to_owned(), json!({ "order": order }));
                    body.insert("allow_fallbacks".to_owned(), Value::Bool(false));
                }
            }
        }
    }

    payload
}

/// Error carried inside a 2xx JSON body, if any
fn upstream_error_detail(body: &Value) -> Option<String> {
    if body.get("error").is_none() && body.get("detail").is_none() {
        return None;
    }

    let detail = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| body.get("detail").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.to_string());

    Some(detail)
}

fn truncate(text: &str, limit: usize) -> &str {
    let mut end = limit.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
