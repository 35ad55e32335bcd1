use serde_json::Value;

/// Per-request context for the routing engine
///
/// Built once per `/v1/chat/completions` request and handed down through
/// the candidate loop; lives exactly as long as the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Opaque caller identity taken from the Authorization bearer token
    ///
    /// Keys the rotation cursor together with the gateway model. Empty when
    /// the caller sent no credentials (allowed when no gateway key is
    /// configured).
    pub caller_key: String,
    /// Logical model name the client asked for
    pub gateway_model: String,
    /// Whether the client requested a streamed response
    pub streaming: bool,
    /// The client request body as received, before any per-attempt overrides
    pub original_body: Value,
}

impl RequestContext {
    /// Build a context from an already-parsed request body
    ///
    /// Returns `None` when the body has no `model` field.
    pub fn from_body(caller_key: String, body: Value) -> Option<Self> {
        let gateway_model = body.get("model")?.as_str()?.to_owned();
        let streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

        Some(Self {
            caller_key,
            gateway_model,
            streaming,
            original_body: body,
        })
    }
}
