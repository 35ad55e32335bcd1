use serde_json::Value;
use switchboard_store::{UsageRecord, UsageSink};

/// Per-request accumulator for assistant content and token usage
///
/// Observes every upstream JSON payload (buffered bodies and stream
/// segments), keeps the latest `usage` object seen (providers emit it once
/// at stream end; the last one wins), and emits exactly one [`UsageRecord`]
/// when the request finishes. The tap only emits after `commit()` — failed
/// attempts drop their tap silently so retries and fallbacks never produce
/// duplicate records.
pub(crate) struct UsageTap {
    provider: String,
    model: String,
    sink: UsageSink,
    content: String,
    usage: Option<Value>,
    committed: bool,
    emitted: bool,
}

impl UsageTap {
    pub(crate) fn new(provider: impl Into<String>, model: impl Into<String>, sink: UsageSink) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            sink,
            content: String::new(),
            usage: None,
            committed: false,
            emitted: false,
        }
    }

    /// Mark the upstream as having started delivering content
    pub(crate) fn commit(&mut self) {
        self.committed = true;
    }

    /// Record content and usage carried by one upstream JSON payload
    pub(crate) fn observe_json(&mut self, payload: &Value) {
        if let Some(choices) = payload.get("choices").and_then(Value::as_array) {
            for choice in choices {
                let piece = choice
                    .pointer("/delta/content")
                    .or_else(|| choice.pointer("/message/content"))
                    .and_then(Value::as_str);
                if let Some(piece) = piece {
                    self.content.push_str(piece);
                }
            }
        }

        if let Some(usage) = payload.get("usage")
            && usage.is_object()
        {
            self.usage = Some(usage.clone());
        }
    }

    /// Emit the usage record; idempotent, no-op before `commit()`
    pub(crate) fn finalize(&mut self) {
        if !self.committed || self.emitted {
            return;
        }
        self.emitted = true;

        let mut record = self.usage.as_ref().map(normalize_usage).unwrap_or_default();
        record.model = std::mem::take(&mut self.model);
        record.provider = std::mem::take(&mut self.provider);

        tracing::debug!(
            provider = %record.provider,
            model = %record.model,
            prompt_tokens = record.prompt_tokens,
            completion_tokens = record.completion_tokens,
            content_chars = self.content.len(),
            "request completed"
        );

        self.sink.record(record);
    }
}

impl Drop for UsageTap {
    /// Covers stream completion, mid-stream termination, and client
    /// disconnect alike: whatever was observed up to that point is emitted.
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Normalize a provider `usage` object into a [`UsageRecord`]
///
/// Reasoning tokens are carved out of `completion_tokens` so the recorded
/// completion count covers non-reasoning output only.
fn normalize_usage(usage: &Value) -> UsageRecord {
    let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);

    let reasoning_tokens = usage
        .pointer("/completion_tokens_details/reasoning_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let cached_tokens = usage
        .pointer("/prompt_tokens_details/cached_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let mut completion_tokens = count("completion_tokens");
    if reasoning_tokens > 0 {
        completion_tokens = completion_tokens.saturating_sub(reasoning_tokens);
    }

    UsageRecord {
        prompt_tokens: count("prompt_tokens"),
        completion_tokens,
        total_tokens: count("total_tokens"),
        reasoning_tokens,
        cached_tokens,
        cost: usage.get("cost").and_then(Value::as_f64).unwrap_or(0.0),
        model: String::new(),
        provider: String::new(),
    }
}
