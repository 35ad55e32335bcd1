use serde_json::Value;

/// Replace the `messages` field of a request payload for logging
///
/// Chat payloads carry user content that must never reach the logs; every
/// failure path logs payloads through this helper.
pub fn redact_messages(payload: &Value) -> Value {
    let mut redacted = payload.clone();
    if let Some(obj) = redacted.as_object_mut()
        && obj.contains_key("messages")
    {
        obj.insert("messages".to_owned(), Value::String("<REMOVED>".to_owned()));
    }
    redacted
}
