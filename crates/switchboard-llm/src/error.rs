use http::StatusCode;
use switchboard_core::HttpError;
use thiserror::Error;

/// Failure of one attempt against one candidate
///
/// Every variant except a committed stream's mid-stream error feeds the
/// fallback loop: next sub-provider, retry, or next candidate.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Upstream responded with a 4xx/5xx status
    #[error("upstream returned {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },

    /// 2xx response whose JSON body carries a top-level `error` or `detail`
    #[error("upstream error: {0}")]
    UpstreamJson(String),

    /// Error detected before the stream was committed to the client
    #[error("error in first stream event: {0}")]
    StreamFirstEvent(String),

    /// Connect or read failure
    #[error("network error: {0}")]
    Network(String),

    /// 2xx response with an unparsable body
    #[error("invalid JSON from upstream: {0}")]
    InvalidJson(String),

    /// Candidate references a provider missing from the snapshot
    #[error("provider '{0}' is not configured")]
    ConfigMissing(String),
}

/// Request-level errors surfaced to the client
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid JSON body")]
    InvalidBody,

    #[error("Missing 'model' in request body")]
    MissingModel,

    #[error("All configured providers failed for model '{model}'. Last error: {detail}")]
    AllProvidersFailed { model: String, detail: String },
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody | Self::MissingModel => StatusCode::BAD_REQUEST,
            Self::AllProvidersFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn detail(&self) -> String {
        self.to_string()
    }
}
