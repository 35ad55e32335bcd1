#![allow(clippy::must_use_candidate)]

//! The request-routing and failover engine for chat completions: rule
//! lookup, rotation-aware ordering, per-candidate retries, sub-provider
//! expansion, upstream invocation, SSE relay with error detection, and
//! token-usage accounting.

mod attempt;
mod error;
mod relay;
mod router;
mod state;
mod upstream;
mod usage;

pub use error::{AttemptError, GatewayError};
pub use router::llm_router;
pub use state::LlmState;
pub use upstream::UpstreamClient;
