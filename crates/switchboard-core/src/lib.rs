#![allow(clippy::must_use_candidate)]

mod context;
mod error;
mod redact;

pub use context::RequestContext;
pub use error::HttpError;
pub use redact::redact_messages;
