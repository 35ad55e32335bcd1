use std::sync::Arc;

use switchboard_config::ConfigStore;
use switchboard_store::{RotationStore, UsageSink};

use crate::upstream::UpstreamClient;

/// Shared state for the LLM route handlers
#[derive(Clone)]
pub struct LlmState {
    inner: Arc<LlmStateInner>,
}

pub(crate) struct LlmStateInner {
    pub(crate) config: Arc<ConfigStore>,
    pub(crate) rotation: RotationStore,
    pub(crate) usage: UsageSink,
    pub(crate) upstream: UpstreamClient,
    pub(crate) fallback_provider: Option<String>,
}

impl LlmState {
    /// Assemble the routing state
    ///
    /// # Errors
    ///
    /// Returns an error when the upstream HTTP client cannot be built.
    pub fn new(
        config: Arc<ConfigStore>,
        rotation: RotationStore,
        usage: UsageSink,
        fallback_provider: Option<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            inner: Arc::new(LlmStateInner {
                config,
                rotation,
                usage,
                upstream: UpstreamClient::new()?,
                fallback_provider,
            }),
        })
    }

    pub(crate) fn inner(&self) -> &LlmStateInner {
        &self.inner
    }
}
