use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single upstream provider entry
///
/// `apikey` names an environment variable holding the real key; when no such
/// variable is set the string is used as the key itself, so keys can be
/// placed directly in the file for local setups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDetails {
    /// OpenAI-compatible API root, e.g. `https://openrouter.ai/api/v1`
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    /// Environment variable name or literal API key
    #[serde(rename = "apikey")]
    pub api_key_ref: String,
}

/// Validated providers snapshot, keyed by provider name in file order
pub type Providers = IndexMap<String, ProviderDetails>;

/// One provider+model attempt configuration within a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Provider name, must resolve in the providers snapshot
    pub provider: String,
    /// Model identifier sent to the provider
    pub model: String,
    /// When true, each entry of `providers_order` becomes its own attempt;
    /// when false the whole order is injected into the payload as a hint
    #[serde(default)]
    pub use_provider_order_as_fallback: bool,
    /// Ordered sub-provider identifiers for aggregator providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers_order: Option<Vec<String>>,
    /// Seconds to sleep between retry rounds; only values in (0, 120) sleep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<i64>,
    /// Extra attempts after the initial one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// Extra payload fields overlaid onto every request to this candidate
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub custom_body_params: serde_json::Map<String, Value>,
    /// Extra headers overlaid onto every request to this candidate
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub custom_headers: serde_json::Map<String, Value>,
}

impl Candidate {
    /// Minimal candidate, used when synthesizing the fallback-provider rule
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            use_provider_order_as_fallback: false,
            providers_order: None,
            retry_delay: None,
            retry_count: None,
            custom_body_params: serde_json::Map::new(),
            custom_headers: serde_json::Map::new(),
        }
    }

    /// Sub-provider order, empty slice when absent
    ///
    /// A configured empty list behaves identically to no list at all.
    pub fn sub_providers(&self) -> &[String] {
        self.providers_order.as_deref().unwrap_or_default()
    }
}

/// One entry of the rules document as written on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRule {
    /// Logical model name clients request
    pub gateway_model_name: String,
    /// Ordered candidate sequence, tried first to last
    pub fallback_models: Vec<Candidate>,
    /// Rotate the starting candidate across requests from the same caller
    #[serde(default)]
    pub rotate_models: bool,
}

/// A validated rule, keyed by gateway model in the rules snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEntry {
    pub candidates: Vec<Candidate>,
    pub rotate: bool,
}

/// Validated rules snapshot
pub type Rules = IndexMap<String, RuleEntry>;
