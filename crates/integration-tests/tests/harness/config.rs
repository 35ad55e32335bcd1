//! Programmatic gateway configuration for integration tests
//!
//! Writes providers and rules documents into a temp directory and produces
//! the settings/paths pair the server is built from.

use secrecy::SecretString;
use serde_json::{Value, json};
use switchboard_config::Settings;
use switchboard_server::ServerPaths;
use tempfile::TempDir;

/// Built test configuration; keeps the temp directory alive
pub struct GatewayConfig {
    pub settings: Settings,
    pub paths: ServerPaths,
    _dir: TempDir,
}

/// Builder for gateway test configurations
pub struct ConfigBuilder {
    providers: Vec<(String, String)>,
    rules: Vec<Value>,
    fallback_provider: Option<String>,
    gateway_api_key: Option<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            rules: Vec::new(),
            fallback_provider: None,
            gateway_api_key: None,
        }
    }

    /// Add a provider pointed at a mock backend
    ///
    /// The key reference names no real environment variable, so the literal
    /// string itself is used as the bearer key.
    pub fn with_provider(mut self, name: &str, base_url: &str) -> Self {
        self.providers.push((name.to_owned(), base_url.to_owned()));
        self
    }

    /// Add a rules document entry as raw JSON
    pub fn with_rule(mut self, rule: Value) -> Self {
        self.rules.push(rule);
        self
    }

    /// Shorthand for a plain candidate-sequence rule
    pub fn with_simple_rule(self, gateway_model: &str, candidates: &[(&str, &str)], rotate: bool) -> Self {
        let fallback_models: Vec<Value> = candidates
            .iter()
            .map(|(provider, model)| json!({"provider": provider, "model": model}))
            .collect();
        self.with_rule(json!({
            "gateway_model_name": gateway_model,
            "fallback_models": fallback_models,
            "rotate_models": rotate,
        }))
    }

    pub fn with_fallback_provider(mut self, name: &str) -> Self {
        self.fallback_provider = Some(name.to_owned());
        self
    }

    pub fn with_gateway_key(mut self, key: &str) -> Self {
        self.gateway_api_key = Some(key.to_owned());
        self
    }

    /// Write the config files and assemble settings/paths
    pub fn build(self) -> GatewayConfig {
        let dir = TempDir::new().expect("create temp dir");

        let providers: Vec<Value> = self
            .providers
            .iter()
            .map(|(name, base_url)| json!({name: {"baseUrl": base_url, "apikey": "test-key"}}))
            .collect();

        let providers_file = dir.path().join("providers.json");
        let rules_file = dir.path().join("models_fallback_rules.json");
        std::fs::write(&providers_file, serde_json::to_string_pretty(&providers).unwrap()).unwrap();
        std::fs::write(&rules_file, serde_json::to_string_pretty(&self.rules).unwrap()).unwrap();

        let settings = Settings {
            fallback_provider: self.fallback_provider,
            gateway_api_key: self.gateway_api_key.map(SecretString::from),
            gateway_host: "127.0.0.1".to_owned(),
            gateway_port: 0,
            ..Settings::default()
        };

        GatewayConfig {
            settings,
            paths: ServerPaths {
                providers_file,
                rules_file,
                data_dir: dir.path().join("db"),
            },
            _dir: dir,
        }
    }
}
