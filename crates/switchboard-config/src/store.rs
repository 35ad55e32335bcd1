use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::model::{Candidate, ModelRule, ProviderDetails, Providers, RuleEntry, Rules};

/// Immutable pair of validated providers and rules
///
/// Requests clone the `Arc` once and keep that view for their whole
/// lifetime; reloads never mutate a snapshot in place.
#[derive(Debug, Default)]
pub struct ConfigSnapshot {
    pub providers: Providers,
    pub rules: Rules,
}

/// Holds the current configuration snapshot and swaps it on reload
///
/// Both config documents are JSON with comments tolerated. Validation always
/// runs against the prospective content before the swap: a failed reload
/// leaves the exposed snapshot untouched.
pub struct ConfigStore {
    providers_path: PathBuf,
    rules_path: PathBuf,
    fallback_provider: Option<String>,
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Load both documents from disk and validate them
    ///
    /// A missing rules file is tolerated (the gateway then serves only the
    /// fallback provider); a missing providers file is fatal.
    ///
    /// # Errors
    ///
    /// Returns an error when the providers file cannot be read or either
    /// document fails validation.
    pub fn load(
        providers_path: impl Into<PathBuf>,
        rules_path: impl Into<PathBuf>,
        fallback_provider: Option<String>,
    ) -> anyhow::Result<Self> {
        let providers_path = providers_path.into();
        let rules_path = rules_path.into();

        let providers_text = std::fs::read_to_string(&providers_path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", providers_path.display()))?;
        let providers = parse_providers(&providers_text)?;
        validate_fallback_provider(&providers, fallback_provider.as_deref())?;

        let rules = if rules_path.exists() {
            let rules_text = std::fs::read_to_string(&rules_path)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", rules_path.display()))?;
            parse_rules(&rules_text, &providers)?
        } else {
            tracing::warn!(
                path = %rules_path.display(),
                "rules file not found, proceeding without routing rules"
            );
            IndexMap::new()
        };

        tracing::info!(
            providers = providers.len(),
            rules = rules.len(),
            "configuration loaded"
        );

        Ok(Self {
            providers_path,
            rules_path,
            fallback_provider,
            current: RwLock::new(Arc::new(ConfigSnapshot { providers, rules })),
        })
    }

    /// Current snapshot; cheap, lock held only for the `Arc` clone
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    pub fn providers_path(&self) -> &Path {
        &self.providers_path
    }

    pub fn rules_path(&self) -> &Path {
        &self.rules_path
    }

    /// Provider used when no rule matches, if one is configured
    pub fn fallback_provider(&self) -> Option<&str> {
        self.fallback_provider.as_deref()
    }

    /// Re-read the rules file, validate against the current providers, swap
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing/unreadable or validation
    /// fails; the current snapshot stays in place in that case.
    pub fn reload_rules(&self) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(&self.rules_path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", self.rules_path.display()))?;

        let snapshot = self.snapshot();
        let rules = parse_rules(&text, &snapshot.providers)?;

        self.swap(ConfigSnapshot {
            providers: snapshot.providers.clone(),
            rules,
        });
        tracing::info!(path = %self.rules_path.display(), "rules reloaded");
        Ok(())
    }

    /// Re-read the providers file, validate, swap
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing/unreadable, a provider
    /// entry is malformed, or the configured fallback provider disappears;
    /// the current snapshot stays in place in that case.
    pub fn reload_providers(&self) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(&self.providers_path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", self.providers_path.display()))?;

        let providers = parse_providers(&text)?;
        validate_fallback_provider(&providers, self.fallback_provider.as_deref())?;

        let snapshot = self.snapshot();
        self.swap(ConfigSnapshot {
            providers,
            rules: snapshot.rules.clone(),
        });
        tracing::info!(path = %self.providers_path.display(), "providers reloaded");
        Ok(())
    }

    fn swap(&self, next: ConfigSnapshot) {
        *self.current.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(next);
    }
}

/// Parse and validate a providers document
///
/// The document is a JSON5 array of single-keyed objects, e.g.
/// `[{"openrouter": {"baseUrl": "...", "apikey": "OPENROUTER_API_KEY"}}]`.
///
/// # Errors
///
/// Returns an error when the text does not parse, an entry is not a
/// single-keyed object, a name repeats, or `baseUrl`/`apikey` is empty.
pub fn parse_providers(text: &str) -> anyhow::Result<Providers> {
    let entries: Vec<IndexMap<String, ProviderDetails>> =
        json5::from_str(text).map_err(|e| anyhow::anyhow!("invalid providers document: {e}"))?;

    let mut providers = Providers::new();
    for entry in entries {
        if entry.len() != 1 {
            anyhow::bail!("each provider entry must be an object with exactly one key (the provider name)");
        }
        for (name, details) in entry {
            if details.base_url.trim().is_empty() {
                anyhow::bail!("provider '{name}': 'baseUrl' must not be empty");
            }
            if details.api_key_ref.trim().is_empty() {
                anyhow::bail!("provider '{name}': 'apikey' must not be empty");
            }
            if providers.insert(name.clone(), details).is_some() {
                anyhow::bail!("provider '{name}' is defined more than once");
            }
        }
    }

    Ok(providers)
}

/// Parse and validate a rules document against a providers snapshot
///
/// # Errors
///
/// Returns an error when the text does not parse, a rule has no candidates,
/// a candidate has an empty model, or a candidate references an unknown
/// provider.
pub fn parse_rules(text: &str, providers: &Providers) -> anyhow::Result<Rules> {
    let entries: Vec<ModelRule> =
        json5::from_str(text).map_err(|e| anyhow::anyhow!("invalid rules document: {e}"))?;

    let mut rules = Rules::new();
    for rule in entries {
        validate_candidates(&rule.gateway_model_name, &rule.fallback_models, providers)?;
        rules.insert(
            rule.gateway_model_name,
            RuleEntry {
                candidates: rule.fallback_models,
                rotate: rule.rotate_models,
            },
        );
    }

    Ok(rules)
}

fn validate_candidates(gateway_model: &str, candidates: &[Candidate], providers: &Providers) -> anyhow::Result<()> {
    if candidates.is_empty() {
        anyhow::bail!("gateway model '{gateway_model}' must have at least one fallback model");
    }

    for candidate in candidates {
        if candidate.model.trim().is_empty() {
            anyhow::bail!(
                "gateway model '{gateway_model}': candidate for provider '{}' has an empty model",
                candidate.provider
            );
        }
        if !providers.contains_key(&candidate.provider) {
            anyhow::bail!(
                "gateway model '{gateway_model}': provider '{}' is not defined in the providers configuration",
                candidate.provider
            );
        }
    }

    Ok(())
}

fn validate_fallback_provider(providers: &Providers, fallback: Option<&str>) -> anyhow::Result<()> {
    if let Some(name) = fallback
        && !providers.contains_key(name)
    {
        anyhow::bail!("fallback provider '{name}' is not defined in the providers configuration");
    }
    Ok(())
}
