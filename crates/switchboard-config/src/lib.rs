#![allow(clippy::must_use_candidate)]

mod model;
mod settings;
mod store;

pub use model::{Candidate, ModelRule, ProviderDetails, Providers, RuleEntry, Rules};
pub use settings::Settings;
pub use store::{ConfigSnapshot, ConfigStore, parse_providers, parse_rules};
