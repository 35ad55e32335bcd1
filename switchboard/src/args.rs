use std::path::PathBuf;

use clap::Parser;

/// Switchboard LLM gateway
#[derive(Debug, Parser)]
#[command(name = "switchboard", about = "OpenAI-compatible gateway with provider failover")]
pub struct Args {
    /// Path to the providers configuration file
    #[arg(long, default_value = "providers.json", env = "SWITCHBOARD_PROVIDERS_FILE")]
    pub providers_file: PathBuf,

    /// Path to the model fallback rules file
    #[arg(long, default_value = "models_fallback_rules.json", env = "SWITCHBOARD_RULES_FILE")]
    pub rules_file: PathBuf,

    /// Directory for the rotation and usage databases
    #[arg(long, default_value = "db", env = "SWITCHBOARD_DATA_DIR")]
    pub data_dir: PathBuf,
}
