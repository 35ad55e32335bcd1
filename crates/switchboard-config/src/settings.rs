use secrecy::SecretString;

/// Environment-driven gateway settings
///
/// Read once at startup; configuration that hot-reloads (providers, rules)
/// lives in [`crate::ConfigStore`] instead.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Provider used when no rule matches the requested model
    pub fallback_provider: Option<String>,
    /// Key callers must present as a bearer token; unset disables auth
    pub gateway_api_key: Option<SecretString>,
    pub gateway_port: u16,
    pub gateway_host: String,
    /// Maximum number of chat log files kept on disk
    pub log_file_limit: usize,
    pub log_chat_enabled: bool,
    /// Exact allowed CORS origins; unset means any origin
    pub cors_allow_origins: Option<Vec<String>>,
    pub debug_mode: bool,
    pub log_level: String,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Self {
        let cors_allow_origins = env_var("CORS_ALLOW_ORIGINS").map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_owned)
                .collect()
        });

        Self {
            fallback_provider: env_var("FALLBACK_PROVIDER"),
            gateway_api_key: env_var("GATEWAY_API_KEY").map(SecretString::from),
            gateway_port: env_var("GATEWAY_PORT").and_then(|v| v.parse().ok()).unwrap_or(9000),
            gateway_host: env_var("GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            log_file_limit: env_var("LOG_FILE_LIMIT").and_then(|v| v.parse().ok()).unwrap_or(15),
            log_chat_enabled: env_var("LOG_CHAT_ENABLED").is_none_or(|v| v.eq_ignore_ascii_case("true")),
            cors_allow_origins,
            debug_mode: env_var("DEBUG_MODE").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            log_level: env_var("LOG_LEVEL").map_or_else(|| "info".to_owned(), |v| v.to_lowercase()),
        }
    }
}

impl Default for Settings {
    /// Defaults matching an empty environment
    fn default() -> Self {
        Self {
            fallback_provider: None,
            gateway_api_key: None,
            gateway_port: 9000,
            gateway_host: "0.0.0.0".to_owned(),
            log_file_limit: 15,
            log_chat_enabled: true,
            cors_allow_origins: None,
            debug_mode: false,
            log_level: "info".to_owned(),
        }
    }
}

/// Read an environment variable, treating empty values as unset
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_from_empty_environment() {
        temp_env::with_vars_unset(
            [
                "FALLBACK_PROVIDER",
                "GATEWAY_API_KEY",
                "GATEWAY_PORT",
                "GATEWAY_HOST",
                "LOG_FILE_LIMIT",
                "LOG_CHAT_ENABLED",
                "CORS_ALLOW_ORIGINS",
                "DEBUG_MODE",
                "LOG_LEVEL",
            ],
            || {
                let settings = Settings::from_env();
                assert_eq!(settings.gateway_port, 9000);
                assert_eq!(settings.gateway_host, "0.0.0.0");
                assert_eq!(settings.log_file_limit, 15);
                assert!(settings.log_chat_enabled);
                assert!(settings.fallback_provider.is_none());
                assert!(settings.gateway_api_key.is_none());
                assert!(settings.cors_allow_origins.is_none());
                assert!(!settings.debug_mode);
                assert_eq!(settings.log_level, "info");
            },
        );
    }

    #[test]
    fn overrides_are_applied() {
        temp_env::with_vars(
            [
                ("FALLBACK_PROVIDER", Some("openrouter")),
                ("GATEWAY_API_KEY", Some("sk-gw")),
                ("GATEWAY_PORT", Some("8123")),
                ("LOG_CHAT_ENABLED", Some("false")),
                ("CORS_ALLOW_ORIGINS", Some("https://a.example, https://b.example,")),
                ("LOG_LEVEL", Some("DEBUG")),
            ],
            || {
                let settings = Settings::from_env();
                assert_eq!(settings.fallback_provider.as_deref(), Some("openrouter"));
                assert_eq!(
                    settings.gateway_api_key.as_ref().map(ExposeSecret::expose_secret),
                    Some("sk-gw")
                );
                assert_eq!(settings.gateway_port, 8123);
                assert!(!settings.log_chat_enabled);
                assert_eq!(
                    settings.cors_allow_origins,
                    Some(vec!["https://a.example".to_owned(), "https://b.example".to_owned()])
                );
                assert_eq!(settings.log_level, "debug");
            },
        );
    }

    #[test]
    fn unparseable_port_falls_back_to_default() {
        temp_env::with_var("GATEWAY_PORT", Some("not-a-port"), || {
            assert_eq!(Settings::from_env().gateway_port, 9000);
        });
    }
}
