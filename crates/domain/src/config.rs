//! Environment-driven configuration.
//!
//! Every knob comes from the process environment (compose-friendly);
//! `Config::from_env()` never fails, `validate()` reports what is
//! wrong and how badly.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.deepseek.com/v1".into(),
            model_name: "deepseek-chat".into(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Fixed sandbox address (dev mode). When set, the manager talks to
    /// a long-lived sandbox instead of provisioning one per session.
    pub address: Option<String>,
    pub image: Option<String>,
    pub name_prefix: Option<String>,
    pub ttl_minutes: u32,
    pub network: Option<String>,
    pub chrome_args: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            address: None,
            image: None,
            name_prefix: None,
            ttl_minutes: 30,
            network: None,
            chrome_args: None,
            http_proxy: None,
            https_proxy: None,
            no_proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    pub google_api_key: Option<String>,
    pub google_engine_id: Option<String>,
}

impl SearchConfig {
    /// The search tool is registered only when fully configured.
    pub fn is_configured(&self) -> bool {
        self.google_api_key.is_some() && self.google_engine_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for JSON-file persistence.
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("./data"),
        }
    }
}

fn d_log_level() -> String {
    "info".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env_opt(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparsable env value, using default");
            default
        }),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm: LlmConfig {
                api_key: env_opt("API_KEY"),
                api_base: env_or("API_BASE", &defaults.llm.api_base),
                model_name: env_or("MODEL_NAME", &defaults.llm.model_name),
                temperature: env_parse("TEMPERATURE", defaults.llm.temperature),
                max_tokens: env_parse("MAX_TOKENS", defaults.llm.max_tokens),
            },
            server: ServerConfig {
                host: env_or("HOST", &defaults.server.host),
                port: env_parse("PORT", defaults.server.port),
            },
            sandbox: SandboxConfig {
                address: env_opt("SANDBOX_ADDRESS"),
                image: env_opt("SANDBOX_IMAGE"),
                name_prefix: env_opt("SANDBOX_NAME_PREFIX"),
                ttl_minutes: env_parse("SANDBOX_TTL_MINUTES", defaults.sandbox.ttl_minutes),
                network: env_opt("SANDBOX_NETWORK"),
                chrome_args: env_opt("SANDBOX_CHROME_ARGS"),
                http_proxy: env_opt("SANDBOX_HTTP_PROXY"),
                https_proxy: env_opt("SANDBOX_HTTPS_PROXY"),
                no_proxy: env_opt("SANDBOX_NO_PROXY"),
            },
            search: SearchConfig {
                google_api_key: env_opt("GOOGLE_SEARCH_API_KEY"),
                google_engine_id: env_opt("GOOGLE_SEARCH_ENGINE_ID"),
            },
            storage: StorageConfig {
                state_path: PathBuf::from(env_or("STATE_PATH", "./data")),
            },
            log_level: env_or("LOG_LEVEL", "info"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. Startup aborts
    /// on any `Error`-severity issue.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.llm.api_key.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "API_KEY".into(),
                message: "LLM API key is required".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.llm.temperature) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "TEMPERATURE".into(),
                message: format!("must be between 0 and 1, got {}", self.llm.temperature),
            });
        }
        if self.llm.max_tokens == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "MAX_TOKENS".into(),
                message: "must be positive".into(),
            });
        }
        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "PORT".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.sandbox.address.is_none() && self.sandbox.image.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "SANDBOX_ADDRESS".into(),
                message: "neither a sandbox address nor an image is configured; \
                          sessions will fail to acquire a sandbox"
                    .into(),
            });
        }
        if self.search.google_api_key.is_some() != self.search.google_engine_id.is_some() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "GOOGLE_SEARCH_ENGINE_ID".into(),
                message: "search is only enabled when both the API key and \
                          engine id are set"
                    .into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.llm.model_name, "deepseek-chat");
        assert_eq!(config.sandbox.ttl_minutes, 30);
        assert!(!config.search.is_configured());
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "API_KEY" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn valid_config_has_no_errors() {
        let config = Config {
            llm: LlmConfig {
                api_key: Some("sk-test".into()),
                ..Default::default()
            },
            sandbox: SandboxConfig {
                address: Some("sandbox".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!config
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn lopsided_search_config_warns() {
        let config = Config {
            search: SearchConfig {
                google_api_key: Some("key".into()),
                google_engine_id: None,
            },
            ..Default::default()
        };
        assert!(config
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Warning && i.field.contains("SEARCH")));
        assert!(!config.search.is_configured());
    }
}
