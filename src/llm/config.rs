//! Provider and manager configuration.
//!
//! Everything here is plain serde data loaded once at startup. The on-disk
//! format is TOML:
//!
//! ```toml
//! default_provider = "openai"
//! fallback_chain = ["claude-cli", "ollama"]
//!
//! [routing]
//! tools = "claude-cli"
//!
//! [providers.openai]
//! type = "api"
//! base_url = "https://api.openai.com/v1"
//! api_key_env = "OPENAI_API_KEY"
//! model = "gpt-4o-mini"
//!
//! [providers.claude-cli]
//! type = "cli"
//! cli_provider = "claude"
//! model = "sonnet"
//! ```

use crate::env;
use crate::llm::types::{Action, ProviderKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Command-line model tools with known argument conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliFlavor {
    Claude,
    Gemini,
    Codex,
    Kimi,
    Ollama,
    #[default]
    Generic,
}

impl CliFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CliFlavor::Claude => "claude",
            CliFlavor::Gemini => "gemini",
            CliFlavor::Codex => "codex",
            CliFlavor::Kimi => "kimi",
            CliFlavor::Ollama => "ollama",
            CliFlavor::Generic => "generic",
        }
    }

    /// Executable used when the config names no command.
    pub fn default_command(&self) -> Option<&'static str> {
        match self {
            CliFlavor::Generic => None,
            other => Some(other.as_str()),
        }
    }

    /// Output arrives as `TurnBegin(...)` protocol records instead of plain text.
    pub fn is_turn_structured(&self) -> bool {
        matches!(self, CliFlavor::Kimi)
    }
}

/// One credential in an API provider's rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthProfileConfig {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_minutes: Option<u32>,
}

/// Construction parameters for a single provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// Human readable name, defaults to the provider id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key, read at construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_profiles: Vec<AuthProfileConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_1k_tokens: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_provider: Option<CliFlavor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Arguments for the CLI liveness probe, `--version` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            name: None,
            model: model.into(),
            base_url: None,
            api_key: None,
            api_key_env: None,
            auth_profiles: Vec::new(),
            embedding_model: None,
            cost_per_1k_tokens: None,
            cli_provider: None,
            command: None,
            args: Vec::new(),
            health_args: None,
            timeout_ms: None,
        }
    }

    pub fn api(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::new(ProviderKind::Api, model)
        }
    }

    pub fn cli(flavor: CliFlavor, model: impl Into<String>) -> Self {
        Self {
            cli_provider: Some(flavor),
            ..Self::new(ProviderKind::Cli, model)
        }
    }

    pub fn local_network(model: impl Into<String>) -> Self {
        Self::new(ProviderKind::LocalNetwork, model)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_auth_profile(mut self, profile: AuthProfileConfig) -> Self {
        self.auth_profiles.push(profile);
        self
    }

    pub fn with_command(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.command = Some(command.into());
        self.args = args;
        self
    }

    pub fn with_health_args(mut self, args: Vec<String>) -> Self {
        self.health_args = Some(args);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn display_name(&self, id: &str) -> String {
        self.name.clone().unwrap_or_else(|| id.to_string())
    }

    pub fn cli_flavor(&self) -> CliFlavor {
        self.cli_provider.unwrap_or_default()
    }

    /// Credential profiles in rotation order.
    ///
    /// Explicit `auth_profiles` come first, followed by `api_key` and then the
    /// key read from `api_key_env`. Duplicate keys are dropped.
    pub fn resolved_auth_profiles(&self) -> Vec<AuthProfileConfig> {
        let mut profiles = self.auth_profiles.clone();

        let literal = self.api_key.clone().filter(|k| !k.trim().is_empty());
        let from_env = self
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty());

        for key in [literal, from_env].into_iter().flatten() {
            if profiles.iter().all(|p| p.api_key != key) {
                profiles.push(AuthProfileConfig {
                    api_key: key,
                    label: None,
                    cooldown_minutes: None,
                });
            }
        }
        profiles
    }

    pub fn cli_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(env::cli::DEFAULT_TIMEOUT_MS))
    }
}

/// Provider id per action class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent: Option<String>,
}

impl RoutingConfig {
    pub fn get(&self, action: Action) -> Option<&str> {
        match action {
            Action::Chat => self.chat.as_deref(),
            Action::Tools => self.tools.as_deref(),
            Action::Embeddings => self.embeddings.as_deref(),
            Action::Subagent => self.subagent.as_deref(),
        }
    }

    pub fn set(&mut self, action: Action, provider_id: impl Into<String>) {
        let slot = match action {
            Action::Chat => &mut self.chat,
            Action::Tools => &mut self.tools,
            Action::Embeddings => &mut self.embeddings,
            Action::Subagent => &mut self.subagent,
        };
        *slot = Some(provider_id.into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_health_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

fn default_health_timeout_ms() -> u64 {
    env::health::DEFAULT_TIMEOUT_MS
}

fn default_health_cache_ttl_ms() -> u64 {
    env::health::DEFAULT_CACHE_TTL_MS
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_health_timeout_ms(),
            cache_ttl_ms: default_health_cache_ttl_ms(),
        }
    }
}

impl HealthCheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Top-level configuration consumed by the provider manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderManagerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl ProviderManagerConfig {
    pub fn with_provider(mut self, id: impl Into<String>, config: ProviderConfig) -> Self {
        self.providers.insert(id.into(), config);
        self
    }

    pub fn with_default_provider(mut self, id: impl Into<String>) -> Self {
        self.default_provider = Some(id.into());
        self
    }

    pub fn with_fallback_chain(mut self, chain: Vec<String>) -> Self {
        self.fallback_chain = chain;
        self
    }

    pub fn with_route(mut self, action: Action, id: impl Into<String>) -> Self {
        self.routing.set(action, id);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Id the routing table names for `action`, before any registry lookup.
    pub fn routed_id(&self, action: Action) -> Option<&str> {
        self.routing
            .get(action)
            .or(self.default_provider.as_deref())
    }

    /// Preference order for health-aware selection: the chat route (or the
    /// default provider) followed by the fallback chain.
    pub fn preference_order(&self) -> Vec<&str> {
        self.routed_id(Action::Chat)
            .into_iter()
            .chain(self.fallback_chain.iter().map(String::as_str))
            .collect()
    }

    /// Human readable warnings for references that name no configured provider.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.providers.is_empty() {
            warnings.push("No providers configured".to_string());
        }

        match self.default_provider.as_deref() {
            None => warnings.push("No default_provider set".to_string()),
            Some(id) if !self.providers.contains_key(id) => warnings.push(format!(
                "default_provider '{id}' does not name a configured provider"
            )),
            Some(_) => {}
        }

        for action in Action::ALL {
            if let Some(id) = self.routing.get(action)
                && !self.providers.contains_key(id)
            {
                warnings.push(format!(
                    "routing.{action} '{id}' does not name a configured provider"
                ));
            }
        }

        for id in &self.fallback_chain {
            if !self.providers.contains_key(id) {
                warnings.push(format!(
                    "fallback_chain entry '{id}' does not name a configured provider"
                ));
            }
        }

        for (id, provider) in &self.providers {
            if provider.kind == ProviderKind::Cli
                && provider.command.is_none()
                && provider.cli_flavor() == CliFlavor::Generic
            {
                warnings.push(format!(
                    "provider '{id}' is a generic CLI provider without a command"
                ));
            }
            if provider.kind == ProviderKind::Api && provider.base_url.is_none() {
                warnings.push(format!("provider '{id}' is an API provider without base_url"));
            }
        }

        if self.health_check.timeout_ms == 0 {
            warnings.push("health_check.timeout_ms is 0, every probe will time out".to_string());
        }

        warnings
    }
}
