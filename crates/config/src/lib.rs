//! Configuration loading, validation, and management for Steward.
//!
//! Loads configuration from `~/.steward/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use steward_core::ExecutionMode;

/// Tools that always need approval unless overridden in `[approval]`.
pub const DEFAULT_RISKY_TOOLS: &[&str] = &[
    "write_code_file",
    "write_file",
    "move_file_by_ext",
    "delete_file",
    "save_memory",
    "run_command",
    "edit_file",
    "insert_text",
    "delete_lines",
    "multi_edit",
    "create_file",
    "rename_file",
    "video_clip",
    "undo_edit",
    "notify_manage",
    "grad_school_manage",
    "grad_school_research",
    "reminder_push",
    "runtime_smoke",
    "skill_scaffold_create",
];

/// The root configuration structure.
///
/// Maps directly to `~/.steward/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Universal API key; wins over every provider-specific key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    /// Per-provider overrides keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("agent", &self.agent)
            .field("approval", &self.approval)
            .field("storage", &self.storage)
            .field("gateway", &self.gateway)
            .field("pricing", &self.pricing)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Step loop behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Provider name or alias ("moonshot", "kimi", "openai", ...)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model override; the provider profile's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Base URL override for the selected provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub mode: ExecutionMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Rounds (user + assistant pairs) kept besides the system prompt
    #[serde(default = "default_history_rounds")]
    pub max_history_rounds: usize,

    /// Attempts per tool call before giving up
    #[serde(default = "default_tool_retries")]
    pub max_tool_retries: u32,

    /// Fixed pause between failed tool attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Run risky tools without asking
    #[serde(default)]
    pub auto_approve: bool,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_provider() -> String {
    "moonshot".into()
}
fn default_history_rounds() -> usize {
    30
}
fn default_tool_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_system_prompt() -> String {
    "You are a capable personal assistant with access to tools.\n\
     1. Understand the request first; read files or list directories for context when needed.\n\
     2. Explain what you are about to change before calling a tool that modifies anything.\n\
     3. When a tool fails, analyse the error and try to recover instead of giving up.\n\
     4. Answer concisely."
        .into()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            mode: ExecutionMode::default(),
            temperature: None,
            max_history_rounds: default_history_rounds(),
            max_tool_retries: default_tool_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            auto_approve: false,
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_risky_tools")]
    pub risky_tools: Vec<String>,

    /// Lifetime of an approval ticket
    #[serde(default = "default_ticket_ttl")]
    pub ticket_ttl_secs: u64,
}

fn default_risky_tools() -> Vec<String> {
    DEFAULT_RISKY_TOOLS.iter().map(|s| s.to_string()).collect()
}
fn default_ticket_ttl() -> u64 {
    600
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            risky_tools: default_risky_tools(),
            ticket_ttl_secs: default_ticket_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for session files and the latest-session pointer
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    /// Append-only runtime event log
    #[serde(default = "default_event_log")]
    pub event_log: PathBuf,

    /// Size above which the event log is rotated
    #[serde(default = "default_rotate_bytes")]
    pub rotate_bytes: u64,

    /// Check the log size once every this many writes
    #[serde(default = "default_rotate_check_every")]
    pub rotate_check_every: u64,

    /// Directory file tools are confined to
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("memories/chat_history")
}
fn default_event_log() -> PathBuf {
    PathBuf::from("data/runtime_events.jsonl")
}
fn default_rotate_bytes() -> u64 {
    8 * 1024 * 1024
}
fn default_rotate_check_every() -> u64 {
    200
}
fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_dir: default_history_dir(),
            event_log: default_event_log(),
            rotate_bytes: default_rotate_bytes(),
            rotate_check_every: default_rotate_check_every(),
            workspace_dir: default_workspace_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Flat rate overrides; zero means "use the built-in table".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub prompt_usd_per_1m: f64,

    #[serde(default)]
    pub completion_usd_per_1m: f64,

    /// Extra per-model rates (model prefix → rates)
    #[serde(default)]
    pub models: HashMap<String, PricingOverrideConfig>,
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    pub prompt_per_m: f64,
    pub completion_per_m: f64,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.steward/config.toml),
    /// then apply process environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (highest priority).
    ///
    /// - `AI_API_KEY`: universal key
    /// - `AI_PROVIDER`, `AI_MODEL`, `AI_BASE_URL`
    /// - `AI_PROMPT_USD_PER_1M`, `AI_COMPLETION_USD_PER_1M`
    /// - `STEWARD_AUTO_APPROVE`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("AI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(provider) = get("AI_PROVIDER") {
            self.agent.provider = provider;
        }
        if let Some(model) = get("AI_MODEL") {
            self.agent.model = Some(model);
        }
        if let Some(url) = get("AI_BASE_URL") {
            self.agent.base_url = Some(url);
        }
        if let Some(rate) = get("AI_PROMPT_USD_PER_1M").and_then(|v| v.parse::<f64>().ok()) {
            self.pricing.prompt_usd_per_1m = rate;
        }
        if let Some(rate) = get("AI_COMPLETION_USD_PER_1M").and_then(|v| v.parse::<f64>().ok()) {
            self.pricing.completion_usd_per_1m = rate;
        }
        if let Some(flag) = get("STEWARD_AUTO_APPROVE") {
            self.agent.auto_approve = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".steward")
    }

    /// Directory holding one JSON file per session.
    pub fn sessions_dir(&self) -> PathBuf {
        self.storage.history_dir.join("sessions")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_history_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_history_rounds must be at least 1".into(),
            ));
        }

        if self.agent.max_tool_retries == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_retries must be at least 1".into(),
            ));
        }

        if let Some(t) = self.agent.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.approval.ticket_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "approval.ticket_ttl_secs must be positive".into(),
            ));
        }

        if self.storage.rotate_check_every == 0 {
            return Err(ConfigError::ValidationError(
                "storage.rotate_check_every must be at least 1".into(),
            ));
        }

        if self.gateway.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("gateway.host must not be empty".into()));
        }

        if self.pricing.prompt_usd_per_1m < 0.0 || self.pricing.completion_usd_per_1m < 0.0 {
            return Err(ConfigError::ValidationError("pricing rates must not be negative".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `steward config`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.provider, "moonshot");
        assert_eq!(config.agent.max_history_rounds, 30);
        assert_eq!(config.agent.max_tool_retries, 3);
        assert_eq!(config.approval.ticket_ttl_secs, 600);
        assert_eq!(config.storage.rotate_bytes, 8 * 1024 * 1024);
        assert!(config.approval.risky_tools.iter().any(|t| t == "delete_file"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.agent.provider, config.agent.provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.approval.risky_tools, config.approval.risky_tools);
    }

    #[test]
    fn zero_retries_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_tool_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_temperature_rejected() {
        let mut config = AppConfig::default();
        config.agent.temperature = Some(3.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.agent.provider, "moonshot");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
provider = "deepseek"
mode = "deep"

[approval]
risky_tools = ["delete_file"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.provider, "deepseek");
        assert_eq!(config.agent.mode, ExecutionMode::Deep);
        assert_eq!(config.agent.max_tool_retries, 3);
        assert_eq!(config.approval.risky_tools, vec!["delete_file".to_string()]);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nprovider = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[
            ("AI_PROVIDER", "gemini"),
            ("AI_MODEL", "gemini-2.0-flash"),
            ("AI_API_KEY", "sk-test"),
            ("AI_PROMPT_USD_PER_1M", "1.5"),
            ("AI_COMPLETION_USD_PER_1M", "not-a-number"),
            ("STEWARD_AUTO_APPROVE", "on"),
        ]));

        assert_eq!(config.agent.provider, "gemini");
        assert_eq!(config.agent.model.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert!((config.pricing.prompt_usd_per_1m - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.pricing.completion_usd_per_1m, 0.0);
        assert!(config.agent.auto_approve);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[("AI_PROVIDER", "   ")]));
        assert_eq!(config.agent.provider, "moonshot");
    }

    #[test]
    fn debug_redacts_keys() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("moonshot"));
        assert!(toml_str.contains("delete_file"));
    }
}
