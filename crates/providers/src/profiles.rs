//! Provider profiles: known backends, aliases and API-key resolution.
//!
//! A profile names the endpoint, default model and the environment variables
//! that may hold its key. `AI_API_KEY` (surfaced as `AppConfig::api_key`)
//! overrides every profile.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use steward_config::AppConfig;
use steward_core::error::ProviderError;
use steward_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Universal key variable, checked before any profile-specific one.
pub const UNIVERSAL_KEY_ENV: &str = "AI_API_KEY";

const FALLBACK_PROVIDER: &str = "moonshot";

/// A known LLM backend.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderProfile {
    pub name: &'static str,
    pub label: &'static str,
    pub key_envs: &'static [&'static str],
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub openai_compatible: bool,
    pub hint: &'static str,
}

pub const PROFILES: &[ProviderProfile] = &[
    ProviderProfile {
        name: "moonshot",
        label: "Moonshot",
        key_envs: &["KIMI_API_KEY", "MOONSHOT_API_KEY"],
        base_url: "https://api.moonshot.cn/v1",
        default_model: "moonshot-v1-32k",
        openai_compatible: true,
        hint: "",
    },
    ProviderProfile {
        name: "openai",
        label: "OpenAI",
        key_envs: &["OPENAI_API_KEY"],
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4.1-mini",
        openai_compatible: true,
        hint: "",
    },
    ProviderProfile {
        name: "deepseek",
        label: "DeepSeek",
        key_envs: &["DEEPSEEK_API_KEY"],
        base_url: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
        openai_compatible: true,
        hint: "",
    },
    ProviderProfile {
        name: "openrouter",
        label: "OpenRouter",
        key_envs: &["OPENROUTER_API_KEY"],
        base_url: "https://openrouter.ai/api/v1",
        default_model: "openai/gpt-4.1-mini",
        openai_compatible: true,
        hint: "",
    },
    ProviderProfile {
        name: "google",
        label: "Google (Gemini OpenAI API)",
        key_envs: &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        default_model: "gemini-2.0-flash",
        openai_compatible: true,
        hint: "",
    },
    ProviderProfile {
        name: "anthropic",
        label: "Anthropic",
        key_envs: &["ANTHROPIC_API_KEY"],
        base_url: "",
        default_model: "claude-3-7-sonnet-latest",
        openai_compatible: false,
        hint: "Anthropic does not speak the OpenAI streaming tool-call protocol; use the openrouter provider to reach Claude models.",
    },
];

/// Map aliases to canonical names. Empty input selects the fallback.
pub fn normalize_provider(name: &str) -> String {
    let raw = name.trim().to_ascii_lowercase();
    match raw.as_str() {
        "" => FALLBACK_PROVIDER.to_string(),
        "kimi" => "moonshot".into(),
        "gpt" => "openai".into(),
        "router" => "openrouter".into(),
        "gemini" => "google".into(),
        "claude" => "anthropic".into(),
        _ => raw,
    }
}

pub fn profile(name: &str) -> Option<&'static ProviderProfile> {
    PROFILES.iter().find(|p| p.name == name)
}

/// Canonical provider names, sorted.
pub fn list_providers() -> Vec<&'static str> {
    let mut names: Vec<_> = PROFILES.iter().map(|p| p.name).collect();
    names.sort_unstable();
    names
}

/// A provider profile merged with config and environment.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedProvider {
    pub provider: String,
    pub label: String,
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Variable the key came from (`config` when set in the config file)
    pub key_source: Option<String>,
    pub base_url: String,
    pub model: String,
    pub openai_compatible: bool,
    pub hint: String,
}

impl ResolvedProvider {
    /// Resolve `name` (or the configured provider) against config and `env`.
    ///
    /// Unknown names fall back to the default profile. Model and base-URL
    /// overrides from `[agent]` only apply to the configured provider.
    pub fn resolve(config: &AppConfig, name: Option<&str>, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let requested = normalize_provider(name.unwrap_or(&config.agent.provider));
        let configured = normalize_provider(&config.agent.provider);
        let (profile, provider) = match profile(&requested) {
            Some(p) => (p, requested),
            None => {
                tracing::warn!(provider = %requested, fallback = FALLBACK_PROVIDER, "Unknown provider");
                (&PROFILES[0], FALLBACK_PROVIDER.to_string())
            }
        };
        let overrides = config.providers.get(&provider);
        let is_configured = provider == configured;

        let (api_key, key_source) = resolve_key(config, profile, env);

        let base_url = is_configured
            .then(|| config.agent.base_url.clone())
            .flatten()
            .or_else(|| overrides.and_then(|o| o.base_url.clone()))
            .unwrap_or_else(|| profile.base_url.to_string());

        let model = is_configured
            .then(|| config.agent.model.clone())
            .flatten()
            .or_else(|| overrides.and_then(|o| o.default_model.clone()))
            .unwrap_or_else(|| profile.default_model.to_string());

        Self {
            provider,
            label: profile.label.to_string(),
            api_key,
            key_source,
            base_url,
            model,
            openai_compatible: profile.openai_compatible,
            hint: profile.hint.to_string(),
        }
    }

    /// Build a streaming client for this provider.
    pub fn build(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        if !self.openai_compatible {
            return Err(ProviderError::NotConfigured(format!(
                "provider {} is not available: {}",
                self.provider, self.hint
            )));
        }
        let Some(key) = self.api_key.as_deref() else {
            return Err(ProviderError::NotConfigured(format!(
                "provider {} has no API key",
                self.provider
            )));
        };
        Ok(Arc::new(OpenAiCompatProvider::new(&self.provider, &self.base_url, key)?))
    }
}

fn resolve_key(
    config: &AppConfig,
    profile: &ProviderProfile,
    env: &dyn Fn(&str) -> Option<String>,
) -> (Option<String>, Option<String>) {
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    if let Some(key) = non_empty(config.api_key.clone()) {
        return (Some(key), Some(UNIVERSAL_KEY_ENV.to_string()));
    }
    if let Some(key) = non_empty(config.providers.get(profile.name).and_then(|o| o.api_key.clone())) {
        return (Some(key), Some("config".to_string()));
    }
    for var in profile.key_envs {
        if let Some(key) = non_empty(env(var)) {
            return (Some(key), Some(var.to_string()));
        }
    }
    (None, None)
}

/// Build the streaming provider selected by `name` (or the config default).
pub fn build_provider(config: &AppConfig, name: Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> {
    ResolvedProvider::resolve(config, name, &|var| std::env::var(var).ok()).build()
}

/// Everything `doctor` reports about a provider's setup.
#[derive(Debug, Clone, Serialize)]
pub struct KeyDiagnostics {
    #[serde(flatten)]
    pub resolved: ResolvedProvider,
    pub has_key: bool,
    /// Each candidate variable and whether it is set, in lookup order
    pub env_status: Vec<(String, bool)>,
    pub cwd: PathBuf,
}

impl KeyDiagnostics {
    pub fn collect(config: &AppConfig, name: Option<&str>, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let resolved = ResolvedProvider::resolve(config, name, env);
        let is_set = |var: &str| env(var).is_some_and(|v| !v.trim().is_empty());

        let mut env_status = vec![(UNIVERSAL_KEY_ENV.to_string(), is_set(UNIVERSAL_KEY_ENV))];
        if let Some(p) = profile(&resolved.provider) {
            env_status.extend(p.key_envs.iter().map(|var| (var.to_string(), is_set(var))));
        }

        Self {
            has_key: resolved.api_key.is_some(),
            resolved,
            env_status,
            cwd: std::env::current_dir().unwrap_or_default(),
        }
    }

    /// Human-readable report lines.
    pub fn lines(&self) -> Vec<String> {
        let r = &self.resolved;
        let mut lines = vec![
            format!("provider={} model={}", r.provider, r.model),
            format!(
                "compatible={} has_key={} from={}",
                r.openai_compatible,
                self.has_key,
                r.key_source.as_deref().unwrap_or("-")
            ),
            format!("base_url={}", if r.base_url.is_empty() { "-" } else { &r.base_url }),
            format!("cwd={}", self.cwd.display()),
        ];
        for (var, set) in &self.env_status {
            lines.push(format!("{var}: {}", if *set { "SET" } else { "MISSING" }));
        }
        if !r.hint.is_empty() {
            lines.push(format!("hint: {}", r.hint));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use steward_config::ProviderConfig;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn aliases_normalize() {
        assert_eq!(normalize_provider("Kimi"), "moonshot");
        assert_eq!(normalize_provider("gpt"), "openai");
        assert_eq!(normalize_provider("router"), "openrouter");
        assert_eq!(normalize_provider("gemini"), "google");
        assert_eq!(normalize_provider("claude"), "anthropic");
        assert_eq!(normalize_provider("  "), "moonshot");
        assert_eq!(normalize_provider("deepseek"), "deepseek");
    }

    #[test]
    fn provider_list_is_sorted() {
        let names = list_providers();
        assert_eq!(names.first(), Some(&"anthropic"));
        assert!(names.contains(&"google"));
        assert_eq!(names.len(), PROFILES.len());
    }

    #[test]
    fn unknown_provider_falls_back() {
        let config = AppConfig::default();
        let r = ResolvedProvider::resolve(&config, Some("nonesuch"), &env(&[]));
        assert_eq!(r.provider, "moonshot");
        assert_eq!(r.model, "moonshot-v1-32k");
    }

    #[test]
    fn profile_keys_in_order() {
        let config = AppConfig::default();
        let r = ResolvedProvider::resolve(
            &config,
            Some("gemini"),
            &env(&[("GEMINI_API_KEY", "g2"), ("GOOGLE_API_KEY", "g1")]),
        );
        assert_eq!(r.api_key.as_deref(), Some("g1"));
        assert_eq!(r.key_source.as_deref(), Some("GOOGLE_API_KEY"));
        assert!(r.base_url.contains("generativelanguage"));
    }

    #[test]
    fn universal_key_wins() {
        let config = AppConfig {
            api_key: Some("universal".into()),
            ..AppConfig::default()
        };
        let r = ResolvedProvider::resolve(&config, None, &env(&[("KIMI_API_KEY", "kimi")]));
        assert_eq!(r.api_key.as_deref(), Some("universal"));
        assert_eq!(r.key_source.as_deref(), Some(UNIVERSAL_KEY_ENV));
    }

    #[test]
    fn agent_overrides_apply_only_to_configured_provider() {
        let mut config = AppConfig::default();
        config.agent.provider = "openai".into();
        config.agent.model = Some("gpt-4o-mini".into());
        config.agent.base_url = Some("http://localhost:9999/v1".into());
        config.providers.insert(
            "deepseek".into(),
            ProviderConfig {
                default_model: Some("deepseek-reasoner".into()),
                ..ProviderConfig::default()
            },
        );

        let openai = ResolvedProvider::resolve(&config, None, &env(&[]));
        assert_eq!(openai.model, "gpt-4o-mini");
        assert_eq!(openai.base_url, "http://localhost:9999/v1");

        let deepseek = ResolvedProvider::resolve(&config, Some("deepseek"), &env(&[]));
        assert_eq!(deepseek.model, "deepseek-reasoner");
        assert_eq!(deepseek.base_url, "https://api.deepseek.com/v1");
    }

    #[test]
    fn build_requires_key_and_compatibility() {
        let config = AppConfig::default();
        let no_key = ResolvedProvider::resolve(&config, Some("openai"), &env(&[]));
        assert!(matches!(no_key.build(), Err(ProviderError::NotConfigured(_))));

        let anthropic = ResolvedProvider::resolve(&config, Some("claude"), &env(&[("ANTHROPIC_API_KEY", "k")]));
        assert!(!anthropic.openai_compatible);
        assert!(anthropic.build().is_err());

        let ok = ResolvedProvider::resolve(&config, Some("openai"), &env(&[("OPENAI_API_KEY", "sk")]));
        assert_eq!(ok.build().unwrap().name(), "openai");
    }

    #[test]
    fn diagnostics_report_env_status() {
        let config = AppConfig::default();
        let diag = KeyDiagnostics::collect(&config, Some("kimi"), &env(&[("MOONSHOT_API_KEY", "m")]));
        assert!(diag.has_key);
        assert_eq!(
            diag.env_status,
            vec![
                ("AI_API_KEY".to_string(), false),
                ("KIMI_API_KEY".to_string(), false),
                ("MOONSHOT_API_KEY".to_string(), true),
            ]
        );
        let lines = diag.lines();
        assert!(lines[0].starts_with("provider=moonshot"));
        assert!(lines.iter().any(|l| l == "MOONSHOT_API_KEY: SET"));
        assert!(lines.iter().any(|l| l.contains("from=MOONSHOT_API_KEY")));
    }
}
