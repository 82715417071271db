//! `steward config`: Configuration management commands.

use clap::Subcommand;
use steward_config::AppConfig;

use super::load_config;

#[derive(Subcommand, Default, Clone, Copy, Debug, PartialEq)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    #[default]
    Show,
    /// Check the configuration and report problems
    Validate,
    /// Print the config file path
    Path,
    /// Print the built-in defaults as TOML
    Defaults,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config()?;
            println!("# {}", config_path().display());
            println!("{}", toml::to_string_pretty(&redacted(config))?);
        }
        ConfigAction::Validate => match load_config() {
            Ok(config) => {
                println!("Config is valid");
                println!("   Provider:  {}", config.agent.provider);
                println!("   Mode:      {}", config.agent.mode);
                println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
                println!("   Sessions:  {}", config.sessions_dir().display());
                println!("   Risky:     {} tools", config.approval.risky_tools.len());
            }
            Err(e) => {
                println!("Config error: {e:#}");
                return Err(e);
            }
        },
        ConfigAction::Path => println!("{}", config_path().display()),
        ConfigAction::Defaults => println!("{}", AppConfig::default_toml()),
    }
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}

/// Replace every API key with a marker.
fn redacted(mut config: AppConfig) -> AppConfig {
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("[REDACTED]".into());
        }
    };
    mask(&mut config.api_key);
    for provider in config.providers.values_mut() {
        mask(&mut provider.api_key);
    }
    config
}
