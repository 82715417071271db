//! `steward doctor`: Diagnose provider keys and storage paths.

use std::path::Path;

use steward_config::AppConfig;
use steward_providers::KeyDiagnostics;

use super::{env_lookup, load_config};

pub fn run(provider: Option<&str>) -> anyhow::Result<()> {
    println!("Steward Doctor");
    println!("==============\n");

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  config: {}", config_path.display());
    } else {
        println!("  config: {} (missing, using defaults)", config_path.display());
    }
    let config = load_config()?;

    let diagnostics = KeyDiagnostics::collect(&config, provider, &env_lookup);
    println!();
    for line in diagnostics.lines() {
        println!("  {line}");
    }

    println!();
    for line in storage_lines(&config) {
        println!("  {line}");
    }

    println!();
    if diagnostics.has_key && diagnostics.resolved.openai_compatible {
        println!("  Provider is ready.");
    } else {
        println!("  Provider is not usable yet; see above.");
    }
    Ok(())
}

fn storage_lines(config: &AppConfig) -> Vec<String> {
    let status = |p: &Path| if p.exists() { "ok" } else { "not created yet" };
    let sessions = config.sessions_dir();
    vec![
        format!("sessions:  {} ({})", sessions.display(), status(&sessions)),
        format!(
            "event log: {} ({})",
            config.storage.event_log.display(),
            status(&config.storage.event_log)
        ),
        format!(
            "workspace: {} ({})",
            config.storage.workspace_dir.display(),
            status(&config.storage.workspace_dir)
        ),
    ]
}
