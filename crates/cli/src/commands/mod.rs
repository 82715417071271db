pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod gateway;
pub mod pricing;
pub mod prompt;
pub mod render;
pub mod replay;
pub mod sessions;
pub mod slash;

use anyhow::Context;
use steward_config::AppConfig;

/// Config file plus environment overrides, validated.
pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// First `max` characters of `text` on one line.
pub fn preview(text: &str, max: usize) -> String {
    let flat: String = text.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();
    if flat.chars().count() <= max {
        flat
    } else {
        let head: String = flat.chars().take(max).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_cuts() {
        assert_eq!(preview("a\nb", 10), "a b");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("héllo", 5), "héllo");
    }
}
