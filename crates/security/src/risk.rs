//! Risk policy: the static set of tools that need approval.

use std::collections::HashSet;

use steward_config::{AppConfig, DEFAULT_RISKY_TOOLS};

#[derive(Debug, Clone)]
pub struct RiskPolicy {
    risky: HashSet<String>,
}

impl RiskPolicy {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            risky: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.approval.risky_tools.iter().cloned())
    }

    pub fn is_risky(&self, tool: &str) -> bool {
        self.risky.contains(tool)
    }

    /// Risky tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.risky.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RISKY_TOOLS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_covers_destructive_tools() {
        let policy = RiskPolicy::default();
        assert!(policy.is_risky("delete_file"));
        assert!(policy.is_risky("write_file"));
        assert!(policy.is_risky("run_command"));
        assert!(!policy.is_risky("read_file"));
        assert!(!policy.is_risky("list_dir"));
    }

    #[test]
    fn config_overrides_set() {
        let mut config = AppConfig::default();
        config.approval.risky_tools = vec!["read_file".into()];
        let policy = RiskPolicy::from_config(&config);
        assert!(policy.is_risky("read_file"));
        assert!(!policy.is_risky("delete_file"));
        assert_eq!(policy.names(), vec!["read_file"]);
    }
}
