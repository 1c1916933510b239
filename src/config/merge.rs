use super::schema::{AppConfig, PartialConfig};
use crate::bridge::RoutingMode;
use std::path::PathBuf;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For forward_env and env: REPLACE semantics (if self has Some, use it entirely).
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            workspace: self.workspace.or(fallback.workspace),
            mode: self.mode.or(fallback.mode),
            agent_binary: self.agent_binary.or(fallback.agent_binary),
            container: self.container.or(fallback.container),
            sandbox_workdir: self.sandbox_workdir.or(fallback.sandbox_workdir),
            exec_binary: self.exec_binary.or(fallback.exec_binary),
            forward_env: self.forward_env.or(fallback.forward_env),
            env: self.env.or(fallback.env),
            agent_config_path: self.agent_config_path.or(fallback.agent_config_path),
            default_agent: self.default_agent.or(fallback.default_agent),
            show_tool_details: self.show_tool_details.or(fallback.show_tool_details),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        AppConfig {
            workspace: self.workspace.unwrap_or_else(|| PathBuf::from(".")),
            mode: self.mode.unwrap_or(RoutingMode::Local),
            agent_binary: self.agent_binary.unwrap_or_else(|| "opencode".to_string()),
            container: self.container.unwrap_or_default(),
            sandbox_workdir: self
                .sandbox_workdir
                .unwrap_or_else(|| "/workspace".to_string()),
            exec_binary: self.exec_binary.unwrap_or_else(|| "docker".to_string()),
            forward_env: self.forward_env.unwrap_or_default(),
            env: self.env.unwrap_or_default(),
            agent_config_path: self.agent_config_path.unwrap_or_default(),
            default_agent: self.default_agent.filter(|id| !id.trim().is_empty()),
            show_tool_details: self.show_tool_details.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn higher_layer_wins_per_field() {
        let cli = PartialConfig {
            container: Some("dev".into()),
            ..Default::default()
        };
        let workspace = PartialConfig {
            container: Some("ignored".into()),
            mode: Some(RoutingMode::Container),
            ..Default::default()
        };
        let config = cli.with_fallback(workspace).finalize();
        assert_eq!(config.container, "dev");
        assert_eq!(config.mode, RoutingMode::Container);
    }

    #[test]
    fn env_tables_replace_rather_than_merge() {
        let upper = PartialConfig {
            env: Some(BTreeMap::from([("A".to_string(), "1".to_string())])),
            ..Default::default()
        };
        let lower = PartialConfig {
            env: Some(BTreeMap::from([("B".to_string(), "2".to_string())])),
            ..Default::default()
        };
        let config = upper.with_fallback(lower).finalize();
        assert_eq!(config.env.len(), 1);
        assert_eq!(config.env["A"], "1");
    }

    #[test]
    fn defaults_fill_gaps() {
        let config = PartialConfig::default().finalize();
        assert_eq!(config.mode, RoutingMode::Local);
        assert_eq!(config.agent_binary, "opencode");
        assert_eq!(config.exec_binary, "docker");
        assert_eq!(config.sandbox_workdir, "/workspace");
        assert!(config.container.is_empty());
        assert!(config.show_tool_details);
        assert_eq!(config.default_agent, None);
    }
}
