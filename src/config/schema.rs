use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::bridge::RoutingMode;

/// The TOML file structure for sandbridge.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub bridge: Option<BridgeConfig>,
    pub sandbox: Option<SandboxConfig>,
    pub env: Option<EnvConfig>,
    pub agents: Option<AgentsConfig>,
    pub display: Option<DisplayConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub workspace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    pub mode: Option<RoutingMode>,
    pub agent_binary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SandboxConfig {
    pub container: Option<String>,
    pub workdir: Option<String>,
    pub exec_binary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnvConfig {
    /// Host variable names to forward; a trailing `*` matches by prefix.
    pub forward: Option<Vec<String>>,
    /// Explicit variables, applied after forwarded ones.
    pub vars: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct AgentsConfig {
    pub config_path: Option<String>,
    pub default_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    pub show_tool_details: Option<bool>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host-side workspace root.
    pub workspace: PathBuf,
    pub mode: RoutingMode,
    pub agent_binary: String,
    /// Sandbox identity (container name or id). Empty means unconfigured.
    pub container: String,
    /// Workspace path inside the sandbox.
    pub sandbox_workdir: String,
    /// Wrapper binary used to exec into the sandbox.
    pub exec_binary: String,
    pub forward_env: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Explicit agent config file path; empty means search.
    pub agent_config_path: String,
    pub default_agent: Option<String>,
    pub show_tool_details: bool,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub workspace: Option<PathBuf>,
    pub mode: Option<RoutingMode>,
    pub agent_binary: Option<String>,
    pub container: Option<String>,
    pub sandbox_workdir: Option<String>,
    pub exec_binary: Option<String>,
    pub forward_env: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    pub agent_config_path: Option<String>,
    pub default_agent: Option<String>,
    pub show_tool_details: Option<bool>,
}

impl ConfigFile {
    /// Flatten the sectioned file layout into a mergeable layer.
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general;
        let bridge = self.bridge;
        let sandbox = self.sandbox;
        let env = self.env;
        let agents = self.agents;

        PartialConfig {
            workspace: general.and_then(|g| g.workspace).map(PathBuf::from),
            mode: bridge.as_ref().and_then(|b| b.mode),
            agent_binary: bridge.and_then(|b| b.agent_binary),
            container: sandbox.as_ref().and_then(|s| s.container.clone()),
            sandbox_workdir: sandbox.as_ref().and_then(|s| s.workdir.clone()),
            exec_binary: sandbox.and_then(|s| s.exec_binary),
            forward_env: env.as_ref().and_then(|e| e.forward.clone()),
            env: env.and_then(|e| e.vars),
            agent_config_path: agents.as_ref().and_then(|a| a.config_path.clone()),
            default_agent: agents.and_then(|a| a.default_agent),
            show_tool_details: self.display.and_then(|d| d.show_tool_details),
        }
    }
}
