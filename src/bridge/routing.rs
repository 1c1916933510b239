//! Command-line and environment construction for the two routing modes.
//!
//! - [`RoutingMode::Local`]: the agent runs on the host; its sub-shells are
//!   redirected into the sandbox through the exec shim installed as `SHELL`.
//! - [`RoutingMode::Container`]: the agent itself runs inside the sandbox
//!   via `<exec_binary> exec -i -w <workdir> [-e K=V]... <id> <agent> ...`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::sandbox::SandboxInfo;

/// Marker telling child tools that shell calls are being routed into a sandbox.
pub const SANDBOXED_MARKER_VAR: &str = "SANDBRIDGE_SANDBOXED";
pub const CONTAINER_VAR: &str = "SANDBRIDGE_CONTAINER";
pub const WORKDIR_VAR: &str = "SANDBRIDGE_WORKDIR";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Agent on the host, shell calls executed in the sandbox.
    #[default]
    Local,
    /// Agent executed entirely inside the sandbox.
    Container,
}

/// Everything needed to spawn one agent process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Variables added on top of the inherited host environment.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// Arguments for a non-interactive, JSON-output agent run.
pub fn agent_run_args(instruction: &str, agent_id: Option<&str>) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--format".to_string(), "json".to_string()];
    if let Some(agent) = agent_id {
        args.push("--agent".to_string());
        args.push(agent.to_string());
    }
    args.push(instruction.to_string());
    args
}

/// Exact name match, or prefix match when the pattern ends in `*`.
pub fn matches_env_pattern(name: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == pattern,
    }
}

/// Select host variables matching any of `patterns`, then overlay the
/// explicitly configured ones.
pub fn forwarded_env<I>(
    patterns: &[String],
    explicit: &BTreeMap<String, String>,
    host: I,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = host
        .into_iter()
        .filter(|(name, _)| patterns.iter().any(|p| matches_env_pattern(name, p)))
        .collect();
    env.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Variables that turn on shell redirection for a host-side agent.
pub fn local_routing_env(shim: &Path, sandbox: &SandboxInfo) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("SHELL".to_string(), shim.display().to_string()),
        (SANDBOXED_MARKER_VAR.to_string(), "1".to_string()),
        (CONTAINER_VAR.to_string(), sandbox.id.clone()),
        (WORKDIR_VAR.to_string(), sandbox.workdir.clone()),
    ])
}

/// Inputs shared by both launch shapes.
pub struct LaunchContext<'a> {
    pub mode: RoutingMode,
    pub agent_binary: &'a str,
    pub exec_binary: &'a str,
    pub workspace: &'a Path,
    pub sandbox: &'a SandboxInfo,
    /// Prepared environment: forwarded vars, plus routing vars in local mode.
    pub env: &'a BTreeMap<String, String>,
}

pub fn build_launch_spec(
    ctx: &LaunchContext<'_>,
    instruction: &str,
    agent_id: Option<&str>,
) -> LaunchSpec {
    match ctx.mode {
        RoutingMode::Local => LaunchSpec {
            program: ctx.agent_binary.to_string(),
            args: agent_run_args(instruction, agent_id),
            env: ctx.env.clone(),
            cwd: Some(ctx.workspace.to_path_buf()),
        },
        RoutingMode::Container => {
            let mut args = vec![
                "exec".to_string(),
                "-i".to_string(),
                "-w".to_string(),
                ctx.sandbox.workdir.clone(),
            ];
            for (key, value) in ctx.env {
                args.push("-e".to_string());
                args.push(format!("{key}={value}"));
            }
            args.push(ctx.sandbox.id.clone());
            args.push(ctx.agent_binary.to_string());
            args.extend(agent_run_args(instruction, agent_id));

            LaunchSpec {
                program: ctx.exec_binary.to_string(),
                args,
                env: BTreeMap::new(),
                cwd: None,
            }
        }
    }
}
