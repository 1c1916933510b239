//! Available agents, merged from three layers.
//!
//! Later layers override earlier ones by agent id:
//!
//! 1. Built-ins (`build` and `plan`).
//! 2. The first readable config file on the search path (see [`search`]).
//! 3. Markdown agent files in the workspace (see [`markdown`]).
//!
//! A reload re-runs the whole merge and publishes the new set as a full
//! replacement. Consumers should not try to diff it against the old one.

pub mod jsonc;
pub mod markdown;
pub mod search;
pub mod watch;

pub use search::{ConfigCandidate, resolve_config_search_paths};
pub use watch::DirectoryWatcher;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::DirectoryError;
use crate::event::{DEFAULT_AGENT_ID, EventHub};

pub const PLAN_AGENT_ID: &str = "plan";

/// Provider reported when a model string has no `provider/` prefix.
pub const UNKNOWN_PROVIDER: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Primary,
    Subagent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub model: String,
    pub description: Option<String>,
    pub mode: AgentMode,
}

/// The two agents every directory starts with. Provider and model are left to
/// the agent binary's own defaults.
pub fn builtin_agents() -> Vec<Agent> {
    vec![
        Agent {
            id: DEFAULT_AGENT_ID.to_string(),
            display_name: "Build".to_string(),
            provider: "default".to_string(),
            model: "default".to_string(),
            description: Some("General-purpose agent with full tool access".to_string()),
            mode: AgentMode::Primary,
        },
        Agent {
            id: PLAN_AGENT_ID.to_string(),
            display_name: "Plan".to_string(),
            provider: "default".to_string(),
            model: "default".to_string(),
            description: Some("Planning agent; read-only, no edits or shell".to_string()),
            mode: AgentMode::Primary,
        },
    ]
}

/// Split `"provider/model"` on the first slash.
pub fn split_model(spec: &str) -> (String, String) {
    match spec.split_once('/') {
        Some((provider, model)) => (provider.to_string(), model.to_string()),
        None => (UNKNOWN_PROVIDER.to_string(), spec.to_string()),
    }
}

/// One `agent.<id>` entry in the config file.
#[derive(Clone, Debug, Default, Deserialize)]
struct AgentEntry {
    model: Option<String>,
    description: Option<String>,
    mode: Option<String>,
}

impl AgentEntry {
    /// `all` and unrecognised values count as primary.
    fn mode(&self) -> Option<AgentMode> {
        self.mode.as_deref().map(|m| match m {
            "subagent" => AgentMode::Subagent,
            _ => AgentMode::Primary,
        })
    }
}

/// The subset of the agent config file this crate reads.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AgentConfigFile {
    #[serde(default)]
    agent: BTreeMap<String, AgentEntry>,
    default_agent: Option<String>,
}

impl AgentConfigFile {
    pub fn default_agent(&self) -> Option<&str> {
        self.default_agent.as_deref()
    }
}

/// Read and parse one config file in the relaxed JSON dialect.
pub fn load_agent_config(path: &Path) -> Result<AgentConfigFile, DirectoryError> {
    let contents = fs::read_to_string(path).map_err(|source| DirectoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |message: String| DirectoryError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let value = jsonc::parse_relaxed(&contents).map_err(|e| parse_error(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))
}

/// First config on the search path that exists and parses. Broken candidates
/// are logged and skipped.
pub fn find_agent_config(candidates: &[ConfigCandidate]) -> Option<(PathBuf, AgentConfigFile)> {
    for path in candidates.iter().flat_map(ConfigCandidate::files) {
        if !path.is_file() {
            continue;
        }
        match load_agent_config(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded agent config");
                return Some((path, config));
            }
            Err(e) => tracing::warn!("Skipping agent config: {e}"),
        }
    }
    None
}

/// Where a directory reads its layers from.
#[derive(Clone, Debug, Default)]
pub struct DirectorySource {
    pub workspace: Option<PathBuf>,
    /// Explicit config path; empty means search only.
    pub config_path: String,
    /// Default agent that takes priority over the config file's `default_agent`.
    pub default_agent: Option<String>,
}

impl DirectorySource {
    pub fn candidates(&self) -> Vec<ConfigCandidate> {
        resolve_config_search_paths(&self.config_path, self.workspace.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DirectoryChange {
    /// The agent set was rebuilt from scratch.
    Reloaded { agents: Vec<Agent>, active: String },
}

pub struct AgentDirectory {
    source: DirectorySource,
    agents: Vec<Agent>,
    active: String,
    config_file: Option<PathBuf>,
    changes: EventHub<DirectoryChange>,
}

impl AgentDirectory {
    pub fn load(source: DirectorySource) -> Self {
        let mut directory = Self {
            source,
            agents: Vec::new(),
            active: String::new(),
            config_file: None,
            changes: EventHub::new(),
        };
        directory.rebuild();
        directory
    }

    /// Re-run the merge and notify subscribers.
    pub fn reload(&mut self) {
        self.rebuild();
        tracing::info!(count = self.agents.len(), active = %self.active, "Agent directory reloaded");
        self.changes.emit(DirectoryChange::Reloaded {
            agents: self.agents.clone(),
            active: self.active.clone(),
        });
    }

    pub fn subscribe(&self) -> UnboundedReceiver<DirectoryChange> {
        self.changes.subscribe()
    }

    /// Agents in merge order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn active_id(&self) -> &str {
        &self.active
    }

    pub fn active(&self) -> Option<&Agent> {
        self.get(&self.active)
    }

    /// Config file used by the last merge, if any.
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    pub fn source(&self) -> &DirectorySource {
        &self.source
    }

    fn rebuild(&mut self) {
        let mut agents = builtin_agents();

        let config = find_agent_config(&self.source.candidates());
        self.config_file = config.as_ref().map(|(path, _)| path.clone());
        let config = config.map(|(_, c)| c).unwrap_or_default();
        merge_config_agents(&mut agents, &config);

        if let Some(workspace) = &self.source.workspace {
            for md in markdown::discover_markdown_agents(workspace) {
                merge_markdown_agent(&mut agents, md);
            }
        }

        let requested = self
            .source
            .default_agent
            .as_deref()
            .or(config.default_agent());
        self.active = resolve_active(&agents, requested);
        self.agents = agents;
    }
}

fn merge_config_agents(agents: &mut Vec<Agent>, config: &AgentConfigFile) {
    for (id, entry) in &config.agent {
        let existing = agents.iter().position(|a| &a.id == id);
        let base = existing
            .map(|i| agents[i].clone())
            .unwrap_or_else(|| inherit_from_build(agents, id));

        let (provider, model) = match &entry.model {
            Some(spec) => split_model(spec),
            None => (base.provider.clone(), base.model.clone()),
        };
        let agent = Agent {
            provider,
            model,
            description: entry.description.clone().or(base.description),
            mode: entry.mode().unwrap_or(if existing.is_some() {
                base.mode
            } else {
                AgentMode::Primary
            }),
            ..base
        };
        upsert(agents, existing, agent);
    }
}

fn merge_markdown_agent(agents: &mut Vec<Agent>, md: markdown::MarkdownAgent) {
    let existing = agents.iter().position(|a| a.id == md.id);
    let agent = match existing {
        Some(i) => Agent {
            description: md.description.or_else(|| agents[i].description.clone()),
            ..agents[i].clone()
        },
        None => Agent {
            description: md.description,
            mode: AgentMode::Subagent,
            ..inherit_from_build(agents, &md.id)
        },
    };
    upsert(agents, existing, agent);
}

/// A fresh agent with `build`'s provider and model.
fn inherit_from_build(agents: &[Agent], id: &str) -> Agent {
    let (provider, model) = agents
        .iter()
        .find(|a| a.id == DEFAULT_AGENT_ID)
        .map(|a| (a.provider.clone(), a.model.clone()))
        .unwrap_or_else(|| ("default".to_string(), "default".to_string()));
    Agent {
        id: id.to_string(),
        display_name: display_name(id),
        provider,
        model,
        description: None,
        mode: AgentMode::Primary,
    }
}

fn upsert(agents: &mut Vec<Agent>, position: Option<usize>, agent: Agent) {
    match position {
        Some(i) => agents[i] = agent,
        None => agents.push(agent),
    }
}

/// An unknown or missing id falls back to the first agent.
fn resolve_active(agents: &[Agent], requested: Option<&str>) -> String {
    if let Some(id) = requested {
        if agents.iter().any(|a| a.id == id) {
            return id.to_string();
        }
        tracing::warn!(agent = %id, "Configured default agent not found; using first available");
    }
    agents
        .first()
        .map(|a| a.id.clone())
        .unwrap_or_else(|| DEFAULT_AGENT_ID.to_string())
}

fn display_name(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
