//! Ordered search for the agent config file.

use std::path::{Path, PathBuf};

use directories::BaseDirs;

/// File names tried, in order, inside each candidate directory.
pub const CONFIG_FILE_NAMES: &[&str] = &["opencode.jsonc", "opencode.json"];

/// Per-user config directory, relative to the home directory.
const GLOBAL_CONFIG_DIR: &str = ".config/opencode";

/// A place the agent config may live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigCandidate {
    /// An explicitly configured file.
    File(PathBuf),
    /// A directory searched for each of [`CONFIG_FILE_NAMES`].
    Dir(PathBuf),
}

impl ConfigCandidate {
    /// Concrete file paths to try for this candidate.
    pub fn files(&self) -> Vec<PathBuf> {
        match self {
            ConfigCandidate::File(path) => vec![path.clone()],
            ConfigCandidate::Dir(dir) => CONFIG_FILE_NAMES.iter().map(|n| dir.join(n)).collect(),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        match self {
            ConfigCandidate::File(path) => path.parent(),
            ConfigCandidate::Dir(dir) => Some(dir),
        }
    }
}

/// Search order: explicit path, then workspace root, then the global directory.
pub fn resolve_config_search_paths(
    explicit: &str,
    workspace_root: Option<&Path>,
) -> Vec<ConfigCandidate> {
    let mut candidates = Vec::new();

    let explicit = explicit.trim();
    if !explicit.is_empty() {
        candidates.push(ConfigCandidate::File(expand_tilde(explicit)));
    }
    if let Some(root) = workspace_root {
        candidates.push(ConfigCandidate::Dir(root.to_path_buf()));
    }
    if let Some(global) = global_config_dir() {
        candidates.push(ConfigCandidate::Dir(global));
    }
    candidates
}

pub fn global_config_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(GLOBAL_CONFIG_DIR))
}

/// Expand a leading `~` or `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = || BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    if path == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
