pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "sandbridge.toml";

/// Load configuration by merging global, workspace, explicit-file and CLI sources.
/// Precedence: CLI > --config file > workspace config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/sandbridge/sandbridge.toml or platform equivalent)
    let global = load_global_config();

    // Determine workspace path from CLI or global config, for loading workspace config.
    let workspace_path = cli_workspace(cli)
        .or_else(|| global.workspace.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    // Layer 2: Workspace config (workspace/sandbridge.toml)
    let workspace = load_workspace_config(&workspace_path);

    // Layer 3: Explicit --config file. Unlike the search layers, a missing or
    // broken explicit file is an error.
    let explicit = match cli_config_path(cli) {
        Some(path) => load_toml_file(path)?.unwrap_or_default(),
        None => PartialConfig::default(),
    };

    // Layer 4: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    let config = cli_partial
        .with_fallback(explicit)
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(p) => load_layer(&p),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load workspace config from workspace/sandbridge.toml.
/// Returns empty PartialConfig if file not found.
fn load_workspace_config(workspace_path: &Path) -> PartialConfig {
    load_layer(&workspace_path.join(CONFIG_FILE_NAME))
}

/// Load a search-path layer, logging and skipping anything unreadable.
fn load_layer(path: &Path) -> PartialConfig {
    match load_toml_file(path) {
        Ok(Some(partial)) => partial,
        Ok(None) => PartialConfig::default(),
        Err(e) => {
            tracing::warn!("Config parse error: {:#}", e);
            PartialConfig::default()
        }
    }
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_file(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config_file =
                toml::from_str::<ConfigFile>(&contents).map_err(|e| ConfigError::ParseError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            tracing::info!("Loaded config from {}", path.display());
            Ok(Some(config_file.to_partial()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(None)
        }
        Err(e) => Err(ConfigError::IoError(e)),
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/sandbridge/sandbridge.toml
/// macOS: ~/Library/Application Support/sandbridge/sandbridge.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sandbridge")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Extract workspace path from CLI args.
fn cli_workspace(cli: &Cli) -> Option<PathBuf> {
    match &cli.command {
        Commands::Prompt { workspace, .. } => workspace.clone(),
        Commands::Agents { workspace, .. } => workspace.clone(),
    }
}

fn cli_config_path(cli: &Cli) -> Option<&Path> {
    match &cli.command {
        Commands::Prompt { config, .. } | Commands::Agents { config, .. } => config.as_deref(),
    }
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Prompt {
            mode,
            container,
            workspace,
            hide_tools,
            ..
        } => PartialConfig {
            mode: *mode,
            container: container.clone(),
            workspace: workspace.clone(),
            show_tool_details: hide_tools.then_some(false),
            ..Default::default()
        },
        Commands::Agents { workspace, .. } => PartialConfig {
            workspace: workspace.clone(),
            ..Default::default()
        },
    }
}
