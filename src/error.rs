use std::path::PathBuf;

/// Errors related to bridge settings loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors raised while preparing or driving the agent process.
///
/// These never cross the [`crate::bridge::Bridge`] boundary as `Err` values;
/// the bridge converts them into [`crate::event::AgentEvent::Error`] events.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Sandbox `{container}` is not reachable: {message}")]
    SandboxUnavailable { container: String, message: String },

    #[error("No sandbox configured; set `sandbox.container` or pass --container")]
    SandboxNotConfigured,

    #[error("Failed to spawn `{program}`: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Failed to provision exec shim at {path}: {message}")]
    ShimFailed { path: PathBuf, message: String },

    #[error("Agent process has no {0} pipe")]
    MissingPipe(&'static str),
}

/// Errors related to agent definition discovery.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid agent config at {path}: {message}")]
    Parse { path: PathBuf, message: String },
}
