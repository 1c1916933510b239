//! Process spawning seam.
//!
//! [`ProcessLauncher`] is the real implementation; tests substitute their own
//! [`Launcher`] to observe launch specs and script the child's output.

use std::process::Stdio;

use tokio::process::{Child, Command};

use super::routing::LaunchSpec;

pub trait Launcher: Send + Sync {
    /// Spawn the process described by `spec` with piped stdout and stderr.
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Child>;
}

/// Spawns agent processes with `tokio::process`.
///
/// The child runs in its own process group (`process_group(0)`) so that a
/// cancel can signal the agent together with any tools it started, and has
/// `kill_on_drop(true)` as a safety net.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Child> {
        // process_group(0) requires the CommandExt trait on Unix.
        #[allow(unused_imports)]
        use std::os::unix::process::CommandExt;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        command.spawn()
    }
}
