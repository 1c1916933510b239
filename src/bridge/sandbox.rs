//! Sandbox reachability probe.
//!
//! The bridge does not manage the sandbox lifecycle; it only asks whether the
//! configured sandbox is up and where the workspace lives inside it.

use std::future::Future;
use std::pin::Pin;

use tokio::process::Command;

use crate::error::BridgeError;

/// Identity and workspace location of a reachable sandbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxInfo {
    pub id: String,
    pub workdir: String,
}

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<SandboxInfo, BridgeError>> + Send + 'a>>;

pub trait Sandbox: Send + Sync {
    /// Check that the sandbox is addressable and report its identity.
    fn probe(&self) -> ProbeFuture<'_>;
}

/// A container addressed through a docker-compatible CLI.
pub struct DockerSandbox {
    exec_binary: String,
    container: String,
    workdir: String,
}

impl DockerSandbox {
    pub fn new(
        exec_binary: impl Into<String>,
        container: impl Into<String>,
        workdir: impl Into<String>,
    ) -> Self {
        Self {
            exec_binary: exec_binary.into(),
            container: container.into(),
            workdir: workdir.into(),
        }
    }

    async fn inspect(&self) -> Result<SandboxInfo, BridgeError> {
        if self.container.trim().is_empty() {
            return Err(BridgeError::SandboxNotConfigured);
        }

        let unavailable = |message: String| BridgeError::SandboxUnavailable {
            container: self.container.clone(),
            message,
        };

        let output = Command::new(&self.exec_binary)
            .args(["inspect", "-f", "{{.State.Running}}", self.container.as_str()])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| unavailable(format!("failed to run `{}`: {e}", self.exec_binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(unavailable(if stderr.is_empty() {
                format!("`{} inspect` exited with {}", self.exec_binary, output.status)
            } else {
                stderr
            }));
        }

        let running = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if running != "true" {
            return Err(unavailable("container is not running".to_string()));
        }

        Ok(SandboxInfo {
            id: self.container.clone(),
            workdir: self.workdir.clone(),
        })
    }
}

impl Sandbox for DockerSandbox {
    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(self.inspect())
    }
}
