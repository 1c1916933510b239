//! Exec shim: a generated `sh` script installed as the agent's `SHELL`, so
//! every sub-shell the agent opens runs inside the sandbox instead.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::BridgeError;

pub const SHIM_FILE_NAME: &str = "sandbox-shell";

/// A provisioned shim script. The directory holding it is removed on
/// [`ExecShim::release`] or drop.
#[derive(Debug)]
pub struct ExecShim {
    dir: PathBuf,
    path: PathBuf,
    released: bool,
}

impl ExecShim {
    /// Write the shim into a fresh, uniquely named directory under `base`.
    pub fn provision(
        base: &Path,
        exec_binary: &str,
        container: &str,
        workdir: &str,
    ) -> Result<Self, BridgeError> {
        let dir = base.join(format!("sandbridge-{}", Uuid::new_v4()));
        let path = dir.join(SHIM_FILE_NAME);
        let failed = |e: std::io::Error| BridgeError::ShimFailed {
            path: path.clone(),
            message: e.to_string(),
        };

        fs::create_dir_all(&dir).map_err(failed)?;
        fs::write(&path, render_script(exec_binary, container, workdir)).map_err(failed)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).map_err(failed)?;
        }

        tracing::debug!(path = %path.display(), container, "Provisioned exec shim");
        Ok(Self {
            dir,
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the shim from disk. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove exec shim at {}: {}", self.dir.display(), e);
            }
        }
    }
}

impl Drop for ExecShim {
    fn drop(&mut self) {
        self.release();
    }
}

/// Script body: hand all arguments to `/bin/sh` inside the sandbox.
pub fn render_script(exec_binary: &str, container: &str, workdir: &str) -> String {
    format!(
        "#!/bin/sh\n# Generated by sandbridge. Routes shell invocations into the sandbox.\nexec {} exec -i -w {} {} /bin/sh \"$@\"\n",
        shell_quote(exec_binary),
        shell_quote(workdir),
        shell_quote(container),
    )
}

/// Single-quote `value` for POSIX sh.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn script_execs_into_sandbox_with_quoted_arguments() {
        let script = render_script("docker", "dev box", "/work'space");
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains(
            r#"exec 'docker' exec -i -w '/work'\''space' 'dev box' /bin/sh "$@""#
        ));
    }

    #[test]
    fn provision_writes_executable_script_and_release_removes_it() {
        let base = TempDir::new().unwrap();
        let mut shim = ExecShim::provision(base.path(), "docker", "devbox", "/workspace").unwrap();

        let path = shim.path().to_path_buf();
        assert!(path.exists());
        assert!(path.starts_with(base.path()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        shim.release();
        assert!(!path.exists());
        shim.release();
    }

    #[test]
    fn drop_releases_shim() {
        let base = TempDir::new().unwrap();
        let path = {
            let shim = ExecShim::provision(base.path(), "docker", "devbox", "/workspace").unwrap();
            shim.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
