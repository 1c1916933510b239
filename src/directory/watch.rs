//! File-system watch that tells the owner when to reload the directory.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use super::DirectorySource;
use super::markdown::agent_dirs;

/// Quiet period after the last file event before a change is reported.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

pub struct DirectoryWatcher {
    // Dropping the watcher stops delivery.
    _watcher: RecommendedWatcher,
    rx: UnboundedReceiver<()>,
    watched: Vec<PathBuf>,
    debounce: Duration,
}

impl DirectoryWatcher {
    /// Watch every existing config directory and agent directory for `source`.
    pub fn new(source: &DirectorySource) -> notify::Result<Self> {
        let (tx, rx) = unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if res.is_ok() {
                    let _ = tx.send(());
                }
            },
            Config::default(),
        )?;

        let mut dirs: Vec<PathBuf> = source
            .candidates()
            .iter()
            .filter_map(|c| c.dir().map(PathBuf::from))
            .collect();
        if let Some(workspace) = &source.workspace {
            dirs.extend(agent_dirs(workspace));
        }
        dirs.dedup();

        let mut watched = Vec::new();
        for dir in dirs {
            if !dir.is_dir() {
                continue;
            }
            match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => watched.push(dir),
                Err(e) => tracing::warn!(path = %dir.display(), "Cannot watch directory: {e}"),
            }
        }
        tracing::debug!(count = watched.len(), "Watching agent directories");

        Ok(Self {
            _watcher: watcher,
            rx,
            watched,
            debounce: RELOAD_DEBOUNCE,
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Wait for a burst of file events to settle. Returns `false` once the
    /// watcher has shut down.
    pub async fn changed(&mut self) -> bool {
        if self.rx.recv().await.is_none() {
            return false;
        }
        loop {
            match tokio::time::timeout(self.debounce, self.rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return false,
                Err(_) => return true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn source(workspace: &std::path::Path) -> DirectorySource {
        DirectorySource {
            workspace: Some(workspace.to_path_buf()),
            config_path: String::new(),
            default_agent: None,
        }
    }

    #[test]
    fn watches_only_existing_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(".opencode/agents")).unwrap();

        let watcher = DirectoryWatcher::new(&source(tmp.path())).unwrap();
        assert!(watcher.watched().contains(&tmp.path().to_path_buf()));
        assert!(watcher.watched().contains(&tmp.path().join(".opencode/agents")));
        assert!(!watcher.watched().contains(&tmp.path().join(".opencode/agent")));
    }

    #[tokio::test]
    async fn file_write_reports_one_change() {
        let tmp = tempfile::tempdir().unwrap();
        let mut watcher = DirectoryWatcher::new(&source(tmp.path()))
            .unwrap()
            .with_debounce(Duration::from_millis(50));

        fs::write(tmp.path().join("opencode.json"), "{}").unwrap();
        fs::write(tmp.path().join("opencode.json"), r#"{"agent":{}}"#).unwrap();

        let changed = tokio::time::timeout(Duration::from_secs(5), watcher.changed())
            .await
            .unwrap();
        assert!(changed);
    }
}
