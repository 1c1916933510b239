//! Agents defined as markdown files in the workspace.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace-relative directories scanned for `*.md` agent files.
pub const AGENT_DIRS: &[&str] = &[".opencode/agent", ".opencode/agents"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkdownAgent {
    /// File stem.
    pub id: String,
    pub description: Option<String>,
    pub path: PathBuf,
}

pub fn agent_dirs(workspace: &Path) -> Vec<PathBuf> {
    AGENT_DIRS.iter().map(|d| workspace.join(d)).collect()
}

/// Collect markdown agents from every agent directory, sorted by file name
/// within each directory. Unreadable files are skipped.
pub fn discover_markdown_agents(workspace: &Path) -> Vec<MarkdownAgent> {
    let mut agents = Vec::new();
    for dir in agent_dirs(workspace) {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(contents) => agents.push(MarkdownAgent {
                    id,
                    description: first_line_description(&contents),
                    path,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable agent file: {e}");
                }
            }
        }
    }
    agents
}

/// First non-blank line with leading `#` markers trimmed.
pub fn first_line_description(contents: &str) -> Option<String> {
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_is_first_non_blank_line() {
        assert_eq!(
            first_line_description("\n\n# Reviews pull requests\nbody"),
            Some("Reviews pull requests".into())
        );
        assert_eq!(first_line_description("plain text"), Some("plain text".into()));
        assert_eq!(first_line_description("  \n"), None);
    }

    #[test]
    fn scans_singular_and_plural_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let singular = tmp.path().join(".opencode/agent");
        let plural = tmp.path().join(".opencode/agents");
        fs::create_dir_all(&singular).unwrap();
        fs::create_dir_all(&plural).unwrap();
        fs::write(singular.join("review.md"), "# Review code").unwrap();
        fs::write(plural.join("docs.md"), "Write docs").unwrap();
        fs::write(plural.join("notes.txt"), "ignored").unwrap();

        let agents = discover_markdown_agents(tmp.path());
        let ids: Vec<_> = agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["review", "docs"]);
        assert_eq!(agents[0].description.as_deref(), Some("Review code"));
    }

    #[test]
    fn missing_dirs_yield_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_markdown_agents(tmp.path()).is_empty());
    }
}
