//! Pattern matchers for unstructured agent output.
//!
//! Each matcher is a pure function of `(line, agent_id)` that either
//! recognizes the line and returns an event, or returns `None`. [`MATCHERS`]
//! fixes their priority; [`classify`] returns the first hit.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::event::{AgentEvent, SubTaskOutcome};

/// A single line classifier. Receives an already-trimmed, ANSI-free line.
pub type Matcher = fn(&str, &str) -> Option<AgentEvent>;

/// Matchers in priority order. First match wins.
pub const MATCHERS: &[(&str, Matcher)] = &[
    ("embedded_json", embedded_json),
    ("status_line", status_line),
    ("tool_invocation", tool_invocation),
    ("subtask_lifecycle", subtask_lifecycle),
    ("completion", completion),
    ("error_line", error_line),
];

const SPINNER_GLYPHS: &[char] = &[
    '⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏', '◐', '◓', '◑', '◒', '⣾', '⣽', '⣻', '⢿',
    '⡿', '⣟', '⣯', '⣷',
];

const STATUS_PREFIXES: &[&str] = &["[status]", "Status:"];

/// `(line prefix, tool name, argument key)`.
const TOOL_PREFIXES: &[(&str, &str, &str)] = &[
    ("Running:", "bash", "command"),
    ("Executing:", "bash", "command"),
    ("Reading:", "read", "filePath"),
    ("Editing:", "edit", "filePath"),
    ("Writing:", "write", "filePath"),
];

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .unwrap()
});

static SUBTASK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\[(?:subagent|task):\s*([^\]]+?)\s*\]\s+(started|starting|finished|completed|failed|cancelled|stopped)\b",
    )
    .unwrap()
});

static COMPLETION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:Done\.?|Finished\.|Complete!)$").unwrap());

static ERROR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:Error|ERROR|error):\s*\S").unwrap());

/// Remove terminal escape sequences (colours, cursor movement, OSC titles).
pub fn strip_ansi(input: &str) -> Cow<'_, str> {
    if !input.contains('\x1b') {
        return Cow::Borrowed(input);
    }
    ANSI_ESCAPE.replace_all(input, "")
}

/// Run `line` through [`MATCHERS`] and return the first recognized event.
pub fn classify(line: &str, agent_id: &str) -> Option<AgentEvent> {
    MATCHERS.iter().find_map(|(_, matcher)| matcher(line, agent_id))
}

/// A JSON object somewhere in the line whose `type` is a schema tag.
pub fn embedded_json(line: &str, agent_id: &str) -> Option<AgentEvent> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    if end <= start {
        return None;
    }

    let mut object: Map<String, Value> = serde_json::from_str(&line[start..=end]).ok()?;
    let tag = object.get("type")?.as_str()?.to_string();
    if !AgentEvent::is_schema_tag(&tag) {
        return None;
    }
    if matches!(tag.as_str(), "status" | "text" | "done") {
        object
            .entry("agentId")
            .or_insert_with(|| Value::String(agent_id.to_string()));
    }
    serde_json::from_value(Value::Object(object)).ok()
}

/// Spinner-prefixed or explicitly marked status lines.
pub fn status_line(line: &str, agent_id: &str) -> Option<AgentEvent> {
    let rest = if let Some(first) = line.chars().next().filter(|c| SPINNER_GLYPHS.contains(c)) {
        &line[first.len_utf8()..]
    } else {
        STATUS_PREFIXES
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))?
    };

    let message = rest.trim();
    if message.is_empty() {
        return None;
    }
    Some(AgentEvent::status(message, agent_id))
}

/// `Running: cargo test`, `Reading: src/lib.rs`, ...
pub fn tool_invocation(line: &str, _agent_id: &str) -> Option<AgentEvent> {
    TOOL_PREFIXES.iter().find_map(|(prefix, tool, key)| {
        let value = line.strip_prefix(prefix)?.trim();
        if value.is_empty() {
            return None;
        }
        let mut args = Map::new();
        args.insert((*key).to_string(), Value::String(value.to_string()));
        Some(AgentEvent::ToolStart {
            tool: (*tool).to_string(),
            args: Value::Object(args),
            sub_task_id: None,
        })
    })
}

/// `[subagent:explore] started`, `[task:review] failed`, ...
pub fn subtask_lifecycle(line: &str, _agent_id: &str) -> Option<AgentEvent> {
    let caps = SUBTASK_TAG.captures(line)?;
    let name = caps.get(1)?.as_str().to_string();
    let verb = caps.get(2)?.as_str().to_ascii_lowercase();

    let status = match verb.as_str() {
        "started" | "starting" => {
            return Some(AgentEvent::SubtaskStart {
                id: name.clone(),
                name,
                parent_id: None,
            });
        }
        "failed" => SubTaskOutcome::Failed,
        "cancelled" | "stopped" => SubTaskOutcome::Cancelled,
        _ => SubTaskOutcome::Completed,
    };
    Some(AgentEvent::SubtaskEnd { id: name, status })
}

/// Terminal phrases: `Done`, `Finished.`, `Complete!`.
pub fn completion(line: &str, agent_id: &str) -> Option<AgentEvent> {
    COMPLETION
        .is_match(line)
        .then(|| AgentEvent::done(agent_id))
}

/// `Error: ...` lines.
pub fn error_line(line: &str, _agent_id: &str) -> Option<AgentEvent> {
    ERROR_PREFIX
        .is_match(line)
        .then(|| AgentEvent::error(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_json_passes_schema_events_through() {
        let event = embedded_json(
            r#"log: {"type":"tool_end","tool":"bash","result":"ok","subTaskId":"s1"}"#,
            "build",
        );
        assert_eq!(
            event,
            Some(AgentEvent::ToolEnd {
                tool: "bash".into(),
                result: "ok".into(),
                sub_task_id: Some("s1".into()),
            })
        );
    }

    #[test]
    fn embedded_json_fills_missing_agent_id_from_caller() {
        let event = embedded_json(r#"{"type":"text","content":"hello"}"#, "plan");
        assert_eq!(event, Some(AgentEvent::text("hello", "plan")));
    }

    #[test]
    fn embedded_json_ignores_malformed_and_unknown_tags() {
        assert_eq!(embedded_json(r#"{"type":"text", broken"#, "a"), None);
        assert_eq!(embedded_json(r#"{"type":"step_finish"}"#, "a"), None);
        assert_eq!(embedded_json(r#"{"no":"type"}"#, "a"), None);
        assert_eq!(embedded_json("} backwards {", "a"), None);
    }

    #[test]
    fn status_line_detects_spinners_and_prefixes() {
        assert_eq!(
            status_line("⠋ Thinking...", "build"),
            Some(AgentEvent::status("Thinking...", "build"))
        );
        assert_eq!(
            status_line("[status] indexing", "plan"),
            Some(AgentEvent::status("indexing", "plan"))
        );
        assert_eq!(
            status_line("Status: warming up", "build"),
            Some(AgentEvent::status("warming up", "build"))
        );
        assert_eq!(status_line("⠋", "build"), None);
        assert_eq!(status_line("plain text", "build"), None);
    }

    #[test]
    fn tool_invocation_maps_verbs_to_tools() {
        let cases = [
            ("Running: cargo test", "bash", "command", "cargo test"),
            ("Executing: ls -la", "bash", "command", "ls -la"),
            ("Reading: src/main.rs", "read", "filePath", "src/main.rs"),
            ("Editing: src/lib.rs", "edit", "filePath", "src/lib.rs"),
            ("Writing: notes.md", "write", "filePath", "notes.md"),
        ];
        for (line, tool, key, value) in cases {
            let mut expected_args = Map::new();
            expected_args.insert(key.to_string(), json!(value));
            assert_eq!(
                tool_invocation(line, "build"),
                Some(AgentEvent::ToolStart {
                    tool: tool.into(),
                    args: Value::Object(expected_args),
                    sub_task_id: None,
                }),
                "line: {line}"
            );
        }
        assert_eq!(tool_invocation("Running:", "build"), None);
    }

    #[test]
    fn subtask_lifecycle_maps_verbs_to_outcomes() {
        assert_eq!(
            subtask_lifecycle("[subagent:explore] started", "build"),
            Some(AgentEvent::SubtaskStart {
                id: "explore".into(),
                name: "explore".into(),
                parent_id: None,
            })
        );
        assert_eq!(
            subtask_lifecycle("[task: review ] failed after 3 tries", "build"),
            Some(AgentEvent::SubtaskEnd {
                id: "review".into(),
                status: SubTaskOutcome::Failed,
            })
        );
        assert_eq!(
            subtask_lifecycle("[subagent:explore] stopped", "build"),
            Some(AgentEvent::SubtaskEnd {
                id: "explore".into(),
                status: SubTaskOutcome::Cancelled,
            })
        );
        assert_eq!(
            subtask_lifecycle("[subagent:explore] finished", "build"),
            Some(AgentEvent::SubtaskEnd {
                id: "explore".into(),
                status: SubTaskOutcome::Completed,
            })
        );
        assert_eq!(subtask_lifecycle("[subagent:explore] thinking", "build"), None);
    }

    #[test]
    fn completion_matches_only_terminal_phrases() {
        for line in ["Done", "Done.", "Finished.", "Complete!"] {
            assert_eq!(completion(line, "build"), Some(AgentEvent::done("build")));
        }
        assert_eq!(completion("Done with step one", "build"), None);
    }

    #[test]
    fn error_line_keeps_full_line_as_message() {
        assert_eq!(
            error_line("Error: file not found", "build"),
            Some(AgentEvent::error("Error: file not found"))
        );
        assert_eq!(error_line("Error:", "build"), None);
        assert_eq!(error_line("An Error: mid-line", "build"), None);
    }

    #[test]
    fn classify_respects_priority() {
        // JSON wins even though the line also starts like a tool invocation.
        let line = r#"Running: {"type":"status","message":"json"}"#;
        assert_eq!(
            classify(line, "build"),
            Some(AgentEvent::status("json", "build"))
        );
        assert_eq!(classify("just narration", "build"), None);
    }

    #[test]
    fn strip_ansi_removes_colour_codes() {
        assert_eq!(strip_ansi("\x1b[31mError:\x1b[0m boom"), "Error: boom");
        assert!(matches!(strip_ansi("plain"), Cow::Borrowed(_)));
    }
}
