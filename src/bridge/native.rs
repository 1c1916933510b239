//! Mapping from the agent's native JSON output onto [`AgentEvent`].
//!
//! The native schema is not consistent about field names (`tool` vs `name`,
//! `text` vs `content`, `subagentId` vs `subTaskId`). Each target field lists
//! its accepted source names in priority order; the first one present wins,
//! otherwise a literal default applies.

use serde_json::{Map, Value};

use crate::event::{AgentEvent, SubTaskOutcome};

const TEXT_FIELDS: &[&str] = &["text", "content"];
const MESSAGE_FIELDS: &[&str] = &["message", "text"];
const ERROR_FIELDS: &[&str] = &["message", "error"];
const AGENT_FIELDS: &[&str] = &["agentId", "agent"];
const TOOL_FIELDS: &[&str] = &["tool", "name"];
const ARGS_FIELDS: &[&str] = &["args", "input"];
const RESULT_FIELDS: &[&str] = &["result", "output"];
const SUBTASK_REF_FIELDS: &[&str] = &["subagentId", "subTaskId"];
const ID_FIELDS: &[&str] = &["id"];
const NAME_FIELDS: &[&str] = &["name", "id"];
const PARENT_FIELDS: &[&str] = &["parent", "parentId"];
const STATUS_FIELDS: &[&str] = &["status"];

/// Native tags and the schema variant each maps onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NativeKind {
    Text,
    Status,
    Done,
    Error,
    ToolStart,
    ToolEnd,
    SubagentStart,
    SubagentEnd,
    StepStart,
    StepFinish,
}

const NATIVE_TAGS: &[(&str, NativeKind)] = &[
    ("text", NativeKind::Text),
    ("status", NativeKind::Status),
    ("done", NativeKind::Done),
    ("error", NativeKind::Error),
    ("tool_start", NativeKind::ToolStart),
    ("tool_end", NativeKind::ToolEnd),
    ("subagent_start", NativeKind::SubagentStart),
    ("subagent_end", NativeKind::SubagentEnd),
    ("step_start", NativeKind::StepStart),
    ("step_finish", NativeKind::StepFinish),
];

/// How one stdout line was interpreted.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeLine {
    /// A typed JSON line mapped onto the schema.
    Event(AgentEvent),
    /// A typed JSON line with nothing usable in it.
    Dropped { tag: String },
    /// Not a typed JSON object; hand to the heuristic adapter.
    Unstructured,
}

/// Interpret one stdout line. `agent_id` fills in events that omit one.
pub fn map_native_line(line: &str, agent_id: &str) -> NativeLine {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return NativeLine::Unstructured;
    }
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) else {
        return NativeLine::Unstructured;
    };
    let Some(tag) = object.get("type").and_then(Value::as_str) else {
        return NativeLine::Unstructured;
    };

    match NATIVE_TAGS.iter().find(|(name, _)| *name == tag) {
        Some((_, kind)) => match map_kind(*kind, &object, agent_id) {
            Some(event) => NativeLine::Event(event),
            None => NativeLine::Dropped {
                tag: tag.to_string(),
            },
        },
        None => match first_str(&object, TEXT_FIELDS) {
            Some(text) => NativeLine::Event(AgentEvent::text(text, agent_id)),
            None => NativeLine::Dropped {
                tag: tag.to_string(),
            },
        },
    }
}

/// Returns `None` for sub-agent events without an id, which cannot be tracked.
fn map_kind(
    kind: NativeKind,
    object: &Map<String, Value>,
    default_agent: &str,
) -> Option<AgentEvent> {
    let agent = || str_or(object, AGENT_FIELDS, default_agent);

    let event = match kind {
        NativeKind::Text => AgentEvent::Text {
            content: str_or(object, TEXT_FIELDS, ""),
            agent_id: agent(),
        },
        NativeKind::Status => AgentEvent::Status {
            message: str_or(object, MESSAGE_FIELDS, ""),
            agent_id: agent(),
        },
        NativeKind::StepStart => AgentEvent::Status {
            message: str_or(object, MESSAGE_FIELDS, "Working..."),
            agent_id: agent(),
        },
        NativeKind::Done | NativeKind::StepFinish => AgentEvent::Done { agent_id: agent() },
        NativeKind::Error => AgentEvent::Error {
            message: str_or(object, ERROR_FIELDS, "Unknown error"),
        },
        NativeKind::ToolStart => AgentEvent::ToolStart {
            tool: str_or(object, TOOL_FIELDS, "unknown"),
            args: first_value(object, ARGS_FIELDS)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            sub_task_id: first_str(object, SUBTASK_REF_FIELDS),
        },
        NativeKind::ToolEnd => AgentEvent::ToolEnd {
            tool: str_or(object, TOOL_FIELDS, "unknown"),
            result: first_value(object, RESULT_FIELDS)
                .map(value_to_text)
                .unwrap_or_default(),
            sub_task_id: first_str(object, SUBTASK_REF_FIELDS),
        },
        NativeKind::SubagentStart => {
            let id = subagent_id(object)?;
            AgentEvent::SubtaskStart {
                name: first_str(object, NAME_FIELDS).unwrap_or_else(|| id.clone()),
                id,
                parent_id: first_str(object, PARENT_FIELDS),
            }
        }
        NativeKind::SubagentEnd => AgentEvent::SubtaskEnd {
            id: subagent_id(object)?,
            status: parse_outcome(first_str(object, STATUS_FIELDS).as_deref()),
        },
    };
    Some(event)
}

fn subagent_id(object: &Map<String, Value>) -> Option<String> {
    first_str(object, ID_FIELDS).filter(|id| !id.trim().is_empty())
}

/// Anything not explicitly failed or cancelled counts as completed.
fn parse_outcome(status: Option<&str>) -> SubTaskOutcome {
    match status.map(str::to_ascii_lowercase).as_deref() {
        Some("failed" | "error" | "errored") => SubTaskOutcome::Failed,
        Some("cancelled" | "canceled" | "aborted" | "killed") => SubTaskOutcome::Cancelled,
        _ => SubTaskOutcome::Completed,
    }
}

fn first_value<'a>(object: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| object.get(*field).filter(|v| !v.is_null()))
}

fn first_str(object: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

fn str_or(object: &Map<String, Value>, fields: &[&str], default: &str) -> String {
    first_str(object, fields).unwrap_or_else(|| default.to_string())
}

/// Render a tool result for display: strings verbatim, everything else as JSON.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
