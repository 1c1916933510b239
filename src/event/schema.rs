//! Normalized event vocabulary shared by every producer and consumer.
//!
//! [`AgentEvent`] is what the bridge, the heuristic adapter, the activity
//! tracker and the response projection all speak. [`BridgeCommand`] is the
//! command vocabulary for a long-lived agent process driven over stdin; the
//! per-prompt spawn model does not write to stdin, but the types stay here so
//! a persistent mode can slot in behind the same bridge interface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent id used when a producer omits one.
pub const DEFAULT_AGENT_ID: &str = "build";

/// Agent id attached to status lines that originate from the bridge itself
/// (e.g. informational stderr output).
pub const SYSTEM_AGENT_ID: &str = "system";

fn default_agent_id() -> String {
    DEFAULT_AGENT_ID.to_string()
}

/// Terminal outcome reported by a `subtask_end` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// One unit of normalized agent output.
///
/// Serialized as a single JSON object tagged by `type`, with camelCase field
/// names, e.g. `{"type":"tool_end","tool":"bash","result":"ok","subTaskId":"t1"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Transient progress message.
    #[serde(rename_all = "camelCase")]
    Status {
        message: String,
        #[serde(default = "default_agent_id")]
        agent_id: String,
    },

    /// Narration or answer text, rendered as markdown.
    #[serde(rename_all = "camelCase")]
    Text {
        content: String,
        #[serde(default = "default_agent_id")]
        agent_id: String,
    },

    /// A tool invocation began. Paired with [`AgentEvent::ToolEnd`] by
    /// `(sub_task_id, tool)`; there is no call id.
    #[serde(rename_all = "camelCase")]
    ToolStart {
        tool: String,
        #[serde(default)]
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sub_task_id: Option<String>,
    },

    /// A tool invocation finished.
    #[serde(rename_all = "camelCase")]
    ToolEnd {
        tool: String,
        #[serde(default)]
        result: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sub_task_id: Option<String>,
    },

    /// A delegated sub-task started.
    #[serde(rename_all = "camelCase")]
    SubtaskStart {
        id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
    },

    /// A delegated sub-task reached a terminal state.
    SubtaskEnd { id: String, status: SubTaskOutcome },

    /// The agent finished the current request.
    #[serde(rename_all = "camelCase")]
    Done {
        #[serde(default = "default_agent_id")]
        agent_id: String,
    },

    /// A user-visible failure.
    Error { message: String },
}

impl AgentEvent {
    /// The `type` tag this event serializes with.
    pub fn tag(&self) -> &'static str {
        match self {
            AgentEvent::Status { .. } => "status",
            AgentEvent::Text { .. } => "text",
            AgentEvent::ToolStart { .. } => "tool_start",
            AgentEvent::ToolEnd { .. } => "tool_end",
            AgentEvent::SubtaskStart { .. } => "subtask_start",
            AgentEvent::SubtaskEnd { .. } => "subtask_end",
            AgentEvent::Done { .. } => "done",
            AgentEvent::Error { .. } => "error",
        }
    }

    /// Whether `tag` names one of the schema variants.
    pub fn is_schema_tag(tag: &str) -> bool {
        matches!(
            tag,
            "status"
                | "text"
                | "tool_start"
                | "tool_end"
                | "subtask_start"
                | "subtask_end"
                | "done"
                | "error"
        )
    }

    pub fn text(content: impl Into<String>, agent_id: impl Into<String>) -> Self {
        AgentEvent::Text {
            content: content.into(),
            agent_id: agent_id.into(),
        }
    }

    pub fn status(message: impl Into<String>, agent_id: impl Into<String>) -> Self {
        AgentEvent::Status {
            message: message.into(),
            agent_id: agent_id.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        AgentEvent::Error {
            message: message.into(),
        }
    }

    pub fn done(agent_id: impl Into<String>) -> Self {
        AgentEvent::Done {
            agent_id: agent_id.into(),
        }
    }
}

/// Lifecycle state of the process bridge.
///
/// `Stopped --start--> Idle --prompt--> Busy --done/exit--> Idle`; any state
/// may fall into `Error`, which a later successful `start` leaves again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Idle,
    Busy,
    Error,
    #[default]
    Stopped,
}

impl BridgeState {
    /// True for `Idle` and `Busy`.
    pub fn is_running(self) -> bool {
        matches!(self, BridgeState::Idle | BridgeState::Busy)
    }
}

/// Commands understood by a long-lived agent process, one JSON object per
/// stdin line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    Prompt {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        references: Option<Vec<String>>,
    },
    Cancel,
    Config {
        agent: String,
        provider: String,
        model: String,
    },
}

impl BridgeCommand {
    /// Serialize as a newline-terminated JSON line ready for stdin.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags_and_camel_case_fields() {
        let event = AgentEvent::ToolEnd {
            tool: "bash".into(),
            result: "ok".into(),
            sub_task_id: Some("t1".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_end");
        assert_eq!(json["subTaskId"], "t1");
        assert_eq!(event.tag(), "tool_end");
    }

    #[test]
    fn missing_agent_id_defaults_to_build() {
        let event: AgentEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(event, AgentEvent::done(DEFAULT_AGENT_ID));

        let event: AgentEvent =
            serde_json::from_str(r#"{"type":"text","content":"hi"}"#).unwrap();
        assert_eq!(event, AgentEvent::text("hi", "build"));
    }

    #[test]
    fn subtask_end_parses_outcome() {
        let event: AgentEvent =
            serde_json::from_str(r#"{"type":"subtask_end","id":"a","status":"cancelled"}"#)
                .unwrap();
        assert_eq!(
            event,
            AgentEvent::SubtaskEnd {
                id: "a".into(),
                status: SubTaskOutcome::Cancelled
            }
        );
    }

    #[test]
    fn schema_tags_cover_every_variant() {
        let samples = [
            AgentEvent::status("s", "a"),
            AgentEvent::text("t", "a"),
            AgentEvent::ToolStart {
                tool: "x".into(),
                args: Value::Null,
                sub_task_id: None,
            },
            AgentEvent::ToolEnd {
                tool: "x".into(),
                result: String::new(),
                sub_task_id: None,
            },
            AgentEvent::SubtaskStart {
                id: "i".into(),
                name: "n".into(),
                parent_id: None,
            },
            AgentEvent::SubtaskEnd {
                id: "i".into(),
                status: SubTaskOutcome::Completed,
            },
            AgentEvent::done("a"),
            AgentEvent::error("e"),
        ];
        for event in &samples {
            assert!(AgentEvent::is_schema_tag(event.tag()));
        }
        assert!(!AgentEvent::is_schema_tag("step_finish"));
    }

    #[test]
    fn bridge_state_running_only_when_idle_or_busy() {
        assert!(BridgeState::Idle.is_running());
        assert!(BridgeState::Busy.is_running());
        assert!(!BridgeState::Error.is_running());
        assert!(!BridgeState::Stopped.is_running());
        assert_eq!(BridgeState::default(), BridgeState::Stopped);
    }

    #[test]
    fn commands_serialize_as_single_lines() {
        let line = BridgeCommand::Prompt {
            text: "hi".into(),
            agent: Some("plan".into()),
            references: None,
        }
        .to_line()
        .unwrap();
        assert_eq!(line, "{\"type\":\"prompt\",\"text\":\"hi\",\"agent\":\"plan\"}\n");

        assert_eq!(BridgeCommand::Cancel.to_line().unwrap(), "{\"type\":\"cancel\"}\n");
    }
}
