//! Stateless mapping from events to side effects on a response stream.
//!
//! A [`ResponseSink`] is whatever renders output for the chat surface. The
//! core never talks to a UI directly; it calls [`project`] once per event and
//! [`render_summary`] once per finished request.

use chrono::{Duration, Utc};
use serde_json::Value;

use crate::event::{AgentEvent, SubTaskOutcome};
use crate::tracker::{SubTask, SubTaskStatus};

/// Maximum characters of a tool result shown before truncating.
pub const RESULT_PREVIEW_CHARS: usize = 500;
pub const TRUNCATION_MARKER: &str = "\n… (truncated)";

/// Argument keys that best describe a tool call, in preference order.
const SUMMARY_KEYS: &[&str] = &["command", "filePath", "path", "pattern", "url"];

/// Output primitives offered by a chat surface.
pub trait ResponseSink {
    /// Transient progress indicator.
    fn progress(&mut self, message: &str);
    /// Append markdown to the response body.
    fn emit_content(&mut self, markdown: &str);
    /// Offer a follow-up action button.
    fn offer_action(&mut self, label: &str);
}

#[derive(Clone, Copy, Debug)]
pub struct ProjectionOptions {
    /// Render tool invocations and results inline.
    pub show_tool_details: bool,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            show_tool_details: true,
        }
    }
}

/// Render one event. `done` has no direct effect; the caller renders the
/// summary after reading tracker state.
pub fn project(event: &AgentEvent, options: &ProjectionOptions, sink: &mut dyn ResponseSink) {
    match event {
        AgentEvent::Status { message, .. } => sink.progress(message),
        AgentEvent::Text { content, .. } => sink.emit_content(content),
        AgentEvent::ToolStart { tool, args, .. } => {
            if options.show_tool_details {
                sink.emit_content(&format!("\n**{tool}** `{}`\n", summarize_args(args)));
            }
            sink.progress(&format!("Running {tool}..."));
        }
        AgentEvent::ToolEnd { result, .. } => {
            if options.show_tool_details && !result.is_empty() {
                sink.emit_content(&format!("\n```\n{}\n```\n", preview(result)));
            }
        }
        AgentEvent::SubtaskStart { name, .. } => sink.progress(&format!("SubTask {name} started")),
        AgentEvent::SubtaskEnd {
            id,
            status: SubTaskOutcome::Failed,
        } => sink.emit_content(&format!("\n> SubTask `{id}` failed\n")),
        AgentEvent::SubtaskEnd { .. } => {}
        AgentEvent::Error { message } => {
            sink.emit_content(&format!("\n```error\n{message}\n```\n"));
        }
        AgentEvent::Done { .. } => {}
    }
}

/// One line per tracked sub-task with status, elapsed time and tool-call count.
pub fn render_summary(tasks: &[SubTask], sink: &mut dyn ResponseSink) {
    if tasks.is_empty() {
        return;
    }
    let now = Utc::now();
    let mut lines = vec!["\n---\n**Sub-tasks**\n".to_string()];
    for task in tasks {
        lines.push(format_summary_line(task, task.elapsed(now)));
    }
    sink.emit_content(&lines.join("\n"));
}

fn format_summary_line(task: &SubTask, elapsed: Duration) -> String {
    let calls = task.tool_calls.len();
    let noun = if calls == 1 { "tool call" } else { "tool calls" };
    format!(
        "- {} {} ({}, {}, {calls} {noun})",
        status_icon(task.status),
        task.name,
        task.status.as_str(),
        format_elapsed(elapsed),
    )
}

fn status_icon(status: SubTaskStatus) -> &'static str {
    match status {
        SubTaskStatus::Running => "[*]",
        SubTaskStatus::Completed => "[+]",
        SubTaskStatus::Failed => "[!]",
        SubTaskStatus::Cancelled => "[x]",
    }
}

/// `"850ms"` below one second, `"3.2s"` otherwise.
pub fn format_elapsed(elapsed: Duration) -> String {
    let ms = elapsed.num_milliseconds().max(0);
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Short description of a tool call's arguments.
pub fn summarize_args(args: &Value) -> String {
    SUMMARY_KEYS
        .iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| args.to_string())
}

fn preview(result: &str) -> String {
    match result.char_indices().nth(RESULT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &result[..cut]),
        None => result.to_string(),
    }
}
