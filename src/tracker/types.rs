//! Type definitions for the activity tracker.
//!
//! These types are the shared vocabulary between the [`super::ActivityTracker`],
//! the summary renderer in [`crate::projection`], and any tree-view consumer.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::event::SubTaskOutcome;

/// Lifecycle status of a sub-task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SubTaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SubTaskStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubTaskStatus::Running => "running",
            SubTaskStatus::Completed => "completed",
            SubTaskStatus::Failed => "failed",
            SubTaskStatus::Cancelled => "cancelled",
        }
    }
}

impl From<SubTaskOutcome> for SubTaskStatus {
    fn from(outcome: SubTaskOutcome) -> Self {
        match outcome {
            SubTaskOutcome::Completed => SubTaskStatus::Completed,
            SubTaskOutcome::Failed => SubTaskStatus::Failed,
            SubTaskOutcome::Cancelled => SubTaskStatus::Cancelled,
        }
    }
}

/// One tool invocation inside a sub-task. Append-only.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
    pub result: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ToolCall {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// A delegated unit of work reported by the agent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubTask {
    /// Externally assigned id, unique while active.
    pub id: String,
    pub name: String,
    /// Parent sub-task id, or `None` for work started by the top-level agent.
    pub parent_id: Option<String>,
    pub status: SubTaskStatus,
    /// Tool most recently started and not yet ended.
    pub current_tool: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Tool calls in start order.
    pub tool_calls: Vec<ToolCall>,
}

impl SubTask {
    pub fn new(id: String, name: String, parent_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            parent_id,
            status: SubTaskStatus::Running,
            current_tool: None,
            started_at: now,
            completed_at: None,
            tool_calls: Vec::new(),
        }
    }

    /// Time from start to completion, or to `now` while still running.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.completed_at.unwrap_or(now) - self.started_at
    }
}

/// Change notification emitted by the tracker after every mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerChange {
    /// Snapshot of a sub-task after it was created or updated.
    SubTask(SubTask),
    /// All tracked state was cleared.
    Reset,
}
