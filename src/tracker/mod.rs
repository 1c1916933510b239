//! Live sub-task and tool-call model derived from the event stream.
//!
//! [`ActivityTracker`] is fed every [`AgentEvent`] in bridge order and keeps a
//! registry of sub-tasks keyed by their externally assigned id. Events naming
//! ids it has never seen are ignored rather than treated as errors, and a
//! terminal `done` finalizes anything still running.
//!
//! Tool results are matched to the most recent incomplete call with the same
//! tool name in the same sub-task. The native protocol carries no call id, so
//! two parallel calls to one tool in one sub-task can be mis-attributed.

pub mod types;

pub use types::{SubTask, SubTaskStatus, ToolCall, TrackerChange};

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::event::{AgentEvent, EventHub, SubTaskOutcome};

#[derive(Default)]
pub struct ActivityTracker {
    /// Sub-tasks in first-start order.
    tasks: Vec<SubTask>,
    /// Id to position in `tasks`.
    index: HashMap<String, usize>,
    changes: EventHub<TrackerChange>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive a [`TrackerChange`] after every mutation.
    pub fn subscribe(&self) -> UnboundedReceiver<TrackerChange> {
        self.changes.subscribe()
    }

    /// Apply one event. Variants that carry no sub-task information are no-ops.
    pub fn handle_event(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::SubtaskStart {
                id,
                name,
                parent_id,
            } => self.start_sub_task(id, name, parent_id.clone()),
            AgentEvent::SubtaskEnd { id, status } => self.end_sub_task(id, *status),
            AgentEvent::ToolStart {
                tool,
                args,
                sub_task_id: Some(sub_task_id),
            } => self.start_tool(sub_task_id, tool, args),
            AgentEvent::ToolEnd {
                tool,
                result,
                sub_task_id: Some(sub_task_id),
            } => self.end_tool(sub_task_id, tool, result),
            AgentEvent::Done { .. } => self.finalize_running(),
            AgentEvent::ToolStart {
                sub_task_id: None, ..
            }
            | AgentEvent::ToolEnd {
                sub_task_id: None, ..
            }
            | AgentEvent::Status { .. }
            | AgentEvent::Text { .. }
            | AgentEvent::Error { .. } => {}
        }
    }

    pub fn get_sub_task(&self, id: &str) -> Option<&SubTask> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Sub-tasks still running, in start order.
    pub fn get_active_sub_tasks(&self) -> Vec<&SubTask> {
        self.tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .collect()
    }

    pub fn get_all_sub_tasks(&self) -> &[SubTask] {
        &self.tasks
    }

    /// Sub-tasks whose parent is absent or not tracked.
    pub fn roots(&self) -> Vec<&SubTask> {
        self.tasks
            .iter()
            .filter(|t| {
                t.parent_id
                    .as_deref()
                    .is_none_or(|parent| !self.index.contains_key(parent))
            })
            .collect()
    }

    pub fn children_of(&self, id: &str) -> Vec<&SubTask> {
        self.tasks
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(id))
            .collect()
    }

    /// Forget everything. Call once per new user request.
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.index.clear();
        self.changes.emit(TrackerChange::Reset);
    }

    fn start_sub_task(&mut self, id: &str, name: &str, parent_id: Option<String>) {
        let task = SubTask::new(id.to_string(), name.to_string(), parent_id, Utc::now());
        let position = match self.index.get(id) {
            // Last write wins; the entry keeps its slot in start order.
            Some(&i) => {
                tracing::debug!(sub_task = %id, "Sub-task restarted; replacing entry");
                self.tasks[i] = task;
                i
            }
            None => {
                self.tasks.push(task);
                self.index.insert(id.to_string(), self.tasks.len() - 1);
                self.tasks.len() - 1
            }
        };
        self.notify(position);
    }

    fn end_sub_task(&mut self, id: &str, outcome: SubTaskOutcome) {
        let Some(&i) = self.index.get(id) else {
            tracing::debug!(sub_task = %id, "Ignoring end for unknown sub-task");
            return;
        };
        let task = &mut self.tasks[i];
        task.status = outcome.into();
        task.completed_at = Some(Utc::now());
        task.current_tool = None;
        self.notify(i);
    }

    fn start_tool(&mut self, sub_task_id: &str, tool: &str, args: &Value) {
        let Some(&i) = self.index.get(sub_task_id) else {
            return;
        };
        let task = &mut self.tasks[i];
        task.tool_calls.push(ToolCall {
            tool: tool.to_string(),
            args: args.clone(),
            result: None,
            started_at: Utc::now(),
            completed_at: None,
        });
        task.current_tool = Some(tool.to_string());
        self.notify(i);
    }

    fn end_tool(&mut self, sub_task_id: &str, tool: &str, result: &str) {
        let Some(&i) = self.index.get(sub_task_id) else {
            return;
        };
        let task = &mut self.tasks[i];
        let Some(call) = task
            .tool_calls
            .iter_mut()
            .rev()
            .find(|c| c.tool == tool && !c.is_complete())
        else {
            tracing::debug!(sub_task = %sub_task_id, tool, "No open call to match tool result");
            return;
        };
        call.result = Some(result.to_string());
        call.completed_at = Some(Utc::now());
        if task.current_tool.as_deref() == Some(tool) {
            task.current_tool = None;
        }
        self.notify(i);
    }

    fn finalize_running(&mut self) {
        let now = Utc::now();
        let finalized: Vec<usize> = self
            .tasks
            .iter_mut()
            .enumerate()
            .filter(|(_, t)| !t.status.is_terminal())
            .map(|(i, t)| {
                t.status = SubTaskStatus::Completed;
                t.completed_at = Some(now);
                t.current_tool = None;
                i
            })
            .collect();
        for i in finalized {
            self.notify(i);
        }
    }

    fn notify(&self, position: usize) {
        self.changes
            .emit(TrackerChange::SubTask(self.tasks[position].clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start(id: &str, parent: Option<&str>) -> AgentEvent {
        AgentEvent::SubtaskStart {
            id: id.into(),
            name: format!("{id}-task"),
            parent_id: parent.map(String::from),
        }
    }

    fn end(id: &str, status: SubTaskOutcome) -> AgentEvent {
        AgentEvent::SubtaskEnd {
            id: id.into(),
            status,
        }
    }

    fn tool_start(sub: Option<&str>, tool: &str, command: &str) -> AgentEvent {
        AgentEvent::ToolStart {
            tool: tool.into(),
            args: json!({ "command": command }),
            sub_task_id: sub.map(String::from),
        }
    }

    fn tool_end(sub: Option<&str>, tool: &str, result: &str) -> AgentEvent {
        AgentEvent::ToolEnd {
            tool: tool.into(),
            result: result.into(),
            sub_task_id: sub.map(String::from),
        }
    }

    #[test]
    fn start_and_end_update_status() {
        let mut tracker = ActivityTracker::new();
        tracker.handle_event(&start("s1", None));
        assert_eq!(tracker.get_active_sub_tasks().len(), 1);

        tracker.handle_event(&end("s1", SubTaskOutcome::Failed));
        let task = tracker.get_sub_task("s1").unwrap();
        assert_eq!(task.status, SubTaskStatus::Failed);
        assert!(task.completed_at.is_some());
        assert!(tracker.get_active_sub_tasks().is_empty());
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut tracker = ActivityTracker::new();
        tracker.handle_event(&end("ghost", SubTaskOutcome::Completed));
        tracker.handle_event(&tool_start(Some("ghost"), "bash", "ls"));
        tracker.handle_event(&tool_end(Some("ghost"), "bash", "ok"));
        tracker.handle_event(&tool_start(None, "bash", "ls"));
        assert!(tracker.get_all_sub_tasks().is_empty());
    }

    #[test]
    fn events_without_sub_task_context_change_nothing() {
        let mut tracker = ActivityTracker::new();
        tracker.handle_event(&start("s1", None));
        let mut rx = tracker.subscribe();

        tracker.handle_event(&AgentEvent::status("Thinking...", "build"));
        tracker.handle_event(&AgentEvent::text("notes", "build"));
        tracker.handle_event(&AgentEvent::error("Error: boom"));
        tracker.handle_event(&tool_start(None, "bash", "ls"));
        tracker.handle_event(&tool_end(None, "bash", "ok"));

        assert!(rx.try_recv().is_err());
        let task = tracker.get_sub_task("s1").unwrap();
        assert!(task.tool_calls.is_empty());
        assert_eq!(task.status, SubTaskStatus::Running);
    }

    #[test]
    fn restart_with_same_id_replaces_entry() {
        let mut tracker = ActivityTracker::new();
        tracker.handle_event(&start("s1", None));
        tracker.handle_event(&tool_start(Some("s1"), "bash", "ls"));
        tracker.handle_event(&start("s1", Some("root")));

        assert_eq!(tracker.get_all_sub_tasks().len(), 1);
        let task = tracker.get_sub_task("s1").unwrap();
        assert!(task.tool_calls.is_empty());
        assert_eq!(task.parent_id.as_deref(), Some("root"));
    }

    #[test]
    fn tool_end_binds_to_most_recent_open_call() {
        let mut tracker = ActivityTracker::new();
        tracker.handle_event(&start("s1", None));
        tracker.handle_event(&tool_start(Some("s1"), "bash", "first"));
        tracker.handle_event(&tool_start(Some("s1"), "bash", "second"));
        tracker.handle_event(&tool_end(Some("s1"), "bash", "result"));

        let calls = &tracker.get_sub_task("s1").unwrap().tool_calls;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].completed_at.is_none());
        assert_eq!(calls[0].result, None);
        assert!(calls[1].completed_at.is_some());
        assert_eq!(calls[1].result.as_deref(), Some("result"));
        assert_eq!(calls[1].args, json!({ "command": "second" }));
    }

    #[test]
    fn tool_end_skips_other_tool_names() {
        let mut tracker = ActivityTracker::new();
        tracker.handle_event(&start("s1", None));
        tracker.handle_event(&tool_start(Some("s1"), "read", "a"));
        tracker.handle_event(&tool_start(Some("s1"), "bash", "b"));
        tracker.handle_event(&tool_end(Some("s1"), "read", "contents"));

        let task = tracker.get_sub_task("s1").unwrap();
        assert!(task.tool_calls[0].is_complete());
        assert!(!task.tool_calls[1].is_complete());
        assert_eq!(task.current_tool.as_deref(), Some("bash"));
    }

    #[test]
    fn done_completes_only_running_sub_tasks() {
        let mut tracker = ActivityTracker::new();
        for id in ["a", "b", "c"] {
            tracker.handle_event(&start(id, None));
        }
        tracker.handle_event(&end("b", SubTaskOutcome::Failed));
        tracker.handle_event(&end("c", SubTaskOutcome::Cancelled));
        tracker.handle_event(&AgentEvent::done("build"));

        let status = |id| tracker.get_sub_task(id).unwrap().status;
        assert_eq!(status("a"), SubTaskStatus::Completed);
        assert_eq!(status("b"), SubTaskStatus::Failed);
        assert_eq!(status("c"), SubTaskStatus::Cancelled);
        assert!(tracker.get_all_sub_tasks().iter().all(|t| t.status.is_terminal()));
        assert!(tracker.get_active_sub_tasks().is_empty());
    }

    #[test]
    fn tree_queries_follow_parent_links() {
        let mut tracker = ActivityTracker::new();
        tracker.handle_event(&start("root", None));
        tracker.handle_event(&start("child", Some("root")));
        tracker.handle_event(&start("orphan", Some("missing")));

        let roots: Vec<_> = tracker.roots().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(roots, vec!["root", "orphan"]);
        let children: Vec<_> = tracker
            .children_of("root")
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(children, vec!["child"]);
    }

    #[test]
    fn every_mutation_notifies_subscribers() {
        let mut tracker = ActivityTracker::new();
        let mut rx = tracker.subscribe();

        tracker.handle_event(&start("s1", None));
        tracker.handle_event(&AgentEvent::text("ignored", "build"));
        tracker.handle_event(&tool_start(Some("s1"), "bash", "ls"));
        tracker.reset();

        match rx.try_recv().unwrap() {
            TrackerChange::SubTask(task) => assert!(task.tool_calls.is_empty()),
            other => panic!("unexpected change: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            TrackerChange::SubTask(task) => assert_eq!(task.current_tool.as_deref(), Some("bash")),
            other => panic!("unexpected change: {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), TrackerChange::Reset);
        assert!(rx.try_recv().is_err());
        assert!(tracker.get_all_sub_tasks().is_empty());
    }
}
