//! Heuristic output adapter.
//!
//! Rebuilds [`AgentEvent`]s from free-form CLI output when the agent process
//! does not emit structured lines. Recognized lines (see [`matchers`]) become
//! events immediately; everything else accumulates in a pending text buffer
//! that is flushed as one `text` event:
//!
//! - right before the next recognized event (so narration keeps its place),
//! - after [`TEXT_FLUSH_DELAY`] without new input (trailing-edge timer),
//! - on [`OutputAdapter::flush`] / [`OutputAdapter::dispose`] / drop.
//!
//! Events are both returned from [`OutputAdapter::process_line`] and emitted
//! on the adapter's [`EventHub`], so callers can pull or subscribe.

pub mod matchers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::event::{AgentEvent, DEFAULT_AGENT_ID, EventHub};

pub use matchers::{classify, strip_ansi};

/// Idle time after the last buffered line before pending text is flushed.
pub const TEXT_FLUSH_DELAY: Duration = Duration::from_millis(100);

struct AdapterState {
    /// Unrecognized lines waiting to be joined into one `text` event.
    pending: Vec<String>,
    /// Trailing bytes of the last chunk that did not end in a newline.
    partial: String,
    agent_id: String,
    flush_timer: Option<JoinHandle<()>>,
    /// Bumped every time the timer is re-armed; a timer only flushes if its
    /// generation is still current when it wakes.
    timer_generation: u64,
}

impl AdapterState {
    /// Drain the pending buffer into a `text` event, if there is anything.
    fn take_pending(&mut self) -> Option<AgentEvent> {
        if self.pending.is_empty() {
            return None;
        }
        let content = self.pending.join("\n");
        self.pending.clear();
        Some(AgentEvent::text(content, self.agent_id.clone()))
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
    }
}

pub struct OutputAdapter {
    state: Arc<Mutex<AdapterState>>,
    hub: EventHub<AgentEvent>,
    flush_delay: Duration,
}

impl Default for OutputAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputAdapter {
    /// Create an adapter with its own event stream.
    pub fn new() -> Self {
        Self::with_hub(EventHub::new())
    }

    /// Create an adapter that emits into an existing stream, so its output
    /// interleaves in order with events the owner emits directly.
    pub fn with_hub(hub: EventHub<AgentEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AdapterState {
                pending: Vec::new(),
                partial: String::new(),
                agent_id: DEFAULT_AGENT_ID.to_string(),
                flush_timer: None,
                timer_generation: 0,
            })),
            hub,
            flush_delay: TEXT_FLUSH_DELAY,
        }
    }

    /// Override the trailing-edge flush delay.
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Agent id attached to `status`, `text` and `done` events produced from
    /// here on.
    pub fn set_agent_id(&self, agent_id: impl Into<String>) {
        self.state.lock().unwrap().agent_id = agent_id.into();
    }

    pub fn subscribe(&self) -> UnboundedReceiver<AgentEvent> {
        self.hub.subscribe()
    }

    /// Classify one line of output.
    ///
    /// Returns the recognized event, or `None` for blank lines and lines that
    /// were buffered as narration.
    pub fn process_line(&self, raw: &str) -> Option<AgentEvent> {
        self.process(raw, true)
    }

    /// Like [`process_line`](Self::process_line), but a recognized `done` is
    /// only returned, not emitted. Pending narration is still flushed ahead
    /// of it, so the caller can emit the `done` itself in order.
    pub fn process_line_holding_done(&self, raw: &str) -> Option<AgentEvent> {
        self.process(raw, false)
    }

    fn process(&self, raw: &str, emit_done: bool) -> Option<AgentEvent> {
        let cleaned = strip_ansi(raw);
        let line = cleaned.trim();
        if line.is_empty() {
            return None;
        }

        let mut state = self.state.lock().unwrap();
        match classify(line, &state.agent_id) {
            Some(event) => {
                state.cancel_timer();
                if let Some(text) = state.take_pending() {
                    self.hub.emit(text);
                }
                if emit_done || !matches!(event, AgentEvent::Done { .. }) {
                    self.hub.emit(event.clone());
                }
                Some(event)
            }
            None => {
                state.pending.push(line.to_string());
                self.arm_timer(&mut state);
                None
            }
        }
    }

    /// Split a raw output chunk into lines and classify each one.
    ///
    /// A trailing fragment without a newline is held back and prefixed to the
    /// next chunk, so a line split across two reads is classified once.
    pub fn process_chunk(&self, data: &str) {
        let lines: Vec<String> = {
            let mut state = self.state.lock().unwrap();
            let mut buffered = std::mem::take(&mut state.partial);
            buffered.push_str(data);

            let mut lines: Vec<String> = buffered.split('\n').map(str::to_string).collect();
            // `split` always yields at least one item; the last is the
            // fragment after the final newline (empty if data ended in one).
            state.partial = lines.pop().unwrap_or_default();
            lines
        };

        for line in lines {
            self.process_line(&line);
        }
    }

    /// Emit any pending narration as a `text` event now.
    pub fn flush(&self) -> Option<AgentEvent> {
        let mut state = self.state.lock().unwrap();
        state.cancel_timer();
        let text = state.take_pending()?;
        self.hub.emit(text.clone());
        Some(text)
    }

    /// Classify any held-back partial line, then flush pending narration.
    pub fn dispose(&self) {
        let partial = std::mem::take(&mut self.state.lock().unwrap().partial);
        if !partial.is_empty() {
            self.process_line(&partial);
        }
        self.flush();
    }

    fn arm_timer(&self, state: &mut AdapterState) {
        state.cancel_timer();
        state.timer_generation += 1;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime: pending text waits for the next structured line or
            // an explicit flush.
            return;
        };

        let generation = state.timer_generation;
        let shared = Arc::clone(&self.state);
        let hub = self.hub.clone();
        let delay = self.flush_delay;

        state.flush_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = shared.lock().unwrap();
            if state.timer_generation != generation {
                return;
            }
            state.flush_timer = None;
            if let Some(text) = state.take_pending() {
                tracing::debug!("Flushing idle narration buffer");
                hub.emit(text);
            }
        }));
    }
}

impl Drop for OutputAdapter {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SubTaskOutcome;

    fn drain(rx: &mut UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn blank_lines_produce_nothing() {
        let adapter = OutputAdapter::new();
        let mut rx = adapter.subscribe();
        assert_eq!(adapter.process_line("   "), None);
        assert_eq!(adapter.flush(), None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn narration_is_buffered_and_flushed_before_structured_events() {
        let adapter = OutputAdapter::new();
        let mut rx = adapter.subscribe();

        assert_eq!(adapter.process_line("I will look at the code."), None);
        assert_eq!(adapter.process_line("  Then fix it.  "), None);
        let event = adapter.process_line("Reading: src/lib.rs");
        assert!(matches!(event, Some(AgentEvent::ToolStart { ref tool, .. }) if tool == "read"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            AgentEvent::text("I will look at the code.\nThen fix it.", "build")
        );
        assert_eq!(events[1].tag(), "tool_start");
    }

    #[test]
    fn event_count_is_structured_lines_plus_one_trailing_text() {
        let adapter = OutputAdapter::new();
        let mut rx = adapter.subscribe();

        let lines = [
            "thinking about it",
            "[subagent:explore] started",
            "found three files",
            "more notes",
            "[subagent:explore] finished",
            "Error: something odd",
            "wrapping up",
        ];
        let structured = lines
            .iter()
            .filter(|line| adapter.process_line(line).is_some())
            .count();
        adapter.dispose();

        let events = drain(&mut rx);
        // Structured: subtask_start, subtask_end, error. Text: three runs of
        // narration, the last one flushed by dispose.
        assert_eq!(structured, 3);
        assert_eq!(events.len(), 6);
        let tags: Vec<_> = events.iter().map(AgentEvent::tag).collect();
        assert_eq!(
            tags,
            vec!["text", "subtask_start", "text", "subtask_end", "error", "text"]
        );
        assert_eq!(
            events[3],
            AgentEvent::SubtaskEnd {
                id: "explore".into(),
                status: SubTaskOutcome::Completed
            }
        );
    }

    #[test]
    fn held_done_is_returned_but_not_emitted() {
        let adapter = OutputAdapter::new();
        let mut rx = adapter.subscribe();

        assert_eq!(adapter.process_line_holding_done("wrapping up"), None);
        let event = adapter.process_line_holding_done("Done");
        assert!(matches!(event, Some(AgentEvent::Done { .. })));
        let other = adapter.process_line_holding_done("Error: quota exceeded");
        assert!(matches!(other, Some(AgentEvent::Error { .. })));

        let tags: Vec<_> = drain(&mut rx).iter().map(AgentEvent::tag).collect();
        assert_eq!(tags, vec!["text", "error"]);
    }

    #[test]
    fn agent_id_is_applied_to_text_and_status() {
        let adapter = OutputAdapter::new();
        let mut rx = adapter.subscribe();
        adapter.set_agent_id("plan");

        adapter.process_line("hello");
        adapter.process_line("⠙ indexing");

        let events = drain(&mut rx);
        assert_eq!(events[0], AgentEvent::text("hello", "plan"));
        assert_eq!(events[1], AgentEvent::status("indexing", "plan"));
    }

    #[test]
    fn chunks_are_split_on_newlines_and_partials_carried() {
        let adapter = OutputAdapter::new();
        let mut rx = adapter.subscribe();

        adapter.process_chunk("Running: cargo");
        assert!(drain(&mut rx).is_empty());
        adapter.process_chunk(" test\nDone\nleftover");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            AgentEvent::ToolStart {
                tool: "bash".into(),
                args: serde_json::json!({"command": "cargo test"}),
                sub_task_id: None,
            }
        );
        assert_eq!(events[1], AgentEvent::done("build"));

        adapter.dispose();
        assert_eq!(drain(&mut rx), vec![AgentEvent::text("leftover", "build")]);
    }

    #[test]
    fn drop_flushes_remaining_text() {
        let adapter = OutputAdapter::new();
        let mut rx = adapter.subscribe();
        adapter.process_line("last words");
        drop(adapter);
        assert_eq!(drain(&mut rx), vec![AgentEvent::text("last words", "build")]);
    }

    #[tokio::test]
    async fn idle_timer_flushes_pending_text() {
        let adapter = OutputAdapter::new().with_flush_delay(Duration::from_millis(20));
        let mut rx = adapter.subscribe();

        adapter.process_line("partial thought");
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timer should flush")
            .expect("stream open");
        assert_eq!(event, AgentEvent::text("partial thought", "build"));

        // Nothing left to flush afterwards.
        assert_eq!(adapter.flush(), None);
    }

    #[tokio::test]
    async fn new_lines_reset_the_idle_timer() {
        let adapter = OutputAdapter::new().with_flush_delay(Duration::from_millis(80));
        let mut rx = adapter.subscribe();

        adapter.process_line("one");
        tokio::time::sleep(Duration::from_millis(40)).await;
        adapter.process_line("two");

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, AgentEvent::text("one\ntwo", "build"));
    }
}
