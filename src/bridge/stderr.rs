//! Standard-error classification.
//!
//! Many CLI tools write routine progress to stderr. Only lines that start
//! with a severity marker become `error` events; the rest are surfaced as
//! `status` from the system agent.

use std::sync::LazyLock;

use regex::Regex;

use crate::adapter::strip_ansi;
use crate::event::{AgentEvent, SYSTEM_AGENT_ID};

static SEVERITY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:Error|ERROR|FATAL|fatal|panic|PANIC|Traceback)").unwrap());

/// True if `line` starts with a severity marker.
pub fn is_error_line(line: &str) -> bool {
    SEVERITY_PREFIX.is_match(line)
}

/// Map one stderr line to an event. Blank lines map to nothing.
pub fn classify_stderr_line(raw: &str) -> Option<AgentEvent> {
    let cleaned = strip_ansi(raw);
    let line = cleaned.trim();
    if line.is_empty() {
        return None;
    }
    if is_error_line(line) {
        Some(AgentEvent::error(line))
    } else {
        Some(AgentEvent::status(line, SYSTEM_AGENT_ID))
    }
}
