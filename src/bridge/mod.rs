//! Process bridge: owns the agent process lifecycle and normalizes its output.
//!
//! One agent process is spawned per prompt. Its stdout is read line by line
//! and mapped onto [`AgentEvent`]s (native JSON first, the heuristic
//! [`OutputAdapter`] otherwise); stderr is classified into `error` or system
//! `status` events. All events go out on one [`EventHub`], state transitions
//! on another.
//!
//! **State machine:** `Stopped --start--> Idle --send_prompt--> Busy
//! --done/exit--> Idle`. Sandbox or spawn failures move to `Error`, which a
//! later successful `start` leaves again.
//!
//! **Settling:** a run ends either when the output stream reports `done` or
//! when the process exits. Both paths go through [`Bridge::settle`], guarded
//! by the run's `settled` flag, so exactly one terminal event is emitted per
//! run. Runs are numbered; a run superseded by a newer prompt is killed and
//! its exit is absorbed without touching state or emitting anything.
//!
//! Locks are never held across `.await`.

pub mod launcher;
pub mod native;
pub mod routing;
pub mod sandbox;
pub mod shim;
pub mod stderr;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::adapter::OutputAdapter;
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::event::{AgentEvent, BridgeCommand, BridgeState, DEFAULT_AGENT_ID, EventHub};

pub use launcher::{Launcher, ProcessLauncher};
pub use native::{NativeLine, map_native_line};
pub use routing::{LaunchContext, LaunchSpec, RoutingMode, build_launch_spec};
pub use sandbox::{DockerSandbox, Sandbox, SandboxInfo};
pub use shim::ExecShim;

/// How long to keep reading stdout after the process exits before settling.
/// Bounded because tools the agent started may still hold the pipe open.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A user request for the agent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub agent_id: Option<String>,
    /// Files to mention ahead of the instruction body.
    pub references: Vec<String>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = references.into_iter().map(Into::into).collect();
        self
    }

    /// The text handed to the agent: `@`-mentions for each reference, a
    /// blank line, then the body.
    pub fn instruction_text(&self) -> String {
        if self.references.is_empty() {
            return self.text.clone();
        }
        let mentions: Vec<String> = self.references.iter().map(|r| format!("@{r}")).collect();
        format!("{}\n\n{}", mentions.join(" "), self.text)
    }

    /// The equivalent command for a long-lived agent process.
    pub fn to_command(&self) -> BridgeCommand {
        BridgeCommand::Prompt {
            text: self.text.clone(),
            agent: self.agent_id.clone(),
            references: (!self.references.is_empty()).then(|| self.references.clone()),
        }
    }
}

/// Per-mode preparation produced by a successful `start`.
struct Prepared {
    sandbox: SandboxInfo,
    env: BTreeMap<String, String>,
    shim: Option<ExecShim>,
}

/// One in-flight agent process.
struct Run {
    generation: u64,
    agent_id: String,
    settled: bool,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    state: BridgeState,
    prepared: Option<Prepared>,
    run: Option<Run>,
    generation: u64,
}

/// Cloneable handle to the bridge. Clones share the same process and streams.
#[derive(Clone)]
pub struct Bridge {
    config: Arc<AppConfig>,
    sandbox: Arc<dyn Sandbox>,
    launcher: Arc<dyn Launcher>,
    inner: Arc<Mutex<Inner>>,
    events: EventHub<AgentEvent>,
    states: EventHub<BridgeState>,
    adapter: Arc<OutputAdapter>,
    shim_root: PathBuf,
}

impl Bridge {
    /// Bridge with the docker sandbox probe and the real process launcher.
    pub fn new(config: AppConfig) -> Self {
        let sandbox = DockerSandbox::new(
            config.exec_binary.clone(),
            config.container.clone(),
            config.sandbox_workdir.clone(),
        );
        Self::with_parts(config, Arc::new(sandbox), Arc::new(ProcessLauncher))
    }

    pub fn with_parts(
        config: AppConfig,
        sandbox: Arc<dyn Sandbox>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let events = EventHub::new();
        Self {
            config: Arc::new(config),
            sandbox,
            launcher,
            inner: Arc::new(Mutex::new(Inner::default())),
            adapter: Arc::new(OutputAdapter::with_hub(events.clone())),
            events,
            states: EventHub::new(),
            shim_root: std::env::temp_dir(),
        }
    }

    /// Directory under which exec shims are provisioned.
    pub fn with_shim_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.shim_root = root.into();
        self
    }

    pub fn subscribe_events(&self) -> UnboundedReceiver<AgentEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_state(&self) -> UnboundedReceiver<BridgeState> {
        self.states.subscribe()
    }

    pub fn state(&self) -> BridgeState {
        self.inner.lock().unwrap().state
    }

    /// True while `Idle` or `Busy`.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Path of the exec shim, while one is provisioned.
    pub fn shim_path(&self) -> Option<PathBuf> {
        let inner = self.inner.lock().unwrap();
        inner
            .prepared
            .as_ref()
            .and_then(|p| p.shim.as_ref())
            .map(|shim| shim.path().to_path_buf())
    }

    /// Verify the sandbox and prepare routing for the configured mode.
    ///
    /// No-op when already `Idle` or `Busy`. Failures are reported as an
    /// `error` event plus a transition to `Error`; this never returns `Err`.
    /// No agent process is spawned here.
    pub async fn start(&self) {
        if self.is_running() {
            return;
        }

        let prepared = match self.sandbox.probe().await {
            Ok(info) => self.prepare(info),
            Err(e) => Err(e),
        };

        let mut inner = self.inner.lock().unwrap();
        match prepared {
            Ok(prepared) => {
                tracing::info!(
                    mode = ?self.config.mode,
                    sandbox = %prepared.sandbox.id,
                    forwarded_vars = prepared.env.len(),
                    "Bridge prepared"
                );
                inner.prepared = Some(prepared);
                self.set_state(&mut inner, BridgeState::Idle);
            }
            Err(e) => {
                tracing::warn!("Bridge start failed: {}", e);
                inner.prepared = None;
                self.events.emit(AgentEvent::error(e.to_string()));
                self.set_state(&mut inner, BridgeState::Error);
            }
        }
    }

    fn prepare(&self, sandbox: SandboxInfo) -> Result<Prepared, BridgeError> {
        let mut env = routing::forwarded_env(
            &self.config.forward_env,
            &self.config.env,
            std::env::vars(),
        );

        let shim = match self.config.mode {
            RoutingMode::Local => {
                let shim = ExecShim::provision(
                    &self.shim_root,
                    &self.config.exec_binary,
                    &sandbox.id,
                    &sandbox.workdir,
                )?;
                env.extend(routing::local_routing_env(shim.path(), &sandbox));
                Some(shim)
            }
            RoutingMode::Container => None,
        };

        Ok(Prepared { sandbox, env, shim })
    }

    /// Dispatch a prompt in a fresh agent process.
    ///
    /// Starts the bridge first if needed. Any in-flight run is killed
    /// (last prompt wins); its exit is absorbed silently. The bridge is `Busy`
    /// as soon as the prompt is dispatched.
    pub async fn send_prompt(&self, prompt: Prompt) {
        if !self.is_running() {
            self.start().await;
            if !self.is_running() {
                return;
            }
        }

        let instruction = prompt.instruction_text();
        let requested_agent = prompt
            .agent_id
            .clone()
            .or_else(|| self.config.default_agent.clone());
        let agent_id = requested_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());

        let (generation, cancel, spec) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(prepared) = inner.prepared.as_ref() else {
                return;
            };
            let ctx = LaunchContext {
                mode: self.config.mode,
                agent_binary: &self.config.agent_binary,
                exec_binary: &self.config.exec_binary,
                workspace: &self.config.workspace,
                sandbox: &prepared.sandbox,
                env: &prepared.env,
            };
            let spec = build_launch_spec(&ctx, &instruction, requested_agent.as_deref());

            if let Some(previous) = inner.run.take() {
                tracing::debug!(generation = previous.generation, "Superseding in-flight run");
                previous.cancel.cancel();
            }

            inner.generation += 1;
            let generation = inner.generation;
            let cancel = CancellationToken::new();
            inner.run = Some(Run {
                generation,
                agent_id: agent_id.clone(),
                settled: false,
                cancel: cancel.clone(),
            });
            self.set_state(&mut inner, BridgeState::Busy);
            (generation, cancel, spec)
        };

        // Narration left over from a superseded run belongs to that run.
        self.adapter.flush();
        self.adapter.set_agent_id(agent_id);

        match self.launcher.launch(&spec) {
            Ok(child) => {
                tracing::info!(
                    generation,
                    program = %spec.program,
                    pid = child.id(),
                    "Agent process spawned"
                );
                if let Err(e) = self.monitor(child, generation, cancel) {
                    self.fail_run(generation, e);
                }
            }
            Err(e) => {
                let err = BridgeError::SpawnFailed {
                    program: spec.program.clone(),
                    message: e.to_string(),
                };
                self.fail_run(generation, err);
            }
        }
    }

    /// Kill the in-flight agent process, if any.
    ///
    /// The outcome (`done` or `error`) is reported by the process exit
    /// handler, not here.
    pub fn cancel_current_request(&self) {
        let inner = self.inner.lock().unwrap();
        if let Some(run) = &inner.run {
            tracing::info!(generation = run.generation, "Cancelling current request");
            run.cancel.cancel();
        }
    }

    /// Kill any in-flight process, release the shim and return to `Stopped`.
    pub fn stop(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(run) = inner.run.take() {
                run.cancel.cancel();
            }
            if let Some(mut prepared) = inner.prepared.take() {
                if let Some(shim) = prepared.shim.as_mut() {
                    shim.release();
                }
            }
            self.set_state(&mut inner, BridgeState::Stopped);
        }
        self.adapter.flush();
    }

    fn set_state(&self, inner: &mut Inner, next: BridgeState) {
        if inner.state == next {
            return;
        }
        tracing::info!(from = ?inner.state, to = ?next, "Bridge state changed");
        inner.state = next;
        self.states.emit(next);
    }

    /// Spawn the stdout/stderr readers and the exit monitor for one run.
    fn monitor(
        &self,
        mut child: Child,
        generation: u64,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let stdout = child.stdout.take().ok_or(BridgeError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(BridgeError::MissingPipe("stderr"))?;

        let bridge = self.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                bridge.handle_stdout_line(generation, &line);
            }
        });

        let bridge = self.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                bridge.handle_stderr_line(generation, &line);
            }
        });

        let bridge = self.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = cancel.cancelled() => {
                    kill_process_group(&mut child);
                    child.wait().await
                }
            };

            // Both readers must reach EOF before settling, or trailing lines
            // land after the run is cleared and are discarded.
            let drained = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
                let _ = tokio::join!(stdout_task, stderr_task);
            })
            .await;
            if drained.is_err() {
                tracing::debug!(generation, "Output still open after exit; settling anyway");
            }
            bridge.handle_exit(generation, status);
        });

        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.run.as_ref().is_some_and(|run| run.generation == generation)
    }

    fn current_agent(&self, generation: u64) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .run
            .as_ref()
            .filter(|run| run.generation == generation)
            .map(|run| run.agent_id.clone())
    }

    fn handle_stdout_line(&self, generation: u64, line: &str) {
        let Some(agent_id) = self.current_agent(generation) else {
            return;
        };

        match map_native_line(line, &agent_id) {
            NativeLine::Event(event) => {
                // Keep buffered narration ahead of the structured event.
                self.adapter.flush();
                if matches!(event, AgentEvent::Done { .. }) {
                    self.settle(generation, Some(event));
                } else {
                    self.events.emit(event);
                }
            }
            NativeLine::Dropped { tag } => {
                tracing::debug!(tag = %tag, "Dropping native event with no usable fields");
            }
            NativeLine::Unstructured => {
                // A heuristic `done` goes through `settle` like a native one,
                // so it is dropped if the run already settled.
                if let Some(done @ AgentEvent::Done { .. }) =
                    self.adapter.process_line_holding_done(line)
                {
                    self.settle(generation, Some(done));
                }
            }
        }
    }

    fn handle_stderr_line(&self, generation: u64, line: &str) {
        if !self.is_current(generation) {
            return;
        }
        if let Some(event) = stderr::classify_stderr_line(line) {
            self.events.emit(event);
        }
    }

    /// Mark the run settled and return to `Idle`, emitting `done_event` if
    /// given. Returns false if the run was already settled or superseded.
    fn settle(&self, generation: u64, done_event: Option<AgentEvent>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(run) = inner
            .run
            .as_mut()
            .filter(|run| run.generation == generation && !run.settled)
        else {
            return false;
        };
        run.settled = true;
        if let Some(event) = done_event {
            self.events.emit(event);
        }
        self.set_state(&mut inner, BridgeState::Idle);
        true
    }

    fn handle_exit(&self, generation: u64, status: std::io::Result<ExitStatus>) {
        if !self.is_current(generation) {
            tracing::debug!(generation, "Superseded run exited");
            return;
        }
        self.adapter.flush();

        let (agent_id, settled) = {
            let inner = self.inner.lock().unwrap();
            match inner.run.as_ref().filter(|run| run.generation == generation) {
                Some(run) => (run.agent_id.clone(), run.settled),
                None => return,
            }
        };

        if settled {
            tracing::debug!(generation, ?status, "Agent process exited after done");
        } else {
            match status {
                Ok(status) => match status.code() {
                    None | Some(0) => {
                        tracing::info!(generation, ?status, "Agent process exited");
                        self.settle(generation, Some(AgentEvent::done(agent_id)));
                    }
                    Some(code) => {
                        tracing::warn!(generation, code, "Agent process exited with failure");
                        self.events
                            .emit(AgentEvent::error(format!("Agent process exited with code {code}")));
                        self.settle(generation, None);
                    }
                },
                Err(e) => {
                    self.events
                        .emit(AgentEvent::error(format!("Failed to wait for agent process: {e}")));
                    self.settle(generation, None);
                }
            }
        }

        let mut inner = self.inner.lock().unwrap();
        if inner
            .run
            .as_ref()
            .is_some_and(|run| run.generation == generation)
        {
            inner.run = None;
        }
    }

    /// A run that never got going: report and move to `Error`.
    fn fail_run(&self, generation: u64, err: BridgeError) {
        tracing::warn!(generation, "Agent launch failed: {}", err);
        let mut inner = self.inner.lock().unwrap();
        if inner
            .run
            .as_ref()
            .is_some_and(|run| run.generation == generation)
        {
            inner.run = None;
        }
        self.events.emit(AgentEvent::error(err.to_string()));
        self.set_state(&mut inner, BridgeState::Error);
    }
}

/// SIGKILL the child's process group, falling back to the child alone.
fn kill_process_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        let pgid = nix::unistd::Pid::from_raw(pid as i32);
        if nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL).is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_text_prepends_references() {
        let prompt = Prompt::new("Fix it").with_references(["/src/a.ts", "/src/b.ts"]);
        assert_eq!(prompt.instruction_text(), "@/src/a.ts @/src/b.ts\n\nFix it");
    }

    #[test]
    fn instruction_text_without_references_is_the_body() {
        assert_eq!(Prompt::new("hello").instruction_text(), "hello");
    }

    #[test]
    fn prompt_converts_to_command() {
        let command = Prompt::new("go")
            .with_agent("plan")
            .with_references(["a.rs"])
            .to_command();
        assert_eq!(
            command,
            BridgeCommand::Prompt {
                text: "go".into(),
                agent: Some("plan".into()),
                references: Some(vec!["a.rs".into()]),
            }
        );
        assert_eq!(
            Prompt::new("go").to_command(),
            BridgeCommand::Prompt {
                text: "go".into(),
                agent: None,
                references: None,
            }
        );
    }
}
