use std::io::Write;

use clap::Parser;

use sandbridge::bridge::{Bridge, Prompt};
use sandbridge::cli::{Cli, Commands};
use sandbridge::config::{self, AppConfig};
use sandbridge::directory::{AgentDirectory, AgentMode, DirectorySource, DirectoryWatcher};
use sandbridge::event::BridgeState;
use sandbridge::projection::{self, ProjectionOptions, ResponseSink};
use sandbridge::tracker::ActivityTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the rendered response.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli)?;
    tracing::info!(
        mode = ?config.mode,
        workspace = %config.workspace.display(),
        container = %config.container,
        "Config loaded"
    );

    match cli.command {
        Commands::Prompt {
            text,
            agent,
            references,
            ..
        } => {
            let prompt = Prompt::new(text).with_references(references);
            let ok = run_prompt(config, prompt, agent).await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Agents { watch, .. } => list_agents(&config, watch).await?,
    }

    Ok(())
}

fn directory_source(config: &AppConfig) -> DirectorySource {
    DirectorySource {
        workspace: Some(config.workspace.clone()),
        config_path: config.agent_config_path.clone(),
        default_agent: config.default_agent.clone(),
    }
}

/// Send one prompt and render the response until the run settles.
/// Returns `false` if the bridge ended in the error state.
async fn run_prompt(
    config: AppConfig,
    prompt: Prompt,
    agent: Option<String>,
) -> anyhow::Result<bool> {
    let directory = AgentDirectory::load(directory_source(&config));
    let agent_id = agent.unwrap_or_else(|| directory.active_id().to_string());
    if directory.get(&agent_id).is_none() {
        tracing::warn!(agent = %agent_id, "Agent not in directory; passing through to the agent binary");
    }

    let options = ProjectionOptions {
        show_tool_details: config.show_tool_details,
    };
    let bridge = Bridge::new(config);
    let mut events = bridge.subscribe_events();
    let mut states = bridge.subscribe_state();
    let mut tracker = ActivityTracker::new();
    let mut sink = TerminalSink::default();

    tracker.reset();
    bridge.send_prompt(prompt.with_agent(agent_id)).await;

    let mut seen_busy = bridge.state() == BridgeState::Busy;
    let mut failed = bridge.state() == BridgeState::Error;
    while !failed && !(seen_busy && bridge.state() == BridgeState::Idle) {
        tokio::select! {
            Some(event) = events.recv() => {
                tracker.handle_event(&event);
                projection::project(&event, &options, &mut sink);
            }
            Some(state) = states.recv() => match state {
                BridgeState::Busy => seen_busy = true,
                BridgeState::Error => failed = true,
                BridgeState::Idle if seen_busy => break,
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; cancelling request");
                bridge.cancel_current_request();
            }
            else => break,
        }
    }

    // Events emitted before the final state change are already queued.
    while let Ok(event) = events.try_recv() {
        tracker.handle_event(&event);
        projection::project(&event, &options, &mut sink);
    }

    projection::render_summary(tracker.get_all_sub_tasks(), &mut sink);
    if failed {
        sink.offer_action("Retry after fixing the sandbox");
    }
    sink.finish();
    bridge.stop();
    Ok(!failed)
}

async fn list_agents(config: &AppConfig, watch: bool) -> anyhow::Result<()> {
    let source = directory_source(config);
    let mut directory = AgentDirectory::load(source.clone());
    print_agents(&directory);
    if !watch {
        return Ok(());
    }

    let mut watcher = DirectoryWatcher::new(&source)?;
    loop {
        tokio::select! {
            changed = watcher.changed() => {
                if !changed {
                    break;
                }
                directory.reload();
                println!();
                print_agents(&directory);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_agents(directory: &AgentDirectory) {
    if let Some(path) = directory.config_file() {
        println!("config: {}", path.display());
    }
    for agent in directory.agents() {
        let marker = if agent.id == directory.active_id() { "*" } else { " " };
        let mode = match agent.mode {
            AgentMode::Primary => "primary",
            AgentMode::Subagent => "subagent",
        };
        println!(
            "{marker} {:<12} {:<9} {}/{}  {}",
            agent.id,
            mode,
            agent.provider,
            agent.model,
            agent.description.as_deref().unwrap_or(""),
        );
    }
}

/// Renders the response stream on a terminal. Progress goes to stderr on a
/// single rewritten line; content goes to stdout.
#[derive(Default)]
struct TerminalSink {
    progress_shown: bool,
}

impl TerminalSink {
    fn clear_progress(&mut self) {
        if self.progress_shown {
            eprint!("\r\x1b[2K");
            self.progress_shown = false;
        }
    }

    fn finish(&mut self) {
        self.clear_progress();
        println!();
    }
}

impl ResponseSink for TerminalSink {
    fn progress(&mut self, message: &str) {
        eprint!("\r\x1b[2K{message}");
        let _ = std::io::stderr().flush();
        self.progress_shown = true;
    }

    fn emit_content(&mut self, markdown: &str) {
        self.clear_progress();
        println!("{markdown}");
    }

    fn offer_action(&mut self, label: &str) {
        self.clear_progress();
        println!("\n[{label}]");
    }
}
