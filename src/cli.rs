use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::bridge::RoutingMode;

#[derive(Parser, Debug)]
#[command(
    name = "sandbridge",
    version,
    about = "Drive a coding agent inside a sandbox and render its activity"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prompt to the agent and stream the response
    Prompt {
        /// Instruction text for the agent
        text: String,

        /// Agent id to address (defaults to the directory's active agent)
        #[arg(short, long)]
        agent: Option<String>,

        /// File to reference in the prompt (repeatable)
        #[arg(short = 'r', long = "ref")]
        references: Vec<String>,

        /// Execution routing mode
        #[arg(short, long, value_enum)]
        mode: Option<RoutingMode>,

        /// Sandbox container name or id
        #[arg(long)]
        container: Option<String>,

        /// Host workspace directory
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Path to config file (overrides default search)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Hide tool-call details in the rendered response
        #[arg(long)]
        hide_tools: bool,
    },
    /// List the merged agent definitions
    Agents {
        /// Host workspace directory
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Path to config file (overrides default search)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Keep running and re-list whenever agent definitions change
        #[arg(long)]
        watch: bool,
    },
}
