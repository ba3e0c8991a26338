//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `chat`: Send a prompt to a routed (or the healthiest) provider
//! - `health`: Probe every configured provider
//! - `route`: Show which provider an action resolves to
//! - `extract-tools`: Run the tool-call extractor on a file or stdin
//! - `show-config`: Show configuration discovery information

use crate::llm::Action;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Chat(ChatConfig),
    Health,
    Route(Action),
    ExtractTools(Option<PathBuf>), // None reads stdin
    ShowConfig,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub prompt: String,
    pub action: Action,
    pub system: Option<String>,
    pub select_best: bool,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Parser)]
#[command(name = "modelgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Route prompts across LLM providers with classification-driven failover")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path (skips discovery)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send a prompt and print the reply
    Chat {
        /// Prompt text
        prompt: String,
        /// Action used for routing (chat, tools, embeddings, subagent)
        #[arg(short = 'a', long = "action", default_value = "chat")]
        action: Action,
        /// Optional system message
        #[arg(short = 's', long = "system")]
        system: Option<String>,
        /// Pick the first healthy provider instead of the routing table
        #[arg(long = "best")]
        best: bool,
        /// Override the number of retries for transient failures
        #[arg(long = "max-retries", value_name = "N")]
        max_retries: Option<u32>,
    },
    /// Probe every configured provider
    Health,
    /// Print the provider id an action routes to
    Route {
        /// Action to resolve (chat, tools, embeddings, subagent)
        action: Action,
    },
    /// Extract tool calls from model output (file or stdin)
    ExtractTools {
        /// File holding raw model output; stdin when omitted
        file: Option<PathBuf>,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Chat {
                prompt,
                action,
                system,
                best,
                max_retries,
            }) => {
                if prompt.trim().is_empty() {
                    return Err("Prompt must not be empty".to_string());
                }
                Ok(ExecutionMode::Chat(ChatConfig {
                    prompt: prompt.clone(),
                    action: *action,
                    system: system.clone(),
                    select_best: *best,
                    max_retries: *max_retries,
                }))
            }
            Some(Commands::Health) => Ok(ExecutionMode::Health),
            Some(Commands::Route { action }) => Ok(ExecutionMode::Route(*action)),
            Some(Commands::ExtractTools { file }) => Ok(ExecutionMode::ExtractTools(file.clone())),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'modelgate --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}
