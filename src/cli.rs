//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// Paper-reading assistant backed by any OpenAI-compatible API.
#[derive(Debug, Parser)]
#[command(name = "papermate", version)]
pub struct Args {
    /// Path to config file (default: ./papermate.toml or ~/.config/papermate/papermate.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Override model name.
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,

    /// Override API base URL.
    #[arg(long = "base-url", global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the tool-calling agent once and print its answer.
    Ask {
        prompt: String,
        /// System prompt for the run.
        #[arg(long)]
        system: Option<String>,
        /// Never offer tools to the model.
        #[arg(long = "no-tools")]
        no_tools: bool,
        #[arg(long = "max-tokens")]
        max_tokens: Option<u32>,
    },
    /// Ask the chat assistant and stream its reply.
    Chat {
        prompt: String,
        /// Title of the paper being discussed.
        #[arg(long = "paper")]
        paper: Option<String>,
    },
    /// Explain a term in context.
    Explain {
        term: String,
        /// Passage the term appears in.
        #[arg(long)]
        context: Option<String>,
    },
}
