//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments and dispatches into the beam
//! run or the model-listing helper.

pub mod beam_run;
pub mod model_list;

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::beam_run::run_beam;
use crate::cli::model_list::list_models;

#[derive(Parser)]
#[command(name = "multibeam")]
#[command(about = "Scatter a chat prompt across multiple AI models and compare the answers")]
#[command(
    long_about = "Multibeam sends one prompt to several models at once over the same \
OpenAI-compatible streaming API and shows every answer side by side, so you can pick \
the best one.\n\n\
Authentication:\n\
  API keys are read from the environment variable of the chosen provider\n\
  (OPENAI_API_KEY, ANTHROPIC_API_KEY, OPENROUTER_API_KEY, ...).\n\
  OPENAI_BASE_URL overrides the endpoint for OpenAI-compatible servers.\n\n\
Examples:\n\
  multibeam \"Summarize RFC 2324\" -m gpt-4o -m o3-mini\n\
  multibeam \"Haiku about lifetimes\" -p openrouter -m openai/gpt-4o -m anthropic/claude-sonnet-4 -r 3\n\
  multibeam models -p anthropic"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Prompt to scatter across the configured models
    pub prompt: Option<String>,

    /// Model to assign to the next free ray (repeatable; the first one also
    /// becomes the fallback for rays without their own model)
    #[arg(short = 'm', long = "model", value_name = "MODEL")]
    pub models: Vec<String>,

    /// Provider to use (defaults to the configured provider, then to the
    /// first provider with an API key in the environment)
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Number of rays to open (defaults to the number of -m flags)
    #[arg(short = 'r', long, value_name = "COUNT")]
    pub rays: Option<usize>,

    /// System prompt prepended to the conversation
    #[arg(short = 's', long, value_name = "TEXT")]
    pub system: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the models available from the provider
    Models,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Some(Commands::Models) => list_models(args.provider).await,
        None => match args.prompt.clone() {
            Some(prompt) => run_beam(args, prompt).await,
            None => Err(
                "No prompt given. Try: multibeam \"your question\" -m model-a -m model-b".into(),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prompt_with_repeated_models() {
        let args = Args::parse_from([
            "multibeam",
            "compare yourselves",
            "-m",
            "gpt-4o",
            "-m",
            "o3-mini",
            "-r",
            "3",
        ]);
        assert_eq!(args.prompt.as_deref(), Some("compare yourselves"));
        assert_eq!(args.models, vec!["gpt-4o", "o3-mini"]);
        assert_eq!(args.rays, Some(3));
        assert!(args.command.is_none());
    }

    #[test]
    fn parses_models_subcommand_with_provider() {
        let args = Args::parse_from(["multibeam", "models", "-p", "anthropic"]);
        assert!(matches!(args.command, Some(Commands::Models)));
        assert_eq!(args.provider.as_deref(), Some("anthropic"));
    }
}
