//! `sarufi` - command line client for the Sarufi chatbot platform.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod manager;

use commands::{BotsCommand, Context};
use config::{DotEnvReader, Settings};
use manager::Manager;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Manage Sarufi accounts, chatbots and conversations
#[derive(Debug, Parser)]
#[command(name = "sarufi")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (default: sarufi.env next to the executable)
    #[arg(long, global = true, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Platform root URL
    #[arg(long, global = true, env = "SARUFI_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token; skips signing in
    #[arg(long, global = true, env = "SARUFI_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a platform account
    Register {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign in and print the issued token
    Login {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Store the credentials and token in the settings file
        #[arg(long)]
        save: bool,
    },

    /// Exchange an API key pair for an access token
    AccessToken {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        api_secret: Option<String>,
    },

    /// Show the signed-in account
    Profile,

    /// Chatbot management
    Bots {
        #[command(subcommand)]
        command: BotsCommand,
    },

    /// Send one message to a bot
    Chat {
        #[arg(long)]
        bot_id: i64,
        #[arg(long)]
        message: String,
        /// Conversation to continue; a new one is started when omitted
        #[arg(long, default_value = "")]
        chat_id: String,
        #[arg(long, default_value = "general")]
        channel: sarufi_core::Channel,
        /// Reply language, for bots that support several
        #[arg(long)]
        language: Option<String>,
    },

    /// Show where a conversation currently stands
    Status {
        #[arg(long)]
        bot_id: i64,
        #[arg(long)]
        chat_id: String,
    },

    /// Predict the intent of a message
    Predict {
        #[arg(long)]
        bot_id: i64,
        #[arg(long)]
        message: String,
    },

    /// Show the messages of a conversation
    History {
        #[arg(long)]
        bot_id: i64,
        #[arg(long)]
        chat_id: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let env_file = match cli.env_file {
        Some(path) => path,
        None => DotEnvReader::default_path()?,
    };
    let reader = DotEnvReader::open(env_file)?;
    let settings = Settings::resolve(&reader, cli.base_url, cli.token);
    let manager = Manager::from_settings(&settings);

    let ctx = Context {
        reader: &reader,
        settings: &settings,
        manager: &manager,
    };
    commands::run(cli.command, &ctx)
}
