//! quill: the command-line entry point.
//!
//! Commands:
//! - `chat`     : interactive REPL or a single message
//! - `sessions` : list or delete stored sessions
//! - `config`   : print the effective config or write a default file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod terminal;

#[derive(Parser)]
#[command(name = "quill", about = "quill: a terminal coding agent", version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent in a working directory
    Chat {
        /// Working directory for the session (defaults to the current directory)
        #[arg(long, value_name = "DIR")]
        session_dir: Option<PathBuf>,

        /// Approve every tool call without asking
        #[arg(long)]
        yolo: bool,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions, most recent first
    List,
    /// Delete a session and its history
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            session_dir,
            yolo,
            message,
        } => commands::chat::run(session_dir, yolo, message).await?,
        Commands::Sessions { action } => match action {
            SessionAction::List => commands::sessions::list()?,
            SessionAction::Delete { id } => commands::sessions::delete(&id)?,
        },
        Commands::Config { init } => {
            if init {
                commands::config_cmd::init()?
            } else {
                commands::config_cmd::show()?
            }
        }
    }

    Ok(())
}
