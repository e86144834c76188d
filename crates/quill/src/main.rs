//! Quill - a tool-calling conversational agent for the terminal

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{chat_command, history_command, init_command, status_command};

/// Quill - talk to a model that can call tools
#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "A tool-calling conversational agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and session storage
    Init,
    /// Chat with the agent
    Chat {
        /// Send one message and exit
        #[arg(short, long)]
        message: Option<String>,
        /// Session ID (a new one is generated when omitted)
        #[arg(short, long)]
        session: Option<String>,
        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show a stored session transcript
    History {
        /// Session ID; lists stored sessions when omitted
        #[arg(short, long)]
        session: Option<String>,
        /// Delete the session instead of printing it
        #[arg(long, requires = "session")]
        clear: bool,
    },
    /// Show configuration status
    Status,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(matches!(cli.command, Commands::Chat { verbose: true, .. }));

    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Chat {
            message,
            session,
            verbose: _,
        } => chat_command(message, session).await,
        Commands::History { session, clear } => history_command(session, clear).await,
        Commands::Status => status_command().await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
