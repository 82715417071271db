//! Steward CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive chat or single-message mode
//! - `gateway`: Start the HTTP API server
//! - `sessions`: List saved sessions
//! - `replay`: Replay a session from the runtime event log
//! - `doctor`: Diagnose provider setup
//! - `pricing`: Show model pricing
//! - `config`: Show, validate or locate the configuration

use clap::{Parser, Subcommand};
use steward_core::ExecutionMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "steward",
    about = "Steward: a tool-using agent runtime with human approval",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Execution mode: fast, balanced or deep
        #[arg(long)]
        mode: Option<ExecutionMode>,

        /// Run risky tools without asking
        #[arg(long)]
        auto_approve: bool,

        /// Continue a saved session
        #[arg(long, conflicts_with = "resume")]
        session: Option<String>,

        /// Continue the most recent session
        #[arg(long)]
        resume: bool,
    },

    /// Start the HTTP gateway server
    Gateway {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List saved sessions
    Sessions {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Replay a session from the runtime event log
    Replay {
        /// Session id; the latest session when omitted
        session_id: Option<String>,

        /// List logged sessions instead
        #[arg(long)]
        list: bool,

        #[arg(long, default_value_t = 400)]
        max_events: usize,
    },

    /// Diagnose provider keys and storage paths
    Doctor {
        /// Provider to inspect; the configured one when omitted
        provider: Option<String>,
    },

    /// Show model pricing
    Pricing {
        /// Show the rates that apply to this model
        model: Option<String>,
    },

    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },
}

fn init_tracing(verbose: bool, json: bool, quiet_default: bool) {
    let default = match (verbose, quiet_default) {
        (true, _) => "steward=debug",
        (false, true) => "steward=warn",
        (false, false) => "steward=info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Chat output shares the terminal with logs; keep them quiet by default.
    let interactive = matches!(cli.command, Commands::Chat { .. });
    init_tracing(cli.verbose, cli.log_json, interactive);

    match cli.command {
        Commands::Chat {
            message,
            mode,
            auto_approve,
            session,
            resume,
        } => {
            commands::chat::run(commands::chat::ChatOptions {
                message,
                mode,
                auto_approve,
                session,
                resume,
            })
            .await?
        }
        Commands::Gateway { host, port } => commands::gateway::run(host, port).await?,
        Commands::Sessions { limit } => commands::sessions::run(limit).await?,
        Commands::Replay {
            session_id,
            list,
            max_events,
        } => commands::replay::run(session_id, list, max_events)?,
        Commands::Doctor { provider } => commands::doctor::run(provider.as_deref())?,
        Commands::Pricing { model } => commands::pricing::run(model.as_deref())?,
        Commands::Config { action } => commands::config_cmd::run(action.unwrap_or_default())?,
    }

    Ok(())
}
