mod chat;
mod config;
mod follow;
mod output;
mod replay;

use clap::{Parser, Subcommand};
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agentdeck", about = "agentdeck CLI - run agent tasks and follow their event streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a task from a prompt and stream its transcript
    Chat {
        /// Prompt for the agent
        prompt: String,

        /// Agent to run (defaults to `chat.default_agent`)
        #[arg(long)]
        agent: Option<String>,

        /// Create the task and receive its events in a single request
        #[arg(long)]
        inline: bool,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Write the finished transcript as JSONL
        #[arg(long)]
        archive: Option<PathBuf>,
    },

    /// Follow the event stream of a running task
    Watch {
        task_id: String,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Write the finished transcript as JSONL
        #[arg(long)]
        archive: Option<PathBuf>,
    },

    /// Replay a captured SSE stream through the transcript pipeline
    Replay {
        /// File holding the raw `text/event-stream` body
        file: PathBuf,

        /// Bytes per read (defaults to `stream.replay_chunk_bytes`)
        #[arg(long)]
        chunk_bytes: Option<usize>,

        /// Prompt shown as the user message that started the task
        #[arg(long)]
        prompt: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Write the finished transcript as JSONL
        #[arg(long)]
        archive: Option<PathBuf>,
    },

    /// Show or set configuration
    Config {
        /// Set the server URL
        #[arg(long)]
        server: Option<String>,

        /// Set the API key
        #[arg(long)]
        api_key: Option<String>,

        /// Set the default agent for `chat`
        #[arg(long)]
        agent: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into())
                .add_directive(
                    "agentdeck=info"
                        .parse()
                        .unwrap_or_else(|_| tracing::Level::INFO.into()),
                ),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Chat {
            prompt,
            agent,
            inline,
            format,
            archive,
        } => chat::run_chat(&prompt, agent, inline, format, archive.as_deref()).await,
        Commands::Watch {
            task_id,
            format,
            archive,
        } => chat::run_watch(&task_id, format, archive.as_deref()).await,
        Commands::Replay {
            file,
            chunk_bytes,
            prompt,
            format,
            archive,
        } => {
            replay::run_replay(
                &file,
                chunk_bytes,
                prompt.as_deref(),
                format,
                archive.as_deref(),
            )
            .await
        }
        Commands::Config {
            server,
            api_key,
            agent,
        } => {
            let result = if server.is_none() && api_key.is_none() && agent.is_none() {
                config::show_config()
            } else {
                config::set_config(server, api_key, agent)
            };
            result.map(|()| 0)
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
