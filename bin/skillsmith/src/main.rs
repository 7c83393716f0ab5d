mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "skillsmith")]
#[command(about = "Record browser HTTP traffic and turn it into agent skill prompts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List open browser tabs
    Tabs,

    /// Record one tab until Ctrl-C (or until the tab goes away)
    Record {
        /// Tab id as shown by `skillsmith tabs`
        #[arg(short, long)]
        tab: String,

        /// Label for the session
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Serve the control bus as JSON lines on stdin/stdout
    Serve,

    /// Browse and manage recorded sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommands,
    },

    /// Manage individual records
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },

    /// Export a session as JSONL
    Export {
        /// Session id
        session: String,

        /// Output file (defaults to ~/.skillsmith/exports/session-<id>.jsonl)
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },

    /// Generate agent prompts from recorded sessions
    Prompt {
        #[command(subcommand)]
        command: PromptCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Language model utilities
    Llm {
        #[command(subcommand)]
        command: LlmCommands,
    },
}

#[derive(Subcommand)]
enum SessionsCommands {
    /// List sessions, newest first
    List {
        /// Group by domain
        #[arg(short, long)]
        group: bool,
    },
    /// Show a session with its records
    Show {
        id: String,
    },
    /// Delete a session and all its records
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum RecordsCommands {
    /// Delete records from a session
    Delete {
        /// Owning session id
        session: String,
        /// Record ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum PromptCommands {
    /// Generate a prompt from one session or a whole domain
    Generate {
        /// Use a single session
        #[arg(long, conflicts_with = "domain", required_unless_present = "domain")]
        session: Option<String>,

        /// Use every session of a domain ("Unknown" for sessions without one)
        #[arg(long)]
        domain: Option<String>,

        /// What the generated prompt should achieve
        #[arg(short, long, default_value = "")]
        goal: String,

        /// Print the response as it streams
        #[arg(long)]
        stream: bool,

        /// Only print the meta-prompt, do not call the model
        #[arg(long)]
        dry_run: bool,
    },
    /// List generated prompts, newest first
    History,
    /// Show one generated prompt
    Show {
        id: i64,
    },
    /// Delete a generated prompt
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current configuration
    Show,
    /// Set a value by dotted key (e.g. llm.modelName)
    Set {
        key: String,
        value: String,
    },
}

#[derive(Subcommand)]
enum LlmCommands {
    /// Check that the configured endpoint answers
    Test,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr so `serve` can own stdout.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Tabs => {
            commands::record::tabs().await?;
        }
        Commands::Record { tab, description } => {
            commands::record::record(&tab, &description).await?;
        }
        Commands::Serve => {
            commands::record::serve().await?;
        }
        Commands::Sessions { command } => match command {
            SessionsCommands::List { group } => {
                commands::sessions::list(group).await?;
            }
            SessionsCommands::Show { id } => {
                commands::sessions::show(&id).await?;
            }
            SessionsCommands::Delete { id } => {
                commands::sessions::delete(&id).await?;
            }
        },
        Commands::Records { command } => match command {
            RecordsCommands::Delete { session, ids } => {
                commands::sessions::delete_records(&session, &ids).await?;
            }
        },
        Commands::Export { session, output } => {
            commands::sessions::export(&session, output).await?;
        }
        Commands::Prompt { command } => match command {
            PromptCommands::Generate {
                session,
                domain,
                goal,
                stream,
                dry_run,
            } => {
                commands::prompt::generate(session, domain, &goal, stream, dry_run).await?;
            }
            PromptCommands::History => {
                commands::prompt::history().await?;
            }
            PromptCommands::Show { id } => {
                commands::prompt::show(id).await?;
            }
            PromptCommands::Delete { id } => {
                commands::prompt::delete(id).await?;
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::config_cmd::show().await?;
            }
            ConfigCommands::Set { key, value } => {
                commands::config_cmd::set(&key, &value).await?;
            }
        },
        Commands::Llm { command } => match command {
            LlmCommands::Test => {
                commands::prompt::test_connection().await?;
            }
        },
    }

    Ok(())
}
