//! pipewright CLI tool.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod manifest;

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(about = "Multi-repository CI/CD pipeline provisioning", long_about = None)]
struct Cli {
    /// Path to the deployment file
    #[arg(long, env = "PIPEWRIGHT_CONFIG", default_value = "pipewright.kdl")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the deployment file and configure every pipeline without submitting
    Validate,
    /// Configure every pipeline and write its description to a directory
    Synth {
        /// Output directory
        #[arg(long, default_value = "pipewright.out")]
        out: PathBuf,
    },
    /// Handle a build status event
    Notify {
        #[command(subcommand)]
        command: NotifyCommands,
    },
    /// Manage the local secret store
    Secrets {
        #[command(subcommand)]
        command: SecretCommands,
    },
}

#[derive(Subcommand)]
enum NotifyCommands {
    /// Update the commit status on GitHub
    Github {
        #[command(flatten)]
        args: commands::notify::EventArgs,
    },
    /// Post the build result to a Discord channel
    Discord {
        #[command(flatten)]
        args: commands::notify::EventArgs,
        /// Channel to post to
        #[arg(long, env = "DISCORD_CHANNEL_ID")]
        channel: String,
    },
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Set a secret, or one field of a map secret
    Set {
        key: String,
        value: String,
        #[arg(long)]
        field: Option<String>,
    },
    /// Print a secret
    Get {
        key: String,
        #[arg(long)]
        field: Option<String>,
    },
    /// List secret keys
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Report secrets that have not been updated recently
    Check {
        #[arg(long, default_value_t = pipewright_config::secrets::DEFAULT_MAX_AGE_DAYS)]
        max_age_days: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    match cli.command {
        Commands::Validate => {
            commands::validate(&cli.config)?;
        }
        Commands::Synth { out } => {
            commands::synth(&cli.config, &out).await?;
        }
        Commands::Notify { command } => match command {
            NotifyCommands::Github { args } => {
                commands::notify::github(&cli.config, &args).await?;
            }
            NotifyCommands::Discord { args, channel } => {
                commands::notify::discord(&cli.config, &args, &channel).await?;
            }
        },
        Commands::Secrets { command } => match command {
            SecretCommands::Set { key, value, field } => {
                commands::secrets::set(&cli.config, &key, value, field).await?;
            }
            SecretCommands::Get { key, field } => {
                commands::secrets::get(&cli.config, &key, field.as_deref()).await?;
            }
            SecretCommands::List { prefix } => {
                commands::secrets::list(&cli.config, &prefix).await?;
            }
            SecretCommands::Check { max_age_days } => {
                commands::secrets::check(&cli.config, max_age_days).await?;
            }
        },
    }

    Ok(())
}
