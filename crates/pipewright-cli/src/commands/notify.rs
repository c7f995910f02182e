//! Build status notification commands.

use anyhow::{Context, Result, bail};
use clap::Args;
use pipewright_core::notification::NotificationPayload;
use pipewright_notify::{DiscordNotifier, FilePipelineState, GitHubStatusReporter, HandlerResponse};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::secrets::open_store;

#[derive(Args)]
pub struct EventArgs {
    /// Event payload (JSON)
    #[arg(long)]
    event: PathBuf,
    /// Pipeline execution state (JSON)
    #[arg(long)]
    state_file: PathBuf,
    /// Owner of the source repositories
    #[arg(long, env = "GITHUB_REPO_OWNER")]
    owner: Option<String>,
}

fn read_event(path: &Path) -> Result<NotificationPayload> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read event {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid event {}", path.display()))
}

fn report(response: HandlerResponse) -> Result<()> {
    println!("{}", serde_json::to_string(&response)?);
    if !response.is_success() {
        bail!("notification failed with status {}", response.status_code);
    }
    Ok(())
}

pub async fn github(config_path: &Path, args: &EventArgs) -> Result<()> {
    let payload = read_event(&args.event)?;
    let reporter = GitHubStatusReporter::new(
        args.owner.clone(),
        Arc::new(open_store(config_path).await?),
        Arc::new(FilePipelineState::new(&args.state_file)),
    )?;
    report(reporter.handle(&payload).await)
}

pub async fn discord(config_path: &Path, args: &EventArgs, channel: &str) -> Result<()> {
    let payload = read_event(&args.event)?;
    let owner = args
        .owner
        .clone()
        .context("repository owner is required (--owner or GITHUB_REPO_OWNER)")?;
    let notifier = DiscordNotifier::new(
        channel,
        owner,
        Arc::new(open_store(config_path).await?),
        Arc::new(FilePipelineState::new(&args.state_file)),
    )?;
    report(notifier.handle(&payload).await)
}
