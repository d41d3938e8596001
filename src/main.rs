use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use flyerthread::commands;
use flyerthread::config::Config;
use flyerthread::discord::{DiscordClient, DiscordService};
use flyerthread::schedule;
use flyerthread::scrape::{FlyerSource, WebScraper};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to a .env file; defaults to .env in the working directory
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    load_env(args.env_file.as_ref())?;

    let cfg = Arc::new(Config::from_env()?);

    let client = DiscordClient::new(cfg.token.clone());
    let me = client
        .current_user()
        .await
        .context("discord login failed")?;
    info!(bot = %me.username, channel = cfg.channel_id, "logged in to Discord");

    let discord: Arc<dyn DiscordService> = Arc::new(client);
    let source: Arc<dyn FlyerSource> = Arc::new(WebScraper::new()?);
    let job_lock = Arc::new(Mutex::new(()));

    // Command polling runs beside the scheduler; both share the job lock so
    // a manual trigger and a scheduled run never overlap.
    tokio::spawn(commands::run_command_loop(
        discord.clone(),
        source.clone(),
        cfg.clone(),
        job_lock.clone(),
    ));

    info!(
        day = cfg.schedule.day,
        hour = cfg.schedule.hour,
        minute = cfg.schedule.minute,
        timezone = %cfg.timezone,
        stores = cfg.stores.len(),
        "starting weekly flyer scheduler"
    );
    schedule::run(discord, source, cfg, job_lock).await;

    Ok(())
}

fn load_env(path: Option<&PathBuf>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            // Best effort; running purely off process env is fine.
            let _ = dotenvy::dotenv();
        }
    }
    Ok(())
}
