use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use flyerthread::config::Config;
use flyerthread::discord::DiscordClient;
use flyerthread::poster;
use flyerthread::scrape::WebScraper;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one flyer posting job immediately and exit"
)]
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
    match &args.env_file {
        Some(path) => dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?,
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    let cfg = Config::from_env()?;

    let client = DiscordClient::new(cfg.token.clone());
    let me = client
        .current_user()
        .await
        .context("discord login failed")?;
    info!(bot = %me.username, stores = cfg.stores.len(), "logged in to Discord");

    let scraper = WebScraper::new()?;
    let now = Utc::now().with_timezone(&cfg.timezone);
    poster::post_flyers(&client, &scraper, &cfg, now).await?;

    info!("posting job finished");
    Ok(())
}
