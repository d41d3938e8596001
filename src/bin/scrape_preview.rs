use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use flyerthread::config::Config;
use flyerthread::scrape::{FlyerSource, WebScraper};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print the flyer image URLs currently visible on store pages"
)]
struct Args {
    /// Page URL to scrape; without it, every configured store is checked
    url: Option<String>,

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

    // With an explicit URL no bot credentials are needed, so the full config
    // is only loaded when scanning the configured stores.
    let targets: Vec<(String, String)> = match args.url {
        Some(url) => vec![("page".into(), url)],
        None => Config::from_env()?
            .stores
            .into_iter()
            .map(|s| (s.name, s.url))
            .collect(),
    };

    let scraper = WebScraper::new()?;
    for (name, url) in targets {
        println!("{name}: {url}");
        match scraper.flyer_image_urls(&url).await {
            Ok(urls) if urls.is_empty() => println!("  (no flyer images found)"),
            Ok(urls) => {
                for u in urls {
                    println!("  {u}");
                }
            }
            Err(err) => println!("  error: {err:#}"),
        }
    }
    Ok(())
}
