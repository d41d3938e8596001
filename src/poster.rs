//! The weekly posting job: reconcile per-store threads for the current ISO
//! week, then scrape, transcode, and upload each store's flyer pages.
//!
//! Failure containment is deliberate and layered. Only channel lookup and
//! thread listing abort a run; a store, an image, or an upload batch failing
//! is logged and the run moves on. Flyers are low-stakes content, so nothing
//! here retries.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::config::{Config, Store};
use crate::discord::model::ThreadRef;
use crate::discord::{channel_mention, DiscordService, MAX_FILES_PER_MESSAGE};
use crate::images::{self, EncodedFlyer};
use crate::scrape::FlyerSource;

/// Canonical thread name for a store and ISO week.
pub fn thread_name(store: &str, week: u32) -> String {
    format!("{store} - Week {week}")
}

/// A thread is stale when it wears some store's name prefix without being
/// that store's thread for the current week.
fn is_stale(name: &str, stores: &[Store], week: u32) -> bool {
    stores
        .iter()
        .any(|s| name.starts_with(&s.name) && name != thread_name(&s.name, week))
}

/// Drop the last `excluded` entries. Over-long exclusion empties the batch
/// instead of erroring.
fn apply_trailing_exclusion(mut urls: Vec<String>, excluded: usize) -> Vec<String> {
    let keep = urls.len().saturating_sub(excluded);
    urls.truncate(keep);
    urls
}

/// Run one complete posting pass for the week containing `now`.
pub async fn post_flyers(
    discord: &dyn DiscordService,
    source: &dyn FlyerSource,
    cfg: &Config,
    now: DateTime<Tz>,
) -> Result<()> {
    let week = now.iso_week().week();
    info!(week, stores = cfg.stores.len(), "starting flyer posting run");

    let channel = discord
        .channel_info(cfg.channel_id)
        .await
        .context("failed to resolve the flyer channel")?;
    let active = discord
        .active_threads(&channel)
        .await
        .context("failed to list active threads")?;
    let archived = discord
        .archived_threads(cfg.channel_id)
        .await
        .context("failed to list archived threads")?;

    // Archive leftovers from earlier weeks before resolving this week's
    // threads, whatever their current archived flag claims.
    for thread in active.iter().chain(archived.iter()) {
        if is_stale(&thread.name, &cfg.stores, week) {
            info!(thread = %thread.name, "archiving stale flyer thread");
            if let Err(err) = discord.archive_thread(thread.id).await {
                warn!(thread = %thread.name, ?err, "failed to archive stale thread");
            }
        }
    }

    let mut mentions: Vec<String> = Vec::new();
    for store in &cfg.stores {
        let thread = match resolve_thread(discord, cfg.channel_id, &active, &store.name, week).await
        {
            Some(thread) => thread,
            None => continue,
        };
        post_store_flyers(discord, source, cfg, store, &thread, &mut mentions).await;
    }

    if !mentions.is_empty() {
        let summary = cfg.locale.summary(week, &mentions.join("\n"));
        if let Err(err) = discord.send_text(cfg.channel_id, &summary).await {
            warn!(?err, "failed to send the weekly summary");
        }
    }

    info!(week, posted = mentions.len(), "flyer posting run finished");
    Ok(())
}

/// Reuse this week's thread when an active one carries the exact expected
/// name; otherwise create it. `None` skips the store for this run.
async fn resolve_thread(
    discord: &dyn DiscordService,
    channel_id: u64,
    active: &[ThreadRef],
    store_name: &str,
    week: u32,
) -> Option<ThreadRef> {
    let expected = thread_name(store_name, week);
    if let Some(existing) = active.iter().find(|t| t.name == expected && !t.archived()) {
        info!(thread = %expected, "reusing existing flyer thread");
        return Some(existing.clone());
    }
    match discord.create_thread(channel_id, &expected).await {
        Ok(thread) => {
            info!(thread = %expected, "created flyer thread");
            Some(thread)
        }
        Err(err) => {
            warn!(thread = %expected, ?err, "failed to create flyer thread; skipping store");
            None
        }
    }
}

/// Fetch, transcode, and upload one store's flyers into its thread. The
/// thread mention is recorded once the fetch has succeeded, so a store that
/// fails at fetch never appears in the summary.
async fn post_store_flyers(
    discord: &dyn DiscordService,
    source: &dyn FlyerSource,
    cfg: &Config,
    store: &Store,
    thread: &ThreadRef,
    mentions: &mut Vec<String>,
) {
    let urls = match source.flyer_image_urls(&store.url).await {
        Ok(urls) => urls,
        Err(err) => {
            warn!(store = %store.name, url = %store.url, ?err, "failed to fetch flyer images; skipping store");
            return;
        }
    };
    mentions.push(channel_mention(thread.id));

    let total = urls.len();
    let urls = apply_trailing_exclusion(urls, cfg.excluded_flyer_pages);
    if cfg.excluded_flyer_pages > 0 {
        info!(store = %store.name, total, kept = urls.len(), "dropped trailing flyer pages");
    }

    if urls.is_empty() {
        info!(store = %store.name, "no flyer images found");
        if let Err(err) = discord.send_text(thread.id, cfg.locale.no_flyers()).await {
            warn!(store = %store.name, ?err, "failed to send the no-flyers notice");
        }
        return;
    }

    let mut encoded: Vec<EncodedFlyer> = Vec::with_capacity(urls.len());
    for url in &urls {
        match download_and_encode(source, url).await {
            Ok(flyer) => encoded.push(flyer),
            Err(err) => warn!(store = %store.name, %url, ?err, "failed to process flyer image"),
        }
    }

    info!(store = %store.name, images = encoded.len(), "uploading flyer images");
    for batch in encoded.chunks(MAX_FILES_PER_MESSAGE) {
        if let Err(err) = discord.send_files(thread.id, batch).await {
            warn!(store = %store.name, batch_size = batch.len(), ?err, "failed to upload a flyer batch");
        }
    }
}

async fn download_and_encode(source: &dyn FlyerSource, url: &str) -> Result<EncodedFlyer> {
    let bytes = source.download_image(url).await?;
    images::transcode(&bytes, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores(names: &[&str]) -> Vec<Store> {
        names
            .iter()
            .map(|name| Store {
                name: (*name).into(),
                url: format!("https://{}.example/flyer", name.to_lowercase()),
            })
            .collect()
    }

    #[test]
    fn thread_names_are_deterministic() {
        assert_eq!(thread_name("Rema 1000", 37), "Rema 1000 - Week 37");
        assert_eq!(thread_name("Kiwi", 1), "Kiwi - Week 1");
    }

    #[test]
    fn staleness_follows_prefix_and_week() {
        let stores = stores(&["Rema 1000", "Kiwi"]);
        assert!(!is_stale("Rema 1000 - Week 37", &stores, 37));
        assert!(is_stale("Rema 1000 - Week 36", &stores, 37));
        assert!(is_stale("Kiwi - Week 2", &stores, 37));
        assert!(is_stale("Kiwi extra chatter", &stores, 37));
        assert!(!is_stale("General banter", &stores, 37));
    }

    #[test]
    fn trailing_exclusion_never_errors() {
        let urls: Vec<String> = (1..=5).map(|i| format!("u{i}")).collect();
        assert_eq!(apply_trailing_exclusion(urls.clone(), 0), urls);
        assert_eq!(apply_trailing_exclusion(urls.clone(), 2), ["u1", "u2", "u3"]);
        assert!(apply_trailing_exclusion(urls.clone(), 5).is_empty());
        assert!(apply_trailing_exclusion(urls, 9).is_empty());
    }
}
