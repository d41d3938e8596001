//! Operator command surface: one manual trigger, received by polling the
//! configured channel's message history over REST.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::discord::model::ChannelMessage;
use crate::discord::DiscordService;
use crate::poster;
use crate::scrape::FlyerSource;

/// The one recognized operator command.
pub const MANUAL_TRIGGER: &str = "$postnow";

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const POLL_LIMIT: u8 = 50;

/// React to one inbound message. Returns `true` when the message was the
/// manual trigger, wherever it was issued. The manual path never touches the
/// scheduler's already-ran marker.
#[instrument(skip_all)]
pub async fn handle_message(
    discord: &dyn DiscordService,
    source: &dyn FlyerSource,
    cfg: &Config,
    job_lock: &Mutex<()>,
    message: &ChannelMessage,
) -> bool {
    if message.content.trim() != MANUAL_TRIGGER {
        return false;
    }

    if message.channel_id != cfg.channel_id {
        info!(
            channel = message.channel_id,
            "manual trigger issued outside the configured channel"
        );
        if let Err(err) = discord
            .send_text(
                message.channel_id,
                "This command can only be used in the configured channel.",
            )
            .await
        {
            warn!(?err, "failed to send the wrong-channel notice");
        }
        return true;
    }

    info!(user = %message.author.username, "manual flyer posting requested");
    if let Err(err) = discord
        .send_text(message.channel_id, "Manually starting flyer posting...")
        .await
    {
        warn!(?err, "failed to acknowledge the manual trigger");
    }

    let _running = job_lock.lock().await;
    let now = Utc::now().with_timezone(&cfg.timezone);
    if let Err(err) = poster::post_flyers(discord, source, cfg, now).await {
        error!(?err, "manual flyer posting run failed");
    }
    true
}

/// Newest message ID of the channel, or 0 when the channel is empty.
async fn seed_cursor(discord: &dyn DiscordService, channel_id: u64) -> anyhow::Result<u64> {
    let newest = discord.messages_after(channel_id, None, 1).await?;
    Ok(newest.last().map(|m| m.id).unwrap_or(0))
}

/// Poll the configured channel for operator commands every few seconds.
/// The cursor starts at the newest message so restarts never replay old
/// commands; poll failures are logged and the loop keeps going.
pub async fn run_command_loop(
    discord: Arc<dyn DiscordService>,
    source: Arc<dyn FlyerSource>,
    cfg: Arc<Config>,
    job_lock: Arc<Mutex<()>>,
) {
    let mut cursor: Option<u64> = None;
    loop {
        if cursor.is_none() {
            match seed_cursor(discord.as_ref(), cfg.channel_id).await {
                Ok(id) => {
                    info!(cursor = id, "command loop ready");
                    cursor = Some(id);
                }
                Err(err) => {
                    warn!(?err, "failed to seed the command cursor");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            }
        }

        tokio::time::sleep(POLL_INTERVAL).await;
        let batch = match discord
            .messages_after(cfg.channel_id, cursor, POLL_LIMIT)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                warn!(?err, "failed to poll for commands");
                continue;
            }
        };

        for message in batch {
            cursor = Some(message.id);
            if message.author.bot {
                continue;
            }
            handle_message(
                discord.as_ref(),
                source.as_ref(),
                cfg.as_ref(),
                &job_lock,
                &message,
            )
            .await;
        }
    }
}
