use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use tracing::warn;

use crate::images::EncodedFlyer;

pub mod model;

use model::{BotUser, ChannelInfo, ChannelMessage, ThreadList, ThreadRef};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10/";

/// Channel type 11: public thread.
const PUBLIC_THREAD: u8 = 11;
/// Longest auto-archive duration Discord offers (7 days), in minutes.
const AUTO_ARCHIVE_MINUTES: u32 = 10080;
/// Discord caps attachments per message.
pub const MAX_FILES_PER_MESSAGE: usize = 10;

/// Everything the posting job and command loop need from Discord. The
/// concrete client talks REST; tests substitute recorders.
#[async_trait]
pub trait DiscordService: Send + Sync {
    /// Channel lookup; a channel outside a guild is an error.
    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo>;

    /// Active threads whose parent is the given channel.
    async fn active_threads(&self, channel: &ChannelInfo) -> Result<Vec<ThreadRef>>;

    /// All public archived threads of a channel, following pagination.
    async fn archived_threads(&self, channel_id: u64) -> Result<Vec<ThreadRef>>;

    /// Create a public thread with the 7-day auto-archive duration.
    async fn create_thread(&self, channel_id: u64, name: &str) -> Result<ThreadRef>;

    async fn archive_thread(&self, thread_id: u64) -> Result<()>;

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<()>;

    /// Upload up to [`MAX_FILES_PER_MESSAGE`] attachments as one message.
    async fn send_files(&self, channel_id: u64, files: &[EncodedFlyer]) -> Result<()>;

    /// Messages of a channel newer than `after` (or the newest ones when
    /// `after` is `None`), oldest first.
    async fn messages_after(
        &self,
        channel_id: u64,
        after: Option<u64>,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>>;
}

#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    pub fn new(token: String) -> Self {
        let base_url = Url::parse(DISCORD_API_BASE).expect("valid default Discord URL");
        Self::with_base_url(token, base_url)
    }

    pub fn with_base_url(token: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("flyerthread/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid Discord endpoint {path}"))
    }

    fn bot_auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Build an authorized GET request; exposed so header handling stays
    /// testable without a server.
    pub fn build_get(&self, path: &str) -> Result<reqwest::Request> {
        self.http
            .get(self.endpoint(path)?)
            .header("Authorization", self.bot_auth())
            .build()
            .context("failed to build Discord request")
    }

    async fn execute(&self, request: reqwest::Request) -> Result<String> {
        let url = request.url().clone();
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Discord")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(%url, "rate limited by Discord: {body}");
            return Err(anyhow!("received 429 from Discord: {body}"));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %url, "discord API error: {body}");
            return Err(anyhow!("discord error {status} for {url}: {body}"));
        }

        res.text().await.context("failed to read Discord response")
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let request = self
            .http
            .get(url)
            .header("Authorization", self.bot_auth())
            .build()
            .context("failed to build Discord request")?;
        let body = self.execute(request).await?;
        serde_json::from_str(&body).context("invalid Discord response JSON")
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<String> {
        let request = self
            .http
            .post(url)
            .header("Authorization", self.bot_auth())
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build Discord request")?;
        self.execute(request).await
    }

    /// `GET /users/@me`, the startup login probe.
    pub async fn current_user(&self) -> Result<BotUser> {
        self.get_json(self.endpoint("users/@me")?).await
    }
}

#[async_trait]
impl DiscordService for DiscordClient {
    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo> {
        let info: ChannelInfo = self
            .get_json(self.endpoint(&format!("channels/{channel_id}"))?)
            .await?;
        if info.guild_id.is_none() {
            bail!("channel {channel_id} is not a guild channel");
        }
        Ok(info)
    }

    async fn active_threads(&self, channel: &ChannelInfo) -> Result<Vec<ThreadRef>> {
        let guild_id = channel
            .guild_id
            .ok_or_else(|| anyhow!("channel {} has no guild", channel.id))?;
        let list: ThreadList = self
            .get_json(self.endpoint(&format!("guilds/{guild_id}/threads/active"))?)
            .await?;
        Ok(list
            .threads
            .into_iter()
            .filter(|t| t.parent_id == Some(channel.id))
            .collect())
    }

    async fn archived_threads(&self, channel_id: u64) -> Result<Vec<ThreadRef>> {
        let mut all = Vec::new();
        let mut before: Option<String> = None;
        loop {
            let mut url =
                self.endpoint(&format!("channels/{channel_id}/threads/archived/public"))?;
            if let Some(ts) = &before {
                url.query_pairs_mut().append_pair("before", ts);
            }
            let page: ThreadList = self.get_json(url).await?;
            let exhausted = !page.has_more || page.threads.is_empty();
            before = page
                .threads
                .last()
                .and_then(|t| t.thread_metadata.archive_timestamp.clone());
            all.extend(page.threads);
            if exhausted || before.is_none() {
                return Ok(all);
            }
        }
    }

    async fn create_thread(&self, channel_id: u64, name: &str) -> Result<ThreadRef> {
        let url = self.endpoint(&format!("channels/{channel_id}/threads"))?;
        let body = self.post_json(url, &build_create_thread_body(name)).await?;
        serde_json::from_str(&body).context("invalid thread creation response")
    }

    async fn archive_thread(&self, thread_id: u64) -> Result<()> {
        let request = self
            .http
            .patch(self.endpoint(&format!("channels/{thread_id}"))?)
            .header("Authorization", self.bot_auth())
            .header("Content-Type", "application/json")
            .json(&json!({ "archived": true }))
            .build()
            .context("failed to build Discord request")?;
        self.execute(request).await?;
        Ok(())
    }

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<()> {
        let url = self.endpoint(&format!("channels/{channel_id}/messages"))?;
        self.post_json(url, &json!({ "content": content })).await?;
        Ok(())
    }

    async fn send_files(&self, channel_id: u64, files: &[EncodedFlyer]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        if files.len() > MAX_FILES_PER_MESSAGE {
            bail!(
                "attempted to send {} files in one message (limit {MAX_FILES_PER_MESSAGE})",
                files.len()
            );
        }

        let mut form = reqwest::multipart::Form::new().text(
            "payload_json",
            serde_json::to_string(&build_files_payload(files))?,
        );
        for (i, file) in files.iter().enumerate() {
            form = form.part(
                format!("files[{i}]"),
                reqwest::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.filename.clone())
                    .mime_str(file.content_type())?,
            );
        }

        let request = self
            .http
            .post(self.endpoint(&format!("channels/{channel_id}/messages"))?)
            .header("Authorization", self.bot_auth())
            .multipart(form)
            .build()
            .context("failed to build file upload request")?;
        self.execute(request).await?;
        Ok(())
    }

    async fn messages_after(
        &self,
        channel_id: u64,
        after: Option<u64>,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>> {
        let mut url = self.endpoint(&format!("channels/{channel_id}/messages"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(after) = after {
                query.append_pair("after", &after.to_string());
            }
        }
        let mut messages: Vec<ChannelMessage> = self.get_json(url).await?;
        // Snowflakes are time-ordered; normalize to oldest-first.
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }
}

/// `<#id>` renders as a clickable channel/thread link in Discord.
pub fn channel_mention(id: u64) -> String {
    format!("<#{id}>")
}

pub fn build_create_thread_body(name: &str) -> Value {
    json!({
        "name": name,
        "auto_archive_duration": AUTO_ARCHIVE_MINUTES,
        "type": PUBLIC_THREAD,
    })
}

/// `payload_json` part for a multipart message upload: one attachment slot
/// per file, ids matching the `files[i]` part names.
pub fn build_files_payload(files: &[EncodedFlyer]) -> Value {
    let attachments: Vec<Value> = files
        .iter()
        .enumerate()
        .map(|(i, f)| json!({ "id": i, "filename": f.filename }))
        .collect();
    json!({ "attachments": attachments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_thread_body_is_public_with_week_long_archive() {
        let body = build_create_thread_body("Rema 1000 - Week 37");
        assert_eq!(body["name"], "Rema 1000 - Week 37");
        assert_eq!(body["type"], 11);
        assert_eq!(body["auto_archive_duration"], 10080);
    }

    #[test]
    fn files_payload_enumerates_attachments() {
        let files = vec![
            EncodedFlyer {
                filename: "page1.png".into(),
                bytes: vec![1],
            },
            EncodedFlyer {
                filename: "page2.jpg".into(),
                bytes: vec![2],
            },
        ];
        let payload = build_files_payload(&files);
        assert_eq!(payload["attachments"][0]["id"], 0);
        assert_eq!(payload["attachments"][0]["filename"], "page1.png");
        assert_eq!(payload["attachments"][1]["id"], 1);
        assert_eq!(payload["attachments"][1]["filename"], "page2.jpg");
    }

    #[test]
    fn get_requests_carry_bot_authorization() {
        let client = DiscordClient::new("token".into());
        let request = client.build_get("channels/42").unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/api/v10/channels/42");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bot token"
        );
    }

    #[test]
    fn mention_uses_channel_syntax() {
        assert_eq!(channel_mention(42), "<#42>");
    }
}
