//! Typed views of the Discord REST payloads the bot touches.
//!
//! Discord serializes snowflake IDs as JSON strings; the deserializers here
//! turn them back into `u64` so the rest of the crate never handles raw ID
//! strings.

use serde::{Deserialize, Deserializer};

fn snowflake<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(de)?;
    raw.parse::<u64>()
        .map_err(|_| serde::de::Error::custom(format!("invalid snowflake {raw:?}")))
}

fn opt_snowflake<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
    match Option::<String>::deserialize(de)? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid snowflake {raw:?}"))),
    }
}

/// `GET /channels/{id}` — only the fields reconciliation needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub guild_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadMetadata {
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub archive_timestamp: Option<String>,
}

/// A thread as it appears in active/archived listings and creation responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadRef {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    pub name: String,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub thread_metadata: ThreadMetadata,
}

impl ThreadRef {
    pub fn archived(&self) -> bool {
        self.thread_metadata.archived
    }
}

/// Shared shape of the active-threads and archived-threads listings; the
/// active listing simply never sets `has_more`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadList {
    pub threads: Vec<ThreadRef>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageAuthor {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// `GET /channels/{id}/messages` item, trimmed to command-dispatch needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMessage {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(deserialize_with = "snowflake")]
    pub channel_id: u64,
    pub content: String,
    pub author: MessageAuthor,
}

/// `GET /users/@me`, the login probe.
#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    pub username: String,
}
