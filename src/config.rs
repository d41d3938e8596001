//! Configuration loader and validator for the flyer-posting bot.
//!
//! Everything comes from the process environment (optionally seeded from a
//! `.env` file by the binaries). Only the bot token and the target channel
//! are load-bearing enough to refuse startup; every other option degrades to
//! a documented default with a warning.

use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::messages::Locale;
use crate::schedule::Schedule;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Anything shorter than this is a paste error, not a Discord bot token.
const MIN_TOKEN_LEN: usize = 50;

const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Oslo;
const DEFAULT_POSTING_DAY: u32 = 0;
const DEFAULT_POSTING_HOUR: u32 = 8;
const DEFAULT_POSTING_MINUTE: u32 = 15;

/// One scrape target: display name (unique, also the thread-name prefix) and
/// the flyer page URL.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Store {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub channel_id: u64,
    pub timezone: Tz,
    pub schedule: Schedule,
    pub locale: Locale,
    pub excluded_flyer_pages: usize,
    pub stores: Vec<Store>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup, so tests can
    /// feed maps instead of mutating process-global environment state.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = get("DISCORD_TOKEN").unwrap_or_default();
        if token.len() < MIN_TOKEN_LEN {
            return Err(ConfigError::Invalid(
                "DISCORD_TOKEN is missing or implausibly short",
            ));
        }

        let channel_id = get("CHANNEL_ID")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|id| *id > 0)
            .ok_or(ConfigError::Invalid(
                "CHANNEL_ID must be a positive integer",
            ))?;

        let timezone = match get("TIMEZONE") {
            None => DEFAULT_TIMEZONE,
            Some(raw) => match raw.trim().parse::<Tz>() {
                Ok(tz) => tz,
                Err(_) => {
                    warn!(timezone = %raw, "invalid TIMEZONE; falling back to UTC");
                    chrono_tz::UTC
                }
            },
        };

        let schedule = Schedule {
            day: bounded(&get, "POSTING_DAY", 6, DEFAULT_POSTING_DAY),
            hour: bounded(&get, "POSTING_HOUR", 23, DEFAULT_POSTING_HOUR),
            minute: bounded(&get, "POSTING_MINUTE", 59, DEFAULT_POSTING_MINUTE),
        };

        let locale = match get("LANGUAGE") {
            None => Locale::DEFAULT,
            Some(raw) => Locale::from_key(raw.trim()).unwrap_or_else(|| {
                warn!(
                    language = %raw,
                    fallback = Locale::DEFAULT.key(),
                    "unsupported LANGUAGE; using fallback"
                );
                Locale::DEFAULT
            }),
        };

        let excluded_flyer_pages = match get("EXCLUDED_FLYER_PAGES") {
            None => 0,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) if n >= 0 => n as usize,
                _ => {
                    warn!(
                        value = %raw,
                        "EXCLUDED_FLYER_PAGES must be a non-negative integer; using 0"
                    );
                    0
                }
            },
        };

        let stores = match get("STORES") {
            None => {
                warn!("STORES is not set; no scrape targets configured");
                Vec::new()
            }
            Some(raw) => match serde_json::from_str::<Vec<Store>>(&raw) {
                Ok(stores) => stores,
                Err(err) => {
                    warn!(?err, "STORES is not a valid JSON store array; ignoring it");
                    Vec::new()
                }
            },
        };

        Ok(Config {
            token,
            channel_id,
            timezone,
            schedule,
            locale,
            excluded_flyer_pages,
            stores,
        })
    }
}

/// Parse an integer variable that must lie in `0..=max`; out-of-range and
/// unparseable values fall back with a warning.
fn bounded(get: &impl Fn(&str) -> Option<String>, key: &'static str, max: u32, default: u32) -> u32 {
    match get(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(v) if v <= max => v,
            _ => {
                warn!(key, value = %raw, fallback = default, "schedule value out of range; using fallback");
                default
            }
        },
    }
}

/// Returns a complete example `.env` body.
pub fn example() -> &'static str {
    r#"DISCORD_TOKEN=xxxxxxxxxxxxxxxxxxxxxxxx.xxxxxx.xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx
CHANNEL_ID=1234567890123456789

# IANA zone used for the posting schedule below.
TIMEZONE=Europe/Oslo

# 0 = Monday .. 6 = Sunday. The job runs in the 15-minute window starting at
# POSTING_HOUR:POSTING_MINUTE on that day.
POSTING_DAY=0
POSTING_HOUR=8
POSTING_MINUTE=15

# Message language: en or no.
LANGUAGE=en

# Trailing flyer pages to drop (ads at the end of the flyer).
EXCLUDED_FLYER_PAGES=0

# Scrape targets, in posting order.
STORES=[{"name":"Rema 1000","url":"https://www.rema.no/tilbudsavis"},{"name":"Kiwi","url":"https://kiwi.no/avis"}]
"#
}
