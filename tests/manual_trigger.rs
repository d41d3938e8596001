use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use flyerthread::commands::{handle_message, run_command_loop};
use flyerthread::config::{Config, Store};
use flyerthread::discord::model::{
    ChannelInfo, ChannelMessage, MessageAuthor, ThreadMetadata, ThreadRef,
};
use flyerthread::discord::DiscordService;
use flyerthread::images::EncodedFlyer;
use flyerthread::messages::Locale;
use flyerthread::schedule::Schedule;
use flyerthread::scrape::FlyerSource;

const CHANNEL: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
enum DiscordCall {
    ChannelInfo,
    ActiveThreads,
    ArchivedThreads,
    CreateThread { name: String },
    ArchiveThread,
    SendText { channel: u64, content: String },
    SendFiles { thread: u64, count: usize },
    MessagesAfter { after: Option<u64> },
}

#[derive(Clone, Default)]
struct RecordingDiscord {
    calls: Arc<Mutex<Vec<DiscordCall>>>,
    message_batches: Arc<Mutex<VecDeque<Vec<ChannelMessage>>>>,
    next_thread_id: Arc<Mutex<u64>>,
}

impl RecordingDiscord {
    fn new() -> Self {
        Self {
            next_thread_id: Arc::new(Mutex::new(100)),
            ..Default::default()
        }
    }

    /// Scripts one reply per `messages_after` call; later calls see an
    /// empty channel.
    fn with_message_batches(self, batches: Vec<Vec<ChannelMessage>>) -> Self {
        *self.message_batches.try_lock().unwrap() = VecDeque::from(batches);
        self
    }

    async fn calls(&self) -> Vec<DiscordCall> {
        self.calls.lock().await.clone()
    }

    async fn texts_to(&self, channel: u64) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                DiscordCall::SendText { channel: ch, content } if *ch == channel => {
                    Some(content.clone())
                }
                _ => None,
            })
            .collect()
    }

    async fn created_threads(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                DiscordCall::CreateThread { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    async fn poll_cursors(&self) -> Vec<Option<u64>> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                DiscordCall::MessagesAfter { after } => Some(*after),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl DiscordService for RecordingDiscord {
    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo> {
        self.calls.lock().await.push(DiscordCall::ChannelInfo);
        Ok(ChannelInfo {
            id: channel_id,
            guild_id: Some(1),
            name: Some("flyers".into()),
        })
    }

    async fn active_threads(&self, _channel: &ChannelInfo) -> Result<Vec<ThreadRef>> {
        self.calls.lock().await.push(DiscordCall::ActiveThreads);
        Ok(Vec::new())
    }

    async fn archived_threads(&self, _channel_id: u64) -> Result<Vec<ThreadRef>> {
        self.calls.lock().await.push(DiscordCall::ArchivedThreads);
        Ok(Vec::new())
    }

    async fn create_thread(&self, channel_id: u64, name: &str) -> Result<ThreadRef> {
        self.calls.lock().await.push(DiscordCall::CreateThread {
            name: name.to_string(),
        });
        let mut next = self.next_thread_id.lock().await;
        let id = *next;
        *next += 1;
        Ok(ThreadRef {
            id,
            name: name.to_string(),
            parent_id: Some(channel_id),
            thread_metadata: ThreadMetadata::default(),
        })
    }

    async fn archive_thread(&self, _thread_id: u64) -> Result<()> {
        self.calls.lock().await.push(DiscordCall::ArchiveThread);
        Ok(())
    }

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<()> {
        self.calls.lock().await.push(DiscordCall::SendText {
            channel: channel_id,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn send_files(&self, channel_id: u64, files: &[EncodedFlyer]) -> Result<()> {
        self.calls.lock().await.push(DiscordCall::SendFiles {
            thread: channel_id,
            count: files.len(),
        });
        Ok(())
    }

    async fn messages_after(
        &self,
        _channel_id: u64,
        after: Option<u64>,
        _limit: u8,
    ) -> Result<Vec<ChannelMessage>> {
        self.calls
            .lock()
            .await
            .push(DiscordCall::MessagesAfter { after });
        Ok(self
            .message_batches
            .lock()
            .await
            .pop_front()
            .unwrap_or_default())
    }
}

#[derive(Clone, Default)]
struct StubSource;

#[async_trait]
impl FlyerSource for StubSource {
    async fn flyer_image_urls(&self, _page_url: &str) -> Result<Vec<String>> {
        Ok(vec!["https://cdn.example/pages/page1.webp".into()])
    }

    async fn download_image(&self, _image_url: &str) -> Result<Vec<u8>> {
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        Ok(buf)
    }
}

fn config() -> Config {
    Config {
        token: "t".repeat(60),
        channel_id: CHANNEL,
        timezone: chrono_tz::Europe::Oslo,
        schedule: Schedule {
            day: 0,
            hour: 8,
            minute: 15,
        },
        locale: Locale::En,
        excluded_flyer_pages: 0,
        stores: vec![Store {
            name: "Acme".into(),
            url: "https://acme.example/flyer".into(),
        }],
    }
}

fn message(id: u64, channel: u64, content: &str, bot: bool) -> ChannelMessage {
    ChannelMessage {
        id,
        channel_id: channel,
        content: content.into(),
        author: MessageAuthor {
            id: 7,
            username: "alice".into(),
            bot,
        },
    }
}

#[tokio::test]
async fn other_chatter_is_ignored() {
    let discord = RecordingDiscord::new();
    let source = StubSource;
    let cfg = config();
    let job_lock = Mutex::new(());

    let handled = handle_message(
        &discord,
        &source,
        &cfg,
        &job_lock,
        &message(1, CHANNEL, "anyone got the milk price?", false),
    )
    .await;

    assert!(!handled);
    assert!(discord.calls().await.is_empty());
}

#[tokio::test]
async fn trigger_outside_configured_channel_is_rejected() {
    let discord = RecordingDiscord::new();
    let source = StubSource;
    let cfg = config();
    let job_lock = Mutex::new(());

    let handled = handle_message(
        &discord,
        &source,
        &cfg,
        &job_lock,
        &message(1, 999, "$postnow", false),
    )
    .await;

    assert!(handled);
    let calls = discord.calls().await;
    assert_eq!(
        calls,
        [DiscordCall::SendText {
            channel: 999,
            content: "This command can only be used in the configured channel.".into(),
        }]
    );
}

#[tokio::test]
async fn trigger_acks_before_running_the_job() {
    let discord = RecordingDiscord::new();
    let source = StubSource;
    let cfg = config();
    let job_lock = Mutex::new(());

    let handled = handle_message(
        &discord,
        &source,
        &cfg,
        &job_lock,
        &message(1, CHANNEL, "$postnow", false),
    )
    .await;

    assert!(handled);
    let calls = discord.calls().await;
    assert_eq!(
        calls[0],
        DiscordCall::SendText {
            channel: CHANNEL,
            content: "Manually starting flyer posting...".into(),
        }
    );
    assert_eq!(calls[1], DiscordCall::ChannelInfo);

    let created = discord.created_threads().await;
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("Acme - Week "));
    assert!(calls.contains(&DiscordCall::SendFiles { thread: 100, count: 1 }));

    // Ack plus the end-of-run summary.
    assert_eq!(discord.texts_to(CHANNEL).await.len(), 2);
}

#[tokio::test]
async fn trigger_tolerates_surrounding_whitespace() {
    let discord = RecordingDiscord::new();
    let source = StubSource;
    let cfg = config();
    let job_lock = Mutex::new(());

    let handled = handle_message(
        &discord,
        &source,
        &cfg,
        &job_lock,
        &message(1, CHANNEL, "  $postnow \n", false),
    )
    .await;

    assert!(handled);
    assert_eq!(discord.created_threads().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn command_loop_skips_bots_and_starts_after_history() {
    let discord = RecordingDiscord::new().with_message_batches(vec![
        // Seed probe: the newest pre-existing message.
        vec![message(10, CHANNEL, "$postnow", false)],
        // First poll: a bot echo and a real trigger.
        vec![
            message(11, CHANNEL, "$postnow", true),
            message(12, CHANNEL, "$postnow", false),
        ],
    ]);
    let source = StubSource;
    let cfg = Arc::new(config());
    let job_lock = Arc::new(Mutex::new(()));

    let worker = tokio::spawn(run_command_loop(
        Arc::new(discord.clone()),
        Arc::new(source),
        cfg,
        job_lock,
    ));
    tokio::time::sleep(Duration::from_secs(60)).await;
    worker.abort();

    // The pre-existing trigger behind the seed cursor is never replayed and
    // the bot echo is skipped, so exactly one job runs.
    let acks = discord
        .texts_to(CHANNEL)
        .await
        .into_iter()
        .filter(|text| text == "Manually starting flyer posting...")
        .count();
    assert_eq!(acks, 1);
    assert_eq!(discord.created_threads().await.len(), 1);

    let cursors = discord.poll_cursors().await;
    assert_eq!(cursors[0], None);
    assert_eq!(cursors[1], Some(10));
    assert_eq!(cursors[2], Some(12));
}
