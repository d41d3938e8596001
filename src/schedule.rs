//! Weekly posting window evaluation and the polling loop that drives it.
//!
//! The loop wakes every 15 minutes, converts "now" into the configured
//! timezone and fires the posting job at most once per calendar date, when
//! the tick lands inside the `[minute, minute + 15)` window of the configured
//! weekday and hour. `last_run_date` lives in an explicit [`Scheduler`] so
//! the decision logic can be driven by injected clock values in tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::discord::DiscordService;
use crate::poster;
use crate::scrape::FlyerSource;

/// How often the scheduler re-evaluates the posting window. Also the width
/// of the window itself, so a tick can never skip past it.
pub const POLL_INTERVAL: Duration = Duration::from_secs(WINDOW_MINUTES as u64 * 60);

const WINDOW_MINUTES: u32 = 15;

/// Weekly posting slot: weekday (0 = Monday), hour and start minute, all in
/// the configured timezone. Range validation happens in `config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl Schedule {
    /// Whether `now` falls inside this schedule's posting window.
    ///
    /// The comparison is purely numeric: a window starting after minute 44
    /// is truncated at minute 59 rather than wrapping into the next hour.
    /// That matches the deployed behavior and is intentional.
    pub fn window_matches(&self, now: DateTime<Tz>) -> bool {
        now.weekday().num_days_from_monday() == self.day
            && now.hour() == self.hour
            && (self.minute..self.minute + WINDOW_MINUTES).contains(&now.minute())
    }
}

/// Trigger state for the weekly job: at most one firing per calendar date.
#[derive(Debug, Clone)]
pub struct Scheduler {
    schedule: Schedule,
    last_run_date: Option<NaiveDate>,
}

impl Scheduler {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            last_run_date: None,
        }
    }

    /// Evaluate one tick. Returns true when the caller should run the job
    /// now; the caller reports back via [`Scheduler::mark_fired`] once the
    /// job invocation has returned.
    ///
    /// Outside the window this also retires a stale `last_run_date`, so a
    /// date can fire again the next time its window comes around.
    pub fn should_fire(&mut self, now: DateTime<Tz>) -> bool {
        if self.schedule.window_matches(now) {
            if self.last_run_date != Some(now.date_naive()) {
                return true;
            }
        } else if self
            .last_run_date
            .is_some_and(|last| now.date_naive() > last)
        {
            self.last_run_date = None;
        }
        false
    }

    /// Record that the job was invoked on `date`.
    pub fn mark_fired(&mut self, date: NaiveDate) {
        self.last_run_date = Some(date);
    }

    pub fn last_run_date(&self) -> Option<NaiveDate> {
        self.last_run_date
    }
}

/// Scheduler loop: evaluates the window every [`POLL_INTERVAL`] and runs the
/// posting job under the shared job lock when it fires. Never returns.
pub async fn run(
    discord: Arc<dyn DiscordService>,
    source: Arc<dyn FlyerSource>,
    cfg: Arc<Config>,
    job_lock: Arc<Mutex<()>>,
) {
    let mut scheduler = Scheduler::new(cfg.schedule);
    let mut ticks = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticks.tick().await;
        let now = Utc::now().with_timezone(&cfg.timezone);
        if scheduler.should_fire(now) {
            info!(
                hour = cfg.schedule.hour,
                minute = cfg.schedule.minute,
                timezone = %cfg.timezone,
                "posting window reached; starting flyer posting job"
            );
            let _running = job_lock.lock().await;
            if let Err(err) =
                poster::post_flyers(discord.as_ref(), source.as_ref(), &cfg, now).await
            {
                error!(?err, "flyer posting run failed");
            }
            scheduler.mark_fired(now.date_naive());
        }
    }
}
