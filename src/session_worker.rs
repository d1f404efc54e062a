// Background sweep of expired session rows.
// Runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::MissedTickBehavior;

use crate::config::SessionConfig;
use crate::session_repo::SessionStore;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Optional cron expression (e.g. "0 0 * * * *" = top of every hour). Uses local time.
    pub schedule: Option<String>,
    /// Sweep every N seconds when schedule is not set.
    pub interval_secs: u64,
}

impl From<&SessionConfig> for SweepConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            schedule: config.sweep_schedule.clone(),
            interval_secs: config.sweep_interval_secs,
        }
    }
}

/// Spawns the sweeper. Returns a join handle.
pub fn spawn(store: Arc<dyn SessionStore>, config: SweepConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(store, config).await;
    })
}

#[instrument(skip(store), fields(interval_secs = config.interval_secs))]
async fn run(store: Arc<dyn SessionStore>, config: SweepConfig) {
    let Some(expr) = config.schedule.as_deref() else {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(store.as_ref()).await;
        }
    };

    let Ok(schedule) = cron::Schedule::from_str(expr) else {
        warn!(cron = %expr, "invalid sweep_schedule; expired sessions will not be purged");
        return;
    };
    while let Some(delay) = until_next(&schedule, chrono::Local::now()) {
        tokio::time::sleep(delay).await;
        sweep_once(store.as_ref()).await;
    }
    warn!(cron = %expr, "sweep_schedule has no upcoming run; sweeper stopped");
}

/// Time from `now` to the schedule's next fire time (local time).
fn until_next(schedule: &cron::Schedule, now: DateTime<Local>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    Some((next - now).to_std().unwrap_or(Duration::from_secs(1)))
}

/// One purge pass; failures are logged and the next tick tries again.
pub async fn sweep_once(store: &dyn SessionStore) -> Option<u64> {
    match store.purge_expired().await {
        Ok(removed) => {
            if removed > 0 {
                info!(removed, "expired sessions purged");
            }
            Some(removed)
        }
        Err(e) => {
            warn!(error = %e, "session sweep failed");
            None
        }
    }
}
