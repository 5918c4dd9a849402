//! Daily trigger for the review request sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use yay_reviews_core::Clock;

use crate::config::SweepConfig;
use crate::db::{CredentialStore, EmailQueueStore};
use crate::shopify::StoreApiFactory;

use super::email::MailTransport;
use super::sweep::Sweeper;

/// A fixed UTC time of day, like the cron expression `M H * * *`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    /// Schedule at `hour:minute` UTC; `None` if out of range.
    #[must_use]
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|at| Self { at })
    }

    /// Schedule configured by `SWEEP_HOUR`/`SWEEP_MINUTE`.
    #[must_use]
    pub fn from_config(config: &SweepConfig) -> Option<Self> {
        Self::new(config.hour, config.minute)
    }

    /// First trigger strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.at).and_utc();
        if today > now {
            today
        } else {
            today + TimeDelta::days(1)
        }
    }
}

impl Default for DailySchedule {
    /// 01:00 UTC.
    fn default() -> Self {
        Self {
            at: NaiveTime::MIN + TimeDelta::hours(1),
        }
    }
}

/// Run `sweeper` every day at `schedule` until `shutdown` flips or closes.
pub fn spawn_daily_sweep<Q, C, F, M>(
    sweeper: Arc<Sweeper<Q, C, F, M>>,
    schedule: DailySchedule,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    Q: EmailQueueStore + 'static,
    C: CredentialStore + 'static,
    F: StoreApiFactory + 'static,
    M: MailTransport + 'static,
{
    tokio::spawn(async move {
        loop {
            let now = clock.now();
            let next = schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, "Next review request sweep scheduled");

            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("Review request scheduler stopping");
                    break;
                }
            }

            match sweeper.run_once().await {
                Ok(report) => info!(
                    due = report.due,
                    sent = report.sent,
                    failed = report.failed,
                    "Scheduled sweep complete"
                ),
                Err(e) => error!(error = %e, "Scheduled sweep could not list due items"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use yay_reviews_core::SystemClock;

    use super::*;
    use crate::db::memory::{MemoryCredentials, MemoryEmailQueue};
    use crate::services::email::RecordingMailer;
    use crate::shopify::stub::StubShopify;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_before_trigger_runs_today() {
        let schedule = DailySchedule::default();
        assert_eq!(
            schedule.next_after(at("2025-07-09T00:59:59Z")),
            at("2025-07-09T01:00:00Z")
        );
    }

    #[test]
    fn test_at_or_after_trigger_runs_tomorrow() {
        let schedule = DailySchedule::default();
        assert_eq!(
            schedule.next_after(at("2025-07-09T01:00:00Z")),
            at("2025-07-10T01:00:00Z")
        );
        assert_eq!(
            schedule.next_after(at("2025-12-31T13:30:00Z")),
            at("2026-01-01T01:00:00Z")
        );
    }

    #[test]
    fn test_custom_time_and_range() {
        let schedule = DailySchedule::new(23, 45).unwrap();
        assert_eq!(
            schedule.next_after(at("2025-07-09T12:00:00Z")),
            at("2025-07-09T23:45:00Z")
        );
        assert!(DailySchedule::new(24, 0).is_none());
        assert!(DailySchedule::new(1, 60).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_scheduler() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = SweepConfig {
            enabled: true,
            hour: 1,
            minute: 0,
            item_timeout: Duration::from_secs(60),
            lease: Duration::from_secs(900),
        };
        let sweeper = Arc::new(Sweeper::new(
            MemoryEmailQueue::new(),
            MemoryCredentials::new(),
            StubShopify::new(),
            RecordingMailer::new(),
            Arc::clone(&clock),
            &config,
        ));
        let (tx, rx) = watch::channel(false);

        let handle = spawn_daily_sweep(sweeper, DailySchedule::default(), clock, rx);
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
