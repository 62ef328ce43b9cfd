//! Runs jobs on a daily cron schedule or a fixed interval.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::DailyTime;

/// A unit of scheduled work. What fires it is the scheduler's business.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    async fn run(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Once a day at the given wall-clock time in the scheduler's timezone.
    Daily(DailyTime),
    /// Every period, first fire one period after start.
    Every(Duration),
}

impl Trigger {
    /// 7-field cron expression (sec min hour day month dow year).
    pub fn cron_expression(&self) -> Option<String> {
        match self {
            Trigger::Daily(t) => Some(format!("0 {} {} * * * *", t.minute, t.hour)),
            Trigger::Every(_) => None,
        }
    }

    /// Next fire time strictly after `after`.
    pub fn next_fire(&self, after: DateTime<Tz>) -> Result<DateTime<Tz>, String> {
        match self {
            Trigger::Daily(_) => {
                let expr = self.cron_expression().unwrap_or_default();
                let schedule = Schedule::from_str(&expr).map_err(|e| format!("Invalid cron: {}", e))?;
                schedule
                    .after(&after)
                    .next()
                    .ok_or_else(|| "No future occurrence for cron".to_string())
            }
            Trigger::Every(period) => {
                let period = chrono::Duration::from_std(*period).map_err(|e| format!("Invalid period: {e}"))?;
                Ok(after + period)
            }
        }
    }
}

/// Wall-clock source for daily triggers.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Owns one tokio task per registered job.
pub struct Scheduler {
    timezone: Tz,
    clock: Clock,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(timezone: Tz) -> Self {
        Self::with_clock(timezone, Arc::new(Utc::now))
    }

    pub fn with_clock(timezone: Tz, clock: Clock) -> Self {
        Self {
            timezone,
            clock,
            handles: Vec::new(),
        }
    }

    /// Start running `job` whenever `trigger` fires. A job never overlaps
    /// with itself; a slow run delays the next one.
    pub fn spawn(&mut self, trigger: Trigger, job: Arc<dyn Job>) {
        info!("⏰ Scheduling {} ({:?})", job.name(), trigger);
        let timezone = self.timezone;
        let handle = match trigger {
            Trigger::Every(period) => tokio::spawn(run_every(period, job)),
            daily @ Trigger::Daily(_) => tokio::spawn(run_daily(daily, timezone, self.clock.clone(), job)),
        };
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

async fn run_every(period: Duration, job: Arc<dyn Job>) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        info!("⏰ Running {}", job.name());
        job.run().await;
    }
}

async fn run_daily(trigger: Trigger, timezone: Tz, clock: Clock, job: Arc<dyn Job>) {
    loop {
        let now = clock().with_timezone(&timezone);
        let next = match trigger.next_fire(now) {
            Ok(next) => next,
            Err(e) => {
                warn!("Stopping {}: {}", job.name(), e);
                return;
            }
        };
        info!("⏰ Next {} at {}", job.name(), next.format("%Y-%m-%d %H:%M %Z"));

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        info!("⏰ Running {}", job.name());
        job.run().await;
    }
}
