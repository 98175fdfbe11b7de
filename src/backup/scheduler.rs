use super::job::execute_backup;
use crate::config::{AppConfig, Period};
use crate::notify::Notifier;
use chrono::{DateTime, Duration, Local};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::select;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub runs: usize,
    pub failures: usize,
}

/// Backs up immediately and then once per `interval` until `shutdown` becomes
/// non-zero. Runs never overlap; a run in progress is allowed to finish.
pub async fn run_scheduler(
    config: &AppConfig,
    notifier: &Notifier,
    interval: Period,
    shutdown: &AtomicUsize,
) -> SchedulerSummary {
    info!(
        "Starting backup scheduler, interval: {}, notifications: {}",
        interval,
        if notifier.is_enabled() { "on" } else { "off" }
    );
    let mut summary = SchedulerSummary::default();

    loop {
        if shutdown.load(Ordering::Relaxed) > 0 {
            info!("Scheduler shutdown requested");
            break;
        }

        let result = execute_backup(config, notifier).await;
        summary.runs += 1;
        if !result.success {
            summary.failures += 1;
            warn!(
                "Scheduled backup of '{}' failed: {}",
                result.database,
                result.error.unwrap_or_default()
            );
        }

        match next_run_after(Local::now(), interval) {
            Some(next_run) => {
                info!("Next backup at {}", next_run.format("%Y-%m-%d %H:%M:%S"))
            }
            None => info!("No next run within the representable calendar"),
        }

        select! {
            _ = sleep(interval.as_duration()) => {}
            _ = wait_for_shutdown(shutdown) => {
                info!("Scheduler shutdown requested during wait");
                break;
            }
        }
    }

    info!(
        "Scheduler stopped after {} run(s), {} failed",
        summary.runs, summary.failures
    );
    summary
}

/// `None` when the interval reaches past the last representable date.
fn next_run_after(now: DateTime<Local>, interval: Period) -> Option<DateTime<Local>> {
    let seconds = i64::try_from(interval.as_seconds()).ok()?;
    now.checked_add_signed(Duration::try_seconds(seconds)?)
}

async fn wait_for_shutdown(shutdown: &AtomicUsize) {
    while shutdown.load(Ordering::Relaxed) == 0 {
        sleep(std::time::Duration::from_millis(100)).await;
    }
}
