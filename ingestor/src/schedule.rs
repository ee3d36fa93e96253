use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub interval: Duration,
    /// No cycle starts after this much time has passed since the schedule began.
    pub max_run: Duration,
    pub max_cycles: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: u64,
    pub failed: u64,
    /// Ticks that came due while a cycle was still running.
    pub skipped_ticks: u64,
}

impl RunReport {
    pub const fn cycles(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Runs `cycle` right away and then on every tick of `schedule.interval`,
/// until the run duration or cycle budget is used up or `cancel` fires.
///
/// Cycles are awaited one at a time and never interrupted. A tick that comes
/// due while a cycle is still running is dropped, not queued. Failures are
/// logged and do not stop the schedule.
pub async fn run_schedule<F, Fut, T, E>(
    schedule: Schedule,
    cancel: CancellationToken,
    mut cycle: F,
) -> RunReport
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let started_at = Instant::now();
    let deadline = started_at + schedule.max_run;

    let mut ticks = tokio::time::interval(schedule.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut report = RunReport::default();
    let mut last_cycle_finished_at = started_at;

    loop {
        if schedule.max_cycles.is_some_and(|max| report.cycles() >= max) {
            tracing::info!("cycle budget used up");
            break;
        }

        let due_at = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("schedule cancelled");
                break;
            }
            () = tokio::time::sleep_until(deadline) => {
                tracing::info!("maximum run duration elapsed");
                break;
            }
            due_at = ticks.tick() => due_at,
        };

        if due_at < last_cycle_finished_at {
            tracing::warn!(
                late_by = ?last_cycle_finished_at - due_at,
                "previous cycle overran its interval, skipping tick"
            );
            report.skipped_ticks += 1;
            continue;
        }

        match cycle().await {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                tracing::error!("refresh cycle failed: {e}");
                report.failed += 1;
            }
        }
        last_cycle_finished_at = Instant::now();
    }

    report
}
