//! A small named-task registry driving both the C6 recovery sweeps and
//! any other maintenance job on its own interval, generalized from the
//! CLI's poll-on-an-interval loops (`foia-cli`'s `scrape status --live`,
//! `foia-scrape`'s configurable pollers) into a background task runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

/// One named unit of recurring work. `run_once` is called on its own
/// `tokio::time::interval` tick; a failed tick is logged and the loop
/// keeps ticking rather than tearing the task down.
#[async_trait]
pub trait RecurringTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run_once(&self) -> anyhow::Result<()>;
}

struct Registration {
    task: Arc<dyn RecurringTask>,
    interval: Duration,
}

/// Registers recurring tasks and spawns one polling loop per task.
#[derive(Default)]
pub struct TaskScheduler {
    registrations: Vec<Registration>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Arc<dyn RecurringTask>, interval: Duration) {
        self.registrations.push(Registration { task, interval });
    }

    /// Spawns every registered task onto its own background loop and
    /// returns the join handles, letting the caller (typically the
    /// server's `main`) hold them for graceful shutdown or just let them
    /// run for the life of the process.
    pub fn spawn_all(self) -> Vec<tokio::task::JoinHandle<()>> {
        self.registrations
            .into_iter()
            .map(|reg| {
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(reg.interval);
                    loop {
                        ticker.tick().await;
                        match reg.task.run_once().await {
                            Ok(()) => info!(task = reg.task.name(), "recurring task tick completed"),
                            Err(err) => error!(task = reg.task.name(), %err, "recurring task tick failed"),
                        }
                    }
                })
            })
            .collect()
    }
}

/// Wraps one `RecoveryWorkers` sweep as a named `RecurringTask` so the
/// scheduler can run each sweep on its own cadence instead of lumping
/// all five into a single tick.
pub struct SweepTask {
    name: &'static str,
    workers: Arc<crate::sweep::RecoveryWorkers>,
    kind: SweepKind,
}

#[derive(Clone, Copy)]
enum SweepKind {
    FoundWithoutDownloadId,
    StuckDownloading,
    MixedSeasonLinkage,
    StuckEncoding,
    StuckDelivery,
}

impl SweepTask {
    pub fn found_without_download_id(workers: Arc<crate::sweep::RecoveryWorkers>) -> Self {
        Self {
            name: "recovery.found_without_download_id",
            workers,
            kind: SweepKind::FoundWithoutDownloadId,
        }
    }

    pub fn stuck_downloading(workers: Arc<crate::sweep::RecoveryWorkers>) -> Self {
        Self {
            name: "recovery.stuck_downloading",
            workers,
            kind: SweepKind::StuckDownloading,
        }
    }

    pub fn mixed_season_linkage(workers: Arc<crate::sweep::RecoveryWorkers>) -> Self {
        Self {
            name: "recovery.mixed_season_linkage",
            workers,
            kind: SweepKind::MixedSeasonLinkage,
        }
    }

    pub fn stuck_encoding(workers: Arc<crate::sweep::RecoveryWorkers>) -> Self {
        Self {
            name: "recovery.stuck_encoding",
            workers,
            kind: SweepKind::StuckEncoding,
        }
    }

    pub fn stuck_delivery(workers: Arc<crate::sweep::RecoveryWorkers>) -> Self {
        Self {
            name: "recovery.stuck_delivery",
            workers,
            kind: SweepKind::StuckDelivery,
        }
    }
}

#[async_trait]
impl RecurringTask for SweepTask {
    fn name(&self) -> &str {
        self.name
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        let repaired = match self.kind {
            SweepKind::FoundWithoutDownloadId => self.workers.sweep_found_without_download_id().await?,
            SweepKind::StuckDownloading => self.workers.sweep_completed_downloads_stuck_downloading().await?,
            SweepKind::MixedSeasonLinkage => self.workers.sweep_mixed_season_linkage().await?,
            SweepKind::StuckEncoding => self.workers.sweep_stuck_encoding().await?,
            SweepKind::StuckDelivery => self.workers.sweep_stuck_delivery().await?,
        };
        if repaired > 0 {
            info!(task = self.name, repaired, "sweep repaired items");
        }
        Ok(())
    }
}

/// Registers all five C6 sweeps onto one scheduler at the given poll
/// interval, matching `Config::recovery_poll_interval_secs`.
pub fn register_recovery_sweeps(scheduler: &mut TaskScheduler, workers: Arc<crate::sweep::RecoveryWorkers>, interval: Duration) {
    scheduler.register(Arc::new(SweepTask::found_without_download_id(workers.clone())), interval);
    scheduler.register(Arc::new(SweepTask::stuck_downloading(workers.clone())), interval);
    scheduler.register(Arc::new(SweepTask::mixed_season_linkage(workers.clone())), interval);
    scheduler.register(Arc::new(SweepTask::stuck_encoding(workers.clone())), interval);
    scheduler.register(Arc::new(SweepTask::stuck_delivery(workers)), interval);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        ticks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RecurringTask for CountingTask {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run_once(&self) -> anyhow::Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_ticks_on_its_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TaskScheduler::new();
        scheduler.register(Arc::new(CountingTask { ticks: ticks.clone() }), Duration::from_millis(10));

        let handles = scheduler.spawn_all();
        tokio::time::advance(Duration::from_millis(35)).await;
        tokio::task::yield_now().await;

        assert!(ticks.load(Ordering::SeqCst) >= 2);
        for handle in handles {
            handle.abort();
        }
    }
}
