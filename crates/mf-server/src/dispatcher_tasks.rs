//! Wraps the encoder dispatcher's timer-driven sweeps
//! (acceptance-window/stall/heartbeat) as [`mf_recovery::RecurringTask`]s
//! so they share `mf-recovery`'s `TaskScheduler` driver with the crash
//! recovery sweeps instead of each hand-rolling their own
//! `tokio::time::interval` loop (spec.md §2 C7 "Scheduler: registry of
//! periodic tasks").

use std::sync::Arc;

use async_trait::async_trait;
use mf_dispatcher::scheduler::Dispatcher;
use mf_recovery::RecurringTask;

pub struct DispatchLoop(pub Arc<Dispatcher>);
pub struct AcceptanceWindowSweep(pub Arc<Dispatcher>);
pub struct StallSweep(pub Arc<Dispatcher>);
pub struct HeartbeatSweep(pub Arc<Dispatcher>);

/// Assigns any `PENDING` encoding job to a free worker. Runs far more
/// often than the sweeps below since it's the hot path for keeping
/// encoder capacity busy, not a crash-recovery backstop.
#[async_trait]
impl RecurringTask for DispatchLoop {
    fn name(&self) -> &str {
        "dispatcher.dispatch_until_idle"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.0.dispatch_until_idle().await?;
        Ok(())
    }
}

#[async_trait]
impl RecurringTask for AcceptanceWindowSweep {
    fn name(&self) -> &str {
        "dispatcher.sweep_acceptance_window"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.0.sweep_acceptance_window().await?;
        Ok(())
    }
}

#[async_trait]
impl RecurringTask for StallSweep {
    fn name(&self) -> &str {
        "dispatcher.sweep_stalls"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.0.sweep_stalls().await?;
        Ok(())
    }
}

#[async_trait]
impl RecurringTask for HeartbeatSweep {
    fn name(&self) -> &str {
        "dispatcher.sweep_heartbeats"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.0.sweep_heartbeats().await?;
        Ok(())
    }
}
