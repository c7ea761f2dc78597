//! `mediaforge-server` - the HTTP/RPC surface, encoder WebSocket
//! endpoint, and background sweep schedulers for the media acquisition
//! and delivery orchestrator.

use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mf_recovery::scheduler::register_recovery_sweeps;
use mf_recovery::TaskScheduler;
use mf_server::dispatcher_tasks::{AcceptanceWindowSweep, DispatchLoop, HeartbeatSweep, StallSweep};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "mf_server=info,mf_engine=info,mf_dispatcher=info,mf_recovery=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = mf_core::config::Config::load().await;
    let settings = config.resolve()?;

    let composition = mf_server::build(settings).await?;
    let mf_server::Composition { state, settings } = composition;

    state.dispatcher.recover_on_startup().await?;

    let mut scheduler = TaskScheduler::new();
    register_recovery_sweeps(
        &mut scheduler,
        state.recovery.clone(),
        Duration::from_secs(settings.recovery_poll_interval_secs),
    );
    scheduler.register(
        std::sync::Arc::new(DispatchLoop(state.dispatcher.clone())),
        Duration::from_secs(2),
    );
    scheduler.register(
        std::sync::Arc::new(AcceptanceWindowSweep(state.dispatcher.clone())),
        Duration::from_secs(settings.assigned_timeout_secs.max(10)),
    );
    scheduler.register(
        std::sync::Arc::new(StallSweep(state.dispatcher.clone())),
        Duration::from_secs(settings.stall_timeout_secs.max(10)),
    );
    scheduler.register(
        std::sync::Arc::new(HeartbeatSweep(state.dispatcher.clone())),
        Duration::from_secs(30),
    );
    let _background = scheduler.spawn_all();

    let app = mf_server::routes::create_router(state, &settings.encoder_ws_path);
    mf_server::serve(app, &settings.server_host, settings.server_port).await
}
