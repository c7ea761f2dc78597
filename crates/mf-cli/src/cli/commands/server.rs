//! Boots the HTTP/RPC surface in-process, the same composition root the
//! `mediaforge-server` binary uses, so `mediaforge serve` is a
//! convenience wrapper rather than a second implementation.

use console::style;

use crate::cli::helpers::load_composition;

pub async fn cmd_serve() -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let settings = composition.settings.clone();

    composition.state.dispatcher.recover_on_startup().await?;

    let mut scheduler = mf_recovery::TaskScheduler::new();
    mf_recovery::scheduler::register_recovery_sweeps(
        &mut scheduler,
        composition.state.recovery.clone(),
        std::time::Duration::from_secs(settings.recovery_poll_interval_secs),
    );
    scheduler.register(
        std::sync::Arc::new(mf_server::dispatcher_tasks::DispatchLoop(composition.state.dispatcher.clone())),
        std::time::Duration::from_secs(2),
    );
    scheduler.register(
        std::sync::Arc::new(mf_server::dispatcher_tasks::AcceptanceWindowSweep(composition.state.dispatcher.clone())),
        std::time::Duration::from_secs(settings.assigned_timeout_secs.max(10)),
    );
    scheduler.register(
        std::sync::Arc::new(mf_server::dispatcher_tasks::StallSweep(composition.state.dispatcher.clone())),
        std::time::Duration::from_secs(settings.stall_timeout_secs.max(10)),
    );
    scheduler.register(
        std::sync::Arc::new(mf_server::dispatcher_tasks::HeartbeatSweep(composition.state.dispatcher.clone())),
        std::time::Duration::from_secs(30),
    );
    let _background = scheduler.spawn_all();

    let app = mf_server::routes::create_router(composition.state, &settings.encoder_ws_path);
    println!("{} Listening on http://{}:{}", style("→").cyan(), settings.server_host, settings.server_port);
    mf_server::serve(app, &settings.server_host, settings.server_port).await
}
