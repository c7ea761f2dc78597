//! Encoder worker inspection commands.

use console::style;

use crate::cli::helpers::load_composition;

pub async fn cmd_list() -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let workers = composition.state.store.encoders.list_workers().await?;

    if workers.is_empty() {
        println!("{} No encoder workers registered", style("!").yellow());
        return Ok(());
    }

    println!("{:<24} {:<10} {:<10} Last Heartbeat", "ID", "Status", "Jobs");
    println!("{}", "-".repeat(70));
    for worker in workers {
        println!(
            "{:<24} {:<10} {:<10} {}",
            worker.id,
            worker.status.as_str(),
            format!("{}/{}", worker.current_jobs, worker.max_concurrent),
            worker.last_heartbeat_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

pub async fn cmd_get(id: &str) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let worker = composition
        .state
        .store
        .encoders
        .get_worker(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("worker not found: {id}"))?;
    println!("{}", serde_json::to_string_pretty(&worker)?);
    Ok(())
}
