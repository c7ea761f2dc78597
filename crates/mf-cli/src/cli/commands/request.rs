//! Request submission and lifecycle commands.

use console::style;
use mf_core::models::{ProcessingItem, RequestKind, RequestRow, RequestStatus};

use crate::cli::helpers::{load_composition, truncate};
use crate::cli::progress::request_progress_bar;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_submit(
    kind: &str,
    tmdb_id: i64,
    title: &str,
    year: Option<i32>,
    season: Option<i32>,
    episodes: Vec<i32>,
    targets: Vec<String>,
    template_id: &str,
) -> anyhow::Result<()> {
    let kind = RequestKind::from_str(kind).ok_or_else(|| anyhow::anyhow!("kind must be 'movie' or 'tv'"))?;
    let composition = load_composition().await?;
    let store = &composition.state.store;

    let request_id = uuid::Uuid::new_v4().to_string();
    let mut request = RequestRow::new(request_id.clone(), kind, tmdb_id, title.to_string(), year, targets);

    match kind {
        RequestKind::Movie => {
            let item = ProcessingItem::new_movie(uuid::Uuid::new_v4().to_string(), request_id.clone(), tmdb_id, title.to_string());
            store.processing_items.insert(&item).await?;
        }
        RequestKind::Tv => {
            let season = season.ok_or_else(|| anyhow::anyhow!("--season is required for tv requests"))?;
            if episodes.is_empty() {
                anyhow::bail!("--episodes is required for tv requests");
            }
            request.requested_seasons = Some(vec![season]);
            request.requested_episodes = Some(episodes.clone());
            for episode in &episodes {
                let item = ProcessingItem::new_episode(
                    uuid::Uuid::new_v4().to_string(),
                    request_id.clone(),
                    tmdb_id,
                    title.to_string(),
                    season,
                    *episode,
                );
                store.processing_items.insert(&item).await?;
            }
        }
    }

    store.requests.insert(&request).await?;
    composition.state.engine.start_execution(&request_id, template_id).await?;
    mf_server::sync::sync_request(store, &request_id).await?;

    println!("{} Submitted request {}", style("✓").green(), style(&request_id).cyan());
    Ok(())
}

pub async fn cmd_list(status: Option<&str>) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let mut requests = composition.state.store.requests.list().await?;
    if let Some(status) = status.and_then(RequestStatus::from_str) {
        requests.retain(|r| r.status == status);
    }

    if requests.is_empty() {
        println!("{} No requests found", style("!").yellow());
        return Ok(());
    }

    println!("{:<38} {:<20} {:<12} {:<6} Title", "ID", "Status", "Progress", "Year");
    println!("{}", "-".repeat(90));
    for request in requests {
        println!(
            "{:<38} {:<20} {:<12} {:<6} {}",
            request.id,
            request.status.as_str(),
            format!("{:.0}%", request.progress),
            request.year.map(|y| y.to_string()).unwrap_or_default(),
            truncate(&request.title, 40),
        );
    }
    Ok(())
}

pub async fn cmd_get(id: &str) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let request = composition
        .state
        .store
        .requests
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("request not found: {id}"))?;
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

/// Polls `requests.get` until the request reaches a terminal status,
/// rendering its progress on an `indicatif` bar rather than spamming the
/// terminal with one line per poll.
pub async fn cmd_watch(id: &str, interval_secs: u64) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let bar = request_progress_bar();

    loop {
        mf_server::sync::sync_request(&composition.state.store, id).await?;
        let request = composition
            .state
            .store
            .requests
            .get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("request not found: {id}"))?;

        bar.set_position(request.progress.round() as u64);
        bar.set_message(request.status.as_str().to_string());

        if request.status.is_terminal() {
            bar.finish_with_message(request.status.as_str().to_string());
            if let Some(error) = request.error {
                println!("{} {}", style("✗").red(), error);
            }
            break;
        }

        tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;
    }
    Ok(())
}

pub async fn cmd_cancel(id: &str) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let store = &composition.state.store;

    store.requests.get(id).await?.ok_or_else(|| anyhow::anyhow!("request not found: {id}"))?;

    for execution in store.executions.list_by_request(id).await? {
        composition.state.engine.cancel_execution(&execution.id).await?;
        for child in store.executions.list_children(&execution.id).await? {
            composition.state.engine.cancel_execution(&child.id).await?;
        }
    }
    for mut item in store.processing_items.list_by_request(id).await? {
        if !matches!(item.status, mf_core::models::ProcessingItemStatus::Completed) {
            item.status = mf_core::models::ProcessingItemStatus::Cancelled;
            item.updated_at = chrono::Utc::now();
            store.processing_items.save(&item).await?;
        }
    }

    let items = store.processing_items.list_by_request(id).await?;
    let statuses: Vec<_> = items.iter().map(|i| i.status).collect();
    let (status, progress) = mf_core::models::derive_request_status(&statuses);
    store.requests.update_derived_status(id, status, progress).await?;

    println!("{} Cancelled request {}", style("✓").green(), id);
    Ok(())
}

pub async fn cmd_retry(id: &str) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let store = &composition.state.store;

    store.requests.get(id).await?.ok_or_else(|| anyhow::anyhow!("request not found: {id}"))?;

    let mut retried = 0;
    for mut item in store.processing_items.list_by_request(id).await? {
        if item.status == mf_core::models::ProcessingItemStatus::Failed {
            item.status = mf_core::models::ProcessingItemStatus::Pending;
            item.last_error = None;
            item.updated_at = chrono::Utc::now();
            store.processing_items.save(&item).await?;
            retried += 1;
        }
    }
    for execution in store.executions.list_by_request(id).await? {
        if execution.status == mf_core::models::ExecutionStatus::Failed {
            composition.state.engine.walk(&execution.id).await?;
        }
    }

    let items = store.processing_items.list_by_request(id).await?;
    let statuses: Vec<_> = items.iter().map(|i| i.status).collect();
    let (status, progress) = mf_core::models::derive_request_status(&statuses);
    store.requests.update_derived_status(id, status, progress).await?;

    println!("{} Retried {} item(s) on request {}", style("✓").green(), retried, id);
    Ok(())
}
