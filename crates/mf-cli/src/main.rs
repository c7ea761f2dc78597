//! mediaforge - media acquisition and delivery orchestrator.
//!
//! Drives the pipeline engine, encoder dispatcher, and recovery workers
//! directly against the state store, the way a single operator-facing
//! tool should without going through the HTTP surface for every call.

mod cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() { "mediaforge=info" } else { "mediaforge=warn" };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
