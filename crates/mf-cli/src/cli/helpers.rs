//! Shared setup for CLI commands.

use mf_core::config::Config;
use mf_server::Composition;

/// Load configuration and wire up the store/engine/dispatcher/recovery
/// singletons the same way `mediaforge-server` does, so CLI-initiated
/// mutations (submit, cancel, retry) go through the real engine rather
/// than poking rows directly.
pub async fn load_composition() -> anyhow::Result<Composition> {
    let config = Config::load().await;
    let settings = config.resolve()?;
    mf_server::build(settings).await
}

/// Truncate a string for fixed-width table columns, keeping it readable
/// rather than wrapping.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}
