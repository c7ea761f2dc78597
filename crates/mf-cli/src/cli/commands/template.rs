//! Pipeline template management commands.

use console::style;
use mf_core::repository::Template;

use crate::cli::helpers::load_composition;

pub async fn cmd_list() -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let templates = composition.state.store.templates.list().await?;

    if templates.is_empty() {
        println!("{} No pipeline templates found", style("!").yellow());
        return Ok(());
    }

    println!("{:<24} {:<10} Name", "ID", "Kind");
    println!("{}", "-".repeat(60));
    for template in templates {
        println!("{:<24} {:<10} {}", template.id, template.media_kind, template.name);
    }
    Ok(())
}

/// Creates a pipeline template from a JSON file containing its step
/// tree, validating the tree deserializes into `mf_engine::Step` before
/// it's persisted (same check the HTTP surface applies).
pub async fn cmd_create(id: &str, name: &str, media_kind: &str, steps_file: &std::path::Path) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(steps_file).await?;
    let steps: serde_json::Value = serde_json::from_str(&contents)?;
    serde_json::from_value::<Vec<mf_engine::Step>>(steps.clone()).map_err(|e| anyhow::anyhow!("invalid step tree: {e}"))?;

    let now = chrono::Utc::now();
    let template = Template {
        id: id.to_string(),
        name: name.to_string(),
        media_kind: media_kind.to_string(),
        steps,
        created_at: now,
        updated_at: now,
    };

    let composition = load_composition().await?;
    composition.state.store.templates.upsert(&template).await?;
    println!("{} Created pipeline template {}", style("✓").green(), id);
    Ok(())
}

pub async fn cmd_delete(id: &str) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let deleted = composition.state.store.templates.delete(id).await?;
    if deleted {
        println!("{} Deleted pipeline template {}", style("✓").green(), id);
    } else {
        println!("{} Template not found: {}", style("✗").red(), id);
    }
    Ok(())
}
