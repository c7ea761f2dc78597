//! Execution inspection commands.

use console::style;

use crate::cli::helpers::load_composition;

pub async fn cmd_list(request_id: &str) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let executions = composition.state.store.executions.list_by_request(request_id).await?;

    if executions.is_empty() {
        println!("{} No executions found for request {}", style("!").yellow(), request_id);
        return Ok(());
    }

    println!("{:<38} {:<12} {:<10} Template", "ID", "Status", "Branch");
    println!("{}", "-".repeat(80));
    for execution in executions {
        let branch = if execution.parent_execution_id.is_some() { "branch" } else { "root" };
        println!(
            "{:<38} {:<12} {:<10} {}",
            execution.id,
            execution.status.as_str(),
            branch,
            execution.template_id,
        );
    }
    Ok(())
}

pub async fn cmd_get(id: &str) -> anyhow::Result<()> {
    let composition = load_composition().await?;
    let execution = composition
        .state
        .store
        .executions
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("execution not found: {id}"))?;
    let steps = composition.state.store.executions.list_steps(id).await?;

    println!("{}", serde_json::to_string_pretty(&execution)?);
    if !steps.is_empty() {
        println!("\n{:<6} {:<24} {:<10} Error", "Order", "Step Kind", "Status");
        println!("{}", "-".repeat(70));
        for step in steps {
            println!(
                "{:<6} {:<24} {:<10} {}",
                step.step_order,
                step.step_type,
                step.status.as_str(),
                step.error.as_deref().unwrap_or(""),
            );
        }
    }
    Ok(())
}
