use colored::Colorize;
use reconflow_cloud::{ApplyResult, AttributeMap, OperationPlan, PlanStep, RemoteState};

pub fn print_plan(label: &str, plan: &OperationPlan) {
    println!("{} {}", "▶".blue(), label.bold());
    if plan.is_empty() {
        println!("  {}", "up to date".dimmed());
        return;
    }
    for step in &plan.steps {
        println!("  {} {}", "•".cyan(), step);
        if let PlanStep::Update { changes, .. } = step {
            for change in changes {
                println!(
                    "      {}: {} → {}",
                    change.path,
                    change.observed.to_string().red(),
                    change.desired.to_string().green()
                );
            }
        }
    }
    if plan.requires_replacement() {
        println!(
            "  {} replacement required by: {}",
            "!".yellow().bold(),
            plan.replacement.join(", ").yellow()
        );
    }
    println!("  {}", plan.summary().to_string().dimmed());
}

pub fn print_state(state: &RemoteState) -> anyhow::Result<()> {
    let attributes = AttributeMap::from_state(state)?;
    println!(
        "{} {} {} ({})",
        "✓".green(),
        state.kind().to_string().cyan(),
        state.identity.to_string().bold(),
        state.status_label()
    );
    for (key, value) in attributes.iter() {
        println!("    {} = {}", key.dimmed(), value);
    }
    Ok(())
}

pub fn print_result(result: &ApplyResult) {
    for action in &result.succeeded {
        println!("  {} {}: {}", "✓".green(), action.action_id, action.message);
    }
    for action in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            action.action_id,
            action.error.as_deref().unwrap_or("failed").red()
        );
    }
    println!(
        "{}",
        format!(
            "{} succeeded, {} failed in {}ms",
            result.succeeded.len(),
            result.failed.len(),
            result.duration_ms
        )
        .dimmed()
    );
}
