use crate::context::Context;
use crate::output;
use anyhow::Context as _;
use colored::Colorize;
use reconflow_cloud::{ResourceSpec, diff};
use std::path::Path;

pub async fn handle(ctx: &Context, manifest: &Path, replace: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("failed to read {}", manifest.display()))?;
    let specs = parse_manifest(&content)
        .with_context(|| format!("invalid manifest {}", manifest.display()))?;

    println!(
        "{}",
        format!("Applying {} resource(s) from {}", specs.len(), manifest.display()).blue()
    );

    for spec in &specs {
        spec.validate()?;
        let label = format!("{} {}", spec.kind(), spec.display_name());
        let mut orchestrator = ctx.run.orchestrator(spec.kind());

        let existing = orchestrator.lookup(spec).await?;
        let plan = diff::plan(spec, existing.as_ref())?;
        output::print_plan(&label, &plan);

        let applied = if plan.requires_replacement() {
            if !replace {
                anyhow::bail!(
                    "{label} cannot be changed in place ({}); rerun with --replace",
                    plan.replacement.join(", ")
                );
            }
            orchestrator.replace(spec).await
        } else {
            orchestrator.ensure(spec).await
        };
        let state = applied.with_context(|| format!("failed to apply {label}"))?;

        output::print_state(&state)?;
    }

    println!("{}", "✓ Apply complete".green().bold());
    Ok(())
}

/// A manifest is either a single resource or a list of them
pub fn parse_manifest(content: &str) -> anyhow::Result<Vec<ResourceSpec>> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    let specs = match value {
        serde_yaml::Value::Null => Vec::new(),
        serde_yaml::Value::Sequence(_) => serde_yaml::from_value(value)?,
        other => vec![serde_yaml::from_value(other)?],
    };
    Ok(specs)
}
