use crate::context::{self, Context};
use colored::Colorize;
use reconflow_cloud::ResourceLifecycle;

pub async fn handle(ctx: &Context, kind: &str, id: &str) -> anyhow::Result<()> {
    let identity = context::parse_identity(kind, id)?;
    let mut orchestrator = ctx.run.orchestrator(identity.kind());

    match orchestrator.import(&identity).await {
        Ok(_) => {}
        Err(err) if err.is_not_found() => {
            println!("{}", format!("ℹ {kind} {identity} does not exist").dimmed());
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    println!("{}", format!("Deleting {kind} {identity}...").yellow());
    orchestrator.delete().await?;
    println!("{}", format!("✓ Deleted {kind} {identity}").green().bold());
    Ok(())
}
