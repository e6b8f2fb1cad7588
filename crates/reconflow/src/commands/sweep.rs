use crate::context::{self, Context};
use crate::output;
use colored::Colorize;

pub async fn handle(ctx: &Context, prefix: &str, kind: Option<&str>) -> anyhow::Result<()> {
    if prefix.trim().is_empty() {
        anyhow::bail!("refusing to sweep with an empty prefix");
    }
    println!("{}", format!("Sweeping resources matching '{prefix}'...").yellow());

    let result = match kind {
        Some(kind) => reconflow_cloud::sweep(&ctx.run, context::parse_kind(kind)?, prefix).await?,
        None => reconflow_cloud::sweep_all(&ctx.run, prefix).await,
    };
    output::print_result(&result);

    if !result.is_success() {
        anyhow::bail!("{} resource(s) could not be swept", result.failed.len());
    }
    Ok(())
}
