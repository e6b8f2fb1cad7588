use crate::context::{self, Context};
use reconflow_cloud::ResourceLifecycle;

pub async fn handle(ctx: &Context, kind: &str, id: &str) -> anyhow::Result<()> {
    let identity = context::parse_identity(kind, id)?;
    let mut orchestrator = ctx.run.orchestrator(identity.kind());
    let spec = orchestrator.import(&identity).await?;

    tracing::info!(kind = %identity.kind(), identity = %identity, "Imported");
    print!("{}", serde_yaml::to_string(&vec![spec])?);
    Ok(())
}
