use crate::context::{self, Context};
use crate::output;
use reconflow_cloud::ResourceLifecycle;

pub async fn handle(ctx: &Context, kind: &str, id: &str) -> anyhow::Result<()> {
    let identity = context::parse_identity(kind, id)?;
    let mut orchestrator = ctx.run.orchestrator(identity.kind());
    orchestrator.import(&identity).await?;

    match orchestrator.state() {
        Some(state) => output::print_state(state),
        None => anyhow::bail!("{kind} {identity} does not exist"),
    }
}
