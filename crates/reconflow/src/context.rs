use anyhow::Context as _;
use reconflow_cloud::{
    CancelHandle, CancelToken, Identity, ResourceKind, RetryingClient, RunContext,
};
use reconflow_cloud_aiven::{AivenClient, AivenConfig};
use reconflow_config::Settings;
use std::sync::Arc;

/// Everything a command needs to talk to the control plane
pub struct Context {
    pub run: RunContext,
    cancel: CancelToken,
}

impl Context {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let token = settings.token()?;
        let config = AivenConfig::new(token)
            .with_api_url(&settings.api_url)
            .with_timeout(settings.request_timeout());
        let client = AivenClient::new(config).context("failed to build the Aiven client")?;

        let (handle, cancel) = CancelHandle::new();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, canceling waits and retries");
                handle.cancel();
            }
        });

        let client = RetryingClient::new(Arc::new(client), settings.retry_config())
            .with_cancel(cancel.clone());

        let run = RunContext::new(Arc::new(client))
            .with_poll_config(settings.poll_config())
            .with_cancel(cancel.clone());
        Ok(Self { run, cancel })
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }
}

pub fn parse_kind(kind: &str) -> anyhow::Result<ResourceKind> {
    Ok(kind.parse::<ResourceKind>()?)
}

pub fn parse_identity(kind: &str, id: &str) -> anyhow::Result<Identity> {
    Ok(Identity::parse(parse_kind(kind)?, id)?)
}
