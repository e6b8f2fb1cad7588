//! Cleanup of leftover objects by name prefix

use crate::action::ApplyResult;
use crate::client::ListFilter;
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::orchestrator::{ResourceLifecycle, RunContext};
use std::time::Instant;

/// Delete every object of `kind` whose name contains `prefix`
///
/// Objects that disappear underneath the sweep count as deleted; other
/// failures are recorded and the sweep moves on.
pub async fn sweep(run: &RunContext, kind: ResourceKind, prefix: &str) -> Result<ApplyResult> {
    let start = Instant::now();
    let mut result = ApplyResult::new();

    let filter = ListFilter::default().containing(prefix);
    let found = run.client().list(kind, &filter).await?;
    tracing::debug!(kind = %kind, prefix, count = found.len(), "Sweeping");

    for state in found {
        let action_id = format!("{kind} {}", state.identity);
        let mut orchestrator = run.adopt(state);
        match orchestrator.delete().await {
            Ok(()) => result.add_success(action_id, "deleted".to_string()),
            Err(err) if err.is_not_found() => {
                result.add_success(action_id, "already deleted".to_string())
            }
            Err(err) => {
                tracing::warn!(kind = %kind, "Failed to sweep {}: {}", action_id, err);
                result.add_failure(action_id, err.to_string());
            }
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}

/// Sweep every kind, children before parents
pub async fn sweep_all(run: &RunContext, prefix: &str) -> ApplyResult {
    let mut result = ApplyResult::new();
    for kind in ResourceKind::deletion_order() {
        match sweep(run, kind, prefix).await {
            Ok(swept) => result.merge(swept),
            Err(err) => {
                tracing::warn!(kind = %kind, "Failed to list for sweep: {}", err);
                result.add_failure(format!("list {kind}"), err.to_string());
            }
        }
    }
    result
}
