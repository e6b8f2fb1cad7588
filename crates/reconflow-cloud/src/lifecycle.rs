//! Local lifecycle of a managed object

use crate::error::{CloudError, Operation, Result};
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};

/// Lifecycle state tracked by an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Absent,
    Creating,
    Provisioning,
    Ready,
    Updating,
    Deleting,
    Failed,
}

impl Lifecycle {
    pub fn can_transition_to(self, next: Lifecycle) -> bool {
        use Lifecycle::*;

        // observing NotFound is legal from anywhere
        if next == Absent {
            return true;
        }
        matches!(
            (self, next),
            // import and adopt enter directly
            (Absent, Creating | Provisioning | Ready)
                | (Creating, Provisioning | Failed)
                // abandoning a build in flight
                | (Provisioning, Ready | Failed | Deleting)
                | (Ready, Updating | Deleting | Ready)
                // abandoning an update in flight
                | (Updating, Ready | Failed | Deleting)
                | (Deleting, Failed)
                | (Failed, Ready | Deleting | Provisioning)
        )
    }

    /// Checked transition; illegal moves are rejected as `Fatal`
    pub fn transition(
        self,
        next: Lifecycle,
        kind: ResourceKind,
        identity: &str,
        operation: Operation,
    ) -> Result<Lifecycle> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CloudError::fatal(
                kind,
                identity,
                operation,
                format!("illegal lifecycle transition {self} -> {next}"),
            ))
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Absent => write!(f, "absent"),
            Lifecycle::Creating => write!(f, "creating"),
            Lifecycle::Provisioning => write!(f, "provisioning"),
            Lifecycle::Ready => write!(f, "ready"),
            Lifecycle::Updating => write!(f, "updating"),
            Lifecycle::Deleting => write!(f, "deleting"),
            Lifecycle::Failed => write!(f, "failed"),
        }
    }
}
