//! Plans and results of reconciliation steps

use crate::identity::Identity;
use crate::kind::{FieldGroup, FieldRole, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One differing attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Dotted attribute path (e.g. `kafka_user_config.kafka_rest`)
    pub path: String,

    /// Desired value; `null` resets the field
    pub desired: Value,

    /// Last observed value
    pub observed: Value,
}

impl FieldChange {
    pub fn new(path: impl Into<String>, desired: Value, observed: Value) -> Self {
        Self {
            path: path.into(),
            desired,
            observed,
        }
    }
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.path, self.observed, self.desired)
    }
}

/// A single remote mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanStep {
    Create,
    Update {
        group: FieldGroup,
        changes: Vec<FieldChange>,
    },
    Delete,
}

impl std::fmt::Display for PlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStep::Create => write!(f, "create"),
            PlanStep::Update { group, changes } => {
                write!(f, "update {group} ({} field(s))", changes.len())
            }
            PlanStep::Delete => write!(f, "delete"),
        }
    }
}

/// Ordered steps that move a remote object to its desired state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPlan {
    pub kind: ResourceKind,

    /// Target object; `None` until a server-assigned identity is learned
    pub identity: Option<Identity>,

    pub steps: Vec<PlanStep>,

    /// Immutable fields whose change forces delete-then-create
    pub replacement: Vec<String>,
}

impl OperationPlan {
    pub fn empty(kind: ResourceKind, identity: Option<Identity>) -> Self {
        Self {
            kind,
            identity,
            steps: Vec::new(),
            replacement: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn requires_replacement(&self) -> bool {
        !self.replacement.is_empty()
    }

    /// Whether the plan moves the object to a different parent
    pub fn association_change(&self) -> Option<&FieldChange> {
        let behavior = self.kind.behavior();
        self.changes().find(|change| {
            behavior
                .rule_for(&change.path)
                .is_some_and(|rule| rule.role == FieldRole::Association)
        })
    }

    /// All field changes across update steps
    pub fn changes(&self) -> impl Iterator<Item = &FieldChange> {
        self.steps.iter().flat_map(|step| match step {
            PlanStep::Update { changes, .. } => changes.as_slice(),
            _ => &[][..],
        })
    }

    pub fn summary(&self) -> PlanSummary {
        let count = |f: fn(&PlanStep) -> bool| self.steps.iter().filter(|s| f(s)).count();
        PlanSummary {
            create: count(|s| matches!(s, PlanStep::Create)),
            update: count(|s| matches!(s, PlanStep::Update { .. })),
            delete: count(|s| matches!(s, PlanStep::Delete)),
            fields: self.changes().count(),
        }
    }
}

/// Summary of planned steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub fields: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update ({} field(s)), {} to delete",
            self.create, self.update, self.fields, self.delete
        )
    }
}

/// Outcome of a batch of independent operations (e.g. a sweep)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions
    pub failed: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionResult {
            action_id,
            success: true,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, action_id: String, error: String) {
        self.failed.push(ActionResult {
            action_id,
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }

    pub fn merge(&mut self, other: ApplyResult) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.duration_ms += other.duration_ms;
    }
}

impl Default for ApplyResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Object the action targeted (kind and identity)
    pub action_id: String,

    /// Whether the action succeeded
    pub success: bool,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}
