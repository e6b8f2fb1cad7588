//! Reconciliation error types

use crate::kind::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// Remote operation an error was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
    Import,
    Validate,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::List => write!(f, "list"),
            Operation::Import => write!(f, "import"),
            Operation::Validate => write!(f, "validate"),
        }
    }
}

/// Coarse class every remote failure is sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The object is absent
    NotFound,
    /// Name or identity collision; not retryable without caller intervention
    Conflict,
    /// Rate limit, timeout or unavailable backend; retryable with backoff
    Transient,
    /// Validation/schema failure or any other non-retryable condition
    Fatal,
}

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{kind} {identity} not found")]
    NotFound { kind: ResourceKind, identity: String },

    #[error("{kind} {identity} conflicts with an existing object: {message}")]
    Conflict {
        kind: ResourceKind,
        identity: String,
        message: String,
    },

    #[error("{operation} {kind} {identity} failed transiently: {message}")]
    Transient {
        kind: ResourceKind,
        identity: String,
        operation: Operation,
        message: String,
    },

    #[error("{operation} {kind} {identity} rejected: {message}")]
    Fatal {
        kind: ResourceKind,
        identity: String,
        operation: Operation,
        message: String,
    },

    #[error("{kind} {identity} failed to provision (state {state}): {message}")]
    ProvisioningFailed {
        kind: ResourceKind,
        identity: String,
        state: String,
        message: String,
    },

    #[error("timed out after {elapsed:?} waiting for {kind} {identity} (last state: {last_state})")]
    Timeout {
        kind: ResourceKind,
        identity: String,
        elapsed: Duration,
        last_state: String,
    },

    #[error("wait for {kind} {identity} was canceled")]
    Canceled { kind: ResourceKind, identity: String },

    #[error("{kind} {identity} still has dependent objects: {}", children.join(", "))]
    DependencyExists {
        kind: ResourceKind,
        identity: String,
        children: Vec<String>,
    },

    #[error("{kind} {identity} must be replaced, immutable field(s) changed: {}", fields.join(", "))]
    RequiresReplacement {
        kind: ResourceKind,
        identity: String,
        fields: Vec<String>,
    },

    #[error("{kind} {identity}: {completed} of {total} steps applied before failure: {source}")]
    PartialApply {
        kind: ResourceKind,
        identity: String,
        completed: usize,
        total: usize,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn fatal(
        kind: ResourceKind,
        identity: impl Into<String>,
        operation: Operation,
        message: impl Into<String>,
    ) -> Self {
        CloudError::Fatal {
            kind,
            identity: identity.into(),
            operation,
            message: message.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, identity: impl Into<String>) -> Self {
        CloudError::NotFound {
            kind,
            identity: identity.into(),
        }
    }

    /// The underlying failure of a partially applied plan, or `self`
    pub fn root(&self) -> &CloudError {
        match self {
            CloudError::PartialApply { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.root() {
            CloudError::NotFound { .. } => ErrorClass::NotFound,
            CloudError::Conflict { .. } => ErrorClass::Conflict,
            CloudError::Transient { .. } => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
