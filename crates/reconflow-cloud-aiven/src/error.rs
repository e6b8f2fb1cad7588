//! Aiven client error types

use reconflow_cloud::{CloudError, ErrorClass, Operation, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AivenError {
    #[error("API token not set: environment variable {0} is empty")]
    MissingToken(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl AivenError {
    /// Classification used by the reconciliation engine
    pub fn class(&self) -> ErrorClass {
        match self {
            AivenError::Api { status, .. } => match status {
                404 => ErrorClass::NotFound,
                409 => ErrorClass::Conflict,
                408 | 429 | 500..=599 => ErrorClass::Transient,
                _ => ErrorClass::Fatal,
            },
            AivenError::Http(err) if err.is_timeout() || err.is_connect() => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn into_cloud(
        self,
        kind: ResourceKind,
        identity: impl Into<String>,
        operation: Operation,
    ) -> CloudError {
        let identity = identity.into();
        match self.class() {
            ErrorClass::NotFound => CloudError::NotFound { kind, identity },
            ErrorClass::Conflict => CloudError::Conflict {
                kind,
                identity,
                message: self.to_string(),
            },
            ErrorClass::Transient => CloudError::Transient {
                kind,
                identity,
                operation,
                message: self.to_string(),
            },
            ErrorClass::Fatal => CloudError::Fatal {
                kind,
                identity,
                operation,
                message: self.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, AivenError>;
