//! Aiven adapter for reconflow
//!
//! Implements [`reconflow_cloud::RemoteClient`] over the Aiven REST API so
//! the reconciliation engine can drive accounts, teams, projects, Kafka
//! services, topics and service users.
//!
//! # Requirements
//!
//! - An API token, read from `AIVEN_TOKEN` unless configured otherwise
//!
//! # Example
//!
//! ```ignore
//! use reconflow_cloud::{RetryConfig, RetryingClient, RunContext};
//! use reconflow_cloud_aiven::{AivenClient, AivenConfig};
//! use std::sync::Arc;
//!
//! let client = AivenClient::new(AivenConfig::from_env("AIVEN_TOKEN")?)?;
//! let client = RetryingClient::new(Arc::new(client), RetryConfig::default());
//! let run = RunContext::new(Arc::new(client));
//! ```

pub mod client;
pub mod error;
pub mod wire;

pub use client::{AivenClient, AivenConfig, DEFAULT_API_URL, DEFAULT_TOKEN_ENV};
pub use error::{AivenError, Result};
