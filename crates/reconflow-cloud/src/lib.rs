//! Reconflow resource reconciliation
//!
//! This crate reconciles declared cloud resources (accounts, teams,
//! projects, Kafka services, topics, service users) with a remote control
//! plane that provisions asynchronously and answers eventually consistently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   recon CLI                      │
//! │          (apply / read / import / sweep)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │ ResourceSpec
//! ┌─────────────────▼───────────────────────────────┐
//! │               reconflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Lifecycle Orchestrator           │   │
//! │  │  trait ResourceLifecycle { ... }          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌─────────────┐ ┌─────────────┐ ┌───────────┐  │
//! │  │ Diff/Apply  │ │   Poller    │ │ Hierarchy │  │
//! │  └─────────────┘ └─────────────┘ └───────────┘  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait RemoteClient  (+ RetryingClient)   │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   aiven REST  │ │   in-memory   │
//! │    adapter    │ │ control plane │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod attributes;
pub mod client;
pub mod diff;
pub mod error;
pub mod field;
pub mod hierarchy;
pub mod identity;
pub mod kind;
pub mod lifecycle;
pub mod memory;
pub mod orchestrator;
pub mod poller;
pub mod spec;
pub mod state;
pub mod sweep;

// Re-exports
pub use action::{ActionResult, ApplyResult, FieldChange, OperationPlan, PlanStep, PlanSummary};
pub use attributes::AttributeMap;
pub use client::{FieldGroupUpdate, ListFilter, RemoteClient, RetryConfig, RetryingClient};
pub use error::{CloudError, ErrorClass, Operation, Result};
pub use field::Field;
pub use hierarchy::{AssociationGraph, HierarchyValidator};
pub use identity::Identity;
pub use kind::{FieldGroup, KindBehavior, ResourceKind};
pub use lifecycle::Lifecycle;
pub use memory::MemoryCloud;
pub use orchestrator::{Orchestrator, ResourceLifecycle, RunContext};
pub use poller::{CancelHandle, CancelToken, PollConfig, Scheduler, StatePoller, TokioScheduler};
pub use spec::ResourceSpec;
pub use state::{RemoteState, RemoteStatus};
pub use sweep::{sweep, sweep_all};
