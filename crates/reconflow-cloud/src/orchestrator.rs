//! Lifecycle orchestrator
//!
//! One [`Orchestrator`] drives one managed object through create, read,
//! update, delete and import. Everything it needs for a run (client,
//! scheduler, poll tuning, cancellation) comes from a cloneable
//! [`RunContext`]; kind-specific rules come from the static behavior table.

use crate::client::{ListFilter, RemoteClient};
use crate::diff;
use crate::error::{CloudError, Operation, Result};
use crate::hierarchy::HierarchyValidator;
use crate::identity::Identity;
use crate::kind::{KindBehavior, ResourceKind};
use crate::lifecycle::Lifecycle;
use crate::poller::{CancelToken, PollConfig, Scheduler, StatePoller, TokioScheduler, WaitMode};
use crate::spec::ResourceSpec;
use crate::state::RemoteState;
use async_trait::async_trait;
use std::sync::Arc;

/// Per-run handle shared by every orchestrator of that run
#[derive(Clone)]
pub struct RunContext {
    client: Arc<dyn RemoteClient>,
    scheduler: Arc<dyn Scheduler>,
    poll: PollConfig,
    cancel: CancelToken,
}

impl RunContext {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self {
            client,
            scheduler: Arc::new(TokioScheduler::new()),
            poll: PollConfig::default(),
            cancel: CancelToken::never(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &Arc<dyn RemoteClient> {
        &self.client
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Orchestrator for a not yet known object of `kind`
    pub fn orchestrator(&self, kind: ResourceKind) -> Orchestrator {
        Orchestrator {
            run: self.clone(),
            kind,
            lifecycle: Lifecycle::Absent,
            identity: None,
            state: None,
        }
    }

    /// Orchestrator for an object already observed (e.g. from a listing)
    pub fn adopt(&self, state: RemoteState) -> Orchestrator {
        let lifecycle = if state.is_terminal() {
            Lifecycle::Ready
        } else {
            Lifecycle::Provisioning
        };
        Orchestrator {
            run: self.clone(),
            kind: state.kind(),
            lifecycle,
            identity: Some(state.identity.clone()),
            state: Some(state),
        }
    }

    fn hierarchy(&self) -> HierarchyValidator {
        HierarchyValidator::new(self.client.clone())
    }

    fn poller(&self) -> StatePoller {
        StatePoller::new(
            self.client.clone(),
            self.scheduler.clone(),
            self.cancel.clone(),
            self.poll.clone(),
        )
    }
}

/// Operations every managed object supports
#[async_trait]
pub trait ResourceLifecycle: Send {
    /// Create the object and wait until it is usable
    async fn create(&mut self, spec: &ResourceSpec) -> Result<RemoteState>;

    /// Refresh the observed state; `None` once the object is gone
    async fn read(&mut self) -> Result<Option<RemoteState>>;

    /// Converge the object to `spec`
    async fn update(&mut self, spec: &ResourceSpec) -> Result<RemoteState>;

    async fn delete(&mut self) -> Result<()>;

    /// Take over an existing object and describe it as a spec
    async fn import(&mut self, identity: &Identity) -> Result<ResourceSpec>;
}

/// Drives a single remote object
pub struct Orchestrator {
    run: RunContext,
    kind: ResourceKind,
    lifecycle: Lifecycle,
    identity: Option<Identity>,
    state: Option<RemoteState>,
}

impl Orchestrator {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn state(&self) -> Option<&RemoteState> {
        self.state.as_ref()
    }

    fn behavior(&self) -> &'static KindBehavior {
        self.kind.behavior()
    }

    fn label(&self) -> String {
        self.identity
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "(pending)".to_string())
    }

    fn transition(&mut self, next: Lifecycle, operation: Operation) -> Result<()> {
        let label = self.label();
        let previous = self.lifecycle;
        self.lifecycle = previous.transition(next, self.kind, &label, operation)?;
        if previous != next {
            tracing::info!(
                kind = %self.kind,
                identity = %label,
                from = %previous,
                to = %next,
                "Lifecycle transition"
            );
        }
        Ok(())
    }

    fn mark_absent(&mut self) {
        if self.lifecycle != Lifecycle::Absent {
            tracing::info!(
                kind = %self.kind,
                identity = %self.label(),
                from = %self.lifecycle,
                "Object is gone"
            );
        }
        self.lifecycle = Lifecycle::Absent;
        self.identity = None;
        self.state = None;
    }

    /// Store a read-back, refusing one that belongs to another object
    fn observe(&mut self, state: RemoteState, operation: Operation) -> Result<RemoteState> {
        if let Some(identity) = &self.identity {
            if *identity != state.identity {
                return Err(CloudError::fatal(
                    self.kind,
                    identity.to_string(),
                    operation,
                    format!("remote returned a different object: {}", state.identity),
                ));
            }
        }
        self.identity = Some(state.identity.clone());
        self.state = Some(state.clone());
        Ok(state)
    }

    /// Move an in-between lifecycle to `Ready` once the object is stable
    fn settle(&mut self, state: &RemoteState, operation: Operation) -> Result<()> {
        let target = match self.lifecycle {
            Lifecycle::Absent if state.is_terminal() => Lifecycle::Ready,
            Lifecycle::Absent => Lifecycle::Provisioning,
            Lifecycle::Provisioning | Lifecycle::Updating | Lifecycle::Failed
                if state.is_terminal() =>
            {
                Lifecycle::Ready
            }
            _ => return Ok(()),
        };
        self.transition(target, operation)
    }

    fn check_kind(&self, spec: &ResourceSpec, operation: Operation) -> Result<()> {
        if spec.kind() != self.kind {
            return Err(CloudError::fatal(
                self.kind,
                spec.display_name(),
                operation,
                format!("orchestrator manages {} objects, got {}", self.kind, spec.kind()),
            ));
        }
        Ok(())
    }

    fn require_identity(&self, operation: Operation) -> Result<Identity> {
        self.identity.clone().ok_or_else(|| {
            CloudError::fatal(
                self.kind,
                self.label(),
                operation,
                format!("no {} object is managed yet", self.kind),
            )
        })
    }

    fn require_state(&self, operation: Operation) -> Result<RemoteState> {
        self.state.clone().ok_or_else(|| {
            CloudError::fatal(self.kind, self.label(), operation, "no observed state")
        })
    }

    async fn wait(&self, identity: &Identity, mode: WaitMode) -> Result<RemoteState> {
        let poll = self.run.poll_config();
        self.run
            .poller()
            .wait_for_state(identity, self.behavior().terminal, poll.deadline, mode)
            .await
    }

    /// Find the object `spec` describes without creating it
    ///
    /// Caller-assigned kinds are read by identity; server-assigned kinds are
    /// matched by exact name under the declared parent.
    pub async fn lookup(&mut self, spec: &ResourceSpec) -> Result<Option<RemoteState>> {
        self.check_kind(spec, Operation::Read)?;

        let found = match spec.identity() {
            Some(identity) => match self.run.client().read(&identity).await {
                Ok(state) => Some(state),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err),
            },
            None => {
                let filter = ListFilter {
                    parent: spec.parent(),
                    name_contains: Some(spec.name().to_string()),
                };
                self.run
                    .client()
                    .list(self.kind, &filter)
                    .await?
                    .into_iter()
                    .find(|state| state.name() == spec.name())
            }
        };

        match found {
            Some(state) => {
                let state = self.observe(state, Operation::Read)?;
                self.settle(&state, Operation::Read)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Create the object if it is missing, otherwise converge it
    pub async fn ensure(&mut self, spec: &ResourceSpec) -> Result<RemoteState> {
        let Some(state) = self.lookup(spec).await? else {
            return self.create(spec).await;
        };

        if self.lifecycle != Lifecycle::Ready {
            tracing::info!(
                kind = %self.kind,
                identity = %state.identity,
                state = %state.status_label(),
                "Waiting for existing object to settle"
            );
            let settled = self.wait(&state.identity, WaitMode::Convergence).await?;
            let settled = self.observe(settled, Operation::Read)?;
            self.settle(&settled, Operation::Read)?;
        }
        self.update(spec).await
    }

    /// Delete the object and create it again from `spec`
    pub async fn replace(&mut self, spec: &ResourceSpec) -> Result<RemoteState> {
        self.check_kind(spec, Operation::Create)?;
        tracing::info!(
            kind = %self.kind,
            identity = %self.label(),
            "Replacing object"
        );
        self.delete().await?;
        self.create(spec).await
    }
}

#[async_trait]
impl ResourceLifecycle for Orchestrator {
    async fn create(&mut self, spec: &ResourceSpec) -> Result<RemoteState> {
        self.check_kind(spec, Operation::Create)?;
        spec.validate()?;

        if let Some(parent) = spec.parent() {
            match self.run.hierarchy().require_present(&parent).await {
                Ok(_) => {}
                Err(err) if err.is_not_found() => {
                    return Err(CloudError::fatal(
                        self.kind,
                        spec.display_name(),
                        Operation::Create,
                        format!("parent {} {parent} does not exist", parent.kind()),
                    ));
                }
                Err(err) => return Err(err),
            }
        }

        self.transition(Lifecycle::Creating, Operation::Create)?;
        tracing::info!(kind = %self.kind, identity = %spec.display_name(), "Creating");

        let identity = match self.run.client().create(spec).await {
            Ok(identity) => identity,
            Err(err) => {
                // nothing was created
                self.mark_absent();
                return Err(err);
            }
        };
        self.identity = Some(identity.clone());
        self.transition(Lifecycle::Provisioning, Operation::Create)?;

        match self.wait(&identity, WaitMode::Creation).await {
            Ok(state) => {
                let state = self.observe(state, Operation::Create)?;
                self.transition(Lifecycle::Ready, Operation::Create)?;
                Ok(state)
            }
            Err(err @ CloudError::Canceled { .. }) => Err(err),
            Err(err) => {
                self.transition(Lifecycle::Failed, Operation::Create)?;
                Err(err)
            }
        }
    }

    async fn read(&mut self) -> Result<Option<RemoteState>> {
        let Some(identity) = self.identity.clone() else {
            return Ok(None);
        };

        match self.run.client().read(&identity).await {
            Ok(state) => {
                let state = self.observe(state, Operation::Read)?;
                self.settle(&state, Operation::Read)?;
                Ok(Some(state))
            }
            Err(err) if err.is_not_found() => {
                self.mark_absent();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn update(&mut self, spec: &ResourceSpec) -> Result<RemoteState> {
        self.check_kind(spec, Operation::Update)?;
        if self.lifecycle != Lifecycle::Ready {
            return Err(CloudError::fatal(
                self.kind,
                self.label(),
                Operation::Update,
                format!("cannot update while {}", self.lifecycle),
            ));
        }
        spec.validate()?;
        let identity = self.require_identity(Operation::Update)?;

        let plan = diff::plan(spec, self.state.as_ref())?;
        if plan.requires_replacement() {
            return Err(CloudError::RequiresReplacement {
                kind: self.kind,
                identity: identity.to_string(),
                fields: plan.replacement.clone(),
            });
        }
        if plan.is_empty() {
            tracing::debug!(kind = %self.kind, identity = %identity, "No changes");
            return self.require_state(Operation::Update);
        }

        if let Some(change) = plan.association_change() {
            let new_parent = match (change.desired.as_str(), self.behavior().parent) {
                (Some(id), Some(parent_kind)) if !id.is_empty() => {
                    Some(Identity::parse(parent_kind, id)?)
                }
                _ => None,
            };
            let blockers = self
                .run
                .hierarchy()
                .reassociation_blockers(&identity, new_parent.as_ref())
                .await?;
            if !blockers.is_empty() {
                return Err(CloudError::DependencyExists {
                    kind: self.kind,
                    identity: identity.to_string(),
                    children: blockers,
                });
            }
        }

        self.transition(Lifecycle::Updating, Operation::Update)?;
        tracing::info!(
            kind = %self.kind,
            identity = %identity,
            plan = %plan.summary(),
            "Updating"
        );

        if let Err(err) = diff::apply(self.run.client().as_ref(), spec, &plan).await {
            if err.root().is_not_found() {
                self.mark_absent();
            } else if matches!(err, CloudError::PartialApply { .. }) {
                self.transition(Lifecycle::Failed, Operation::Update)?;
            } else {
                // first step rejected, remote unchanged
                self.transition(Lifecycle::Ready, Operation::Update)?;
            }
            return Err(err);
        }

        match self.wait(&identity, WaitMode::Convergence).await {
            Ok(state) => {
                let state = self.observe(state, Operation::Update)?;
                self.transition(Lifecycle::Ready, Operation::Update)?;
                Ok(state)
            }
            Err(err) if err.is_not_found() => {
                self.mark_absent();
                Err(err)
            }
            Err(err @ CloudError::Canceled { .. }) => Err(err),
            Err(err) => {
                self.transition(Lifecycle::Failed, Operation::Update)?;
                Err(err)
            }
        }
    }

    async fn delete(&mut self) -> Result<()> {
        let Some(identity) = self.identity.clone() else {
            return Ok(());
        };

        let state = match self.run.client().read(&identity).await {
            Ok(state) => self.observe(state, Operation::Delete)?,
            Err(err) if err.is_not_found() => {
                self.mark_absent();
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        self.settle(&state, Operation::Delete)?;

        if self.behavior().termination_protected && state.termination_protection() {
            return Err(CloudError::fatal(
                self.kind,
                identity.to_string(),
                Operation::Delete,
                "termination protection is enabled; disable it before deleting",
            ));
        }

        let blockers = self.run.hierarchy().blocking_children(&identity).await?;
        if !blockers.is_empty() {
            return Err(CloudError::DependencyExists {
                kind: self.kind,
                identity: identity.to_string(),
                children: blockers
                    .iter()
                    .map(|child| format!("{} {}", child.kind(), child.identity))
                    .collect(),
            });
        }

        self.transition(Lifecycle::Deleting, Operation::Delete)?;
        match self.run.client().delete(&identity).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                self.transition(Lifecycle::Failed, Operation::Delete)?;
                return Err(err);
            }
        }

        tracing::info!(kind = %self.kind, identity = %identity, "Deleted");
        self.mark_absent();
        Ok(())
    }

    async fn import(&mut self, identity: &Identity) -> Result<ResourceSpec> {
        if identity.kind() != self.kind {
            return Err(CloudError::fatal(
                self.kind,
                identity.to_string(),
                Operation::Import,
                format!("orchestrator manages {} objects", self.kind),
            ));
        }
        if self.identity.as_ref().is_some_and(|current| current != identity) {
            return Err(CloudError::fatal(
                self.kind,
                identity.to_string(),
                Operation::Import,
                format!("already managing {}", self.label()),
            ));
        }

        let state = self.run.client().read(identity).await?;
        let state = self.observe(state, Operation::Import)?;
        self.settle(&state, Operation::Import)?;
        tracing::info!(
            kind = %self.kind,
            identity = %identity,
            lifecycle = %self.lifecycle,
            "Imported"
        );
        Ok(state.to_spec())
    }
}
