//! Remote client facade
//!
//! Uniform create/read/update/delete/list over a remote control plane. Every
//! implementation classifies its failures into [`ErrorClass`] so the engine
//! never inspects transport details.

use crate::action::FieldChange;
use crate::error::{CloudError, ErrorClass, Operation, Result};
use crate::identity::Identity;
use crate::kind::{FieldGroup, Naming, ResourceKind};
use crate::poller::CancelToken;
use crate::spec::ResourceSpec;
use crate::state::RemoteState;
use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Control-plane API abstraction
///
/// Implementations are stateless; the same handle may be shared by any
/// number of orchestrators.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Client name for logs (e.g., "aiven", "memory")
    fn name(&self) -> &str;

    /// Create the object and return its identity
    async fn create(&self, spec: &ResourceSpec) -> Result<Identity>;

    async fn read(&self, identity: &Identity) -> Result<RemoteState>;

    /// Apply one field group's changes
    async fn update(&self, identity: &Identity, update: &FieldGroupUpdate) -> Result<()>;

    async fn delete(&self, identity: &Identity) -> Result<()>;

    async fn list(&self, kind: ResourceKind, filter: &ListFilter) -> Result<Vec<RemoteState>>;
}

/// Scope of a `list` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Only objects currently owned by this parent
    pub parent: Option<Identity>,
    /// Only objects whose name contains this fragment
    pub name_contains: Option<String>,
}

impl ListFilter {
    pub fn under(parent: Identity) -> Self {
        Self {
            parent: Some(parent),
            name_contains: None,
        }
    }

    pub fn containing(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn matches(&self, state: &RemoteState) -> bool {
        if let Some(parent) = &self.parent {
            if state.parent().as_ref() != Some(parent) {
                return false;
            }
        }
        match &self.name_contains {
            Some(fragment) => state.name().contains(fragment.as_str()),
            None => true,
        }
    }
}

/// Changes of one field group, sent as a single remote update
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGroupUpdate {
    pub group: FieldGroup,
    /// Nested JSON object holding only the changed paths; `null` resets a field
    pub changes: Value,
    /// Dotted paths included in `changes`
    pub paths: Vec<String>,
}

impl FieldGroupUpdate {
    pub fn from_changes(group: FieldGroup, changes: &[FieldChange]) -> Self {
        let mut root = Map::new();
        for change in changes {
            let segments: Vec<&str> = change.path.split('.').collect();
            insert_path(&mut root, &segments, change.desired.clone());
        }

        Self {
            group,
            changes: Value::Object(root),
            paths: changes.iter().map(|c| c.path.clone()).collect(),
        }
    }

    /// Value of a dotted path within the changes
    pub fn value(&self, path: &str) -> Option<&Value> {
        self.changes.pointer(&format!("/{}", path.replace('.', "/")))
    }
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Retry configuration for remote calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Random extra delay as a fraction of the backoff (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Retry immediately, without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Backoff before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = (base as u64).min(self.max_delay.as_millis() as u64);

        let jitter_range = capped as f64 * self.jitter;
        let jitter = if jitter_range >= 1.0 {
            rand::thread_rng().gen_range(0.0..jitter_range).floor() as u64
        } else {
            0
        };

        Duration::from_millis(capped.saturating_add(jitter))
    }
}

/// Decorator that retries `Transient` failures with capped exponential backoff
///
/// A canceled [`CancelToken`] ends any backoff in progress and stops
/// further attempts.
pub struct RetryingClient {
    inner: Arc<dyn RemoteClient>,
    config: RetryConfig,
    cancel: CancelToken,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn RemoteClient>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            cancel: CancelToken::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn with_retry<T, F, Fut>(
        &self,
        kind: ResourceKind,
        operation: Operation,
        label: &str,
        mut call: F,
    ) -> Result<T>
    where
        T: Send,
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let canceled = || CloudError::Canceled {
            kind,
            identity: label.to_string(),
        };
        let mut attempt = 0;
        loop {
            if attempt > 0 && self.cancel.is_canceled() {
                return Err(canceled());
            }
            match call(attempt).await {
                Err(err) if err.is_transient() && attempt + 1 < self.config.max_attempts => {
                    let delay = self.config.delay_for_attempt(attempt);
                    tracing::warn!(
                        client = self.inner.name(),
                        %operation,
                        identity = label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        err
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.canceled() => return Err(canceled()),
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl RemoteClient for RetryingClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<Identity> {
        let inner = &self.inner;
        let label = spec.display_name();
        let caller_named = spec.kind().behavior().naming == Naming::CallerAssigned;

        self.with_retry(spec.kind(), Operation::Create, &label, move |attempt| async move {
            match inner.create(spec).await {
                // an earlier attempt landed even though its response was lost
                Err(err) if attempt > 0 && caller_named && err.class() == ErrorClass::Conflict => {
                    match spec.identity() {
                        Some(identity) => {
                            tracing::debug!(
                                kind = %spec.kind(),
                                identity = %identity,
                                "Create conflict after retry, treating as created"
                            );
                            Ok(identity)
                        }
                        None => Err(err),
                    }
                }
                result => result,
            }
        })
        .await
    }

    async fn read(&self, identity: &Identity) -> Result<RemoteState> {
        let inner = &self.inner;
        self.with_retry(identity.kind(), Operation::Read, &identity.to_string(), move |_| {
            inner.read(identity)
        })
        .await
    }

    async fn update(&self, identity: &Identity, update: &FieldGroupUpdate) -> Result<()> {
        let inner = &self.inner;
        self.with_retry(identity.kind(), Operation::Update, &identity.to_string(), move |_| {
            inner.update(identity, update)
        })
        .await
    }

    async fn delete(&self, identity: &Identity) -> Result<()> {
        let inner = &self.inner;
        self.with_retry(identity.kind(), Operation::Delete, &identity.to_string(), move |_| {
            inner.delete(identity)
        })
        .await
    }

    async fn list(&self, kind: ResourceKind, filter: &ListFilter) -> Result<Vec<RemoteState>> {
        let inner = &self.inner;
        self.with_retry(kind, Operation::List, kind.as_str(), move |_| {
            inner.list(kind, filter)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCloud;
    use crate::poller::CancelHandle;
    use crate::spec::{ProjectSpec, ResourceSpec};
    use serde_json::json;

    fn project(name: &str) -> ResourceSpec {
        ResourceSpec::Project(ProjectSpec {
            project: name.to_string(),
            account_id: Default::default(),
            billing_group: Default::default(),
            technical_emails: Default::default(),
            default_cloud: Default::default(),
        })
    }

    fn transient(identity: &str) -> CloudError {
        CloudError::Transient {
            kind: ResourceKind::Project,
            identity: identity.to_string(),
            operation: Operation::Read,
            message: "429 Too Many Requests".to_string(),
        }
    }

    #[test]
    fn test_delay_for_attempt_is_capped() {
        let config = RetryConfig {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_range() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let delay = config.delay_for_attempt(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_millis(2200));
        }
    }

    #[test]
    fn test_group_update_nests_dotted_paths() {
        let changes = vec![
            FieldChange::new("kafka_user_config.kafka_rest", json!(true), json!(false)),
            FieldChange::new(
                "kafka_user_config.public_access.prometheus",
                json!(true),
                Value::Null,
            ),
        ];
        let update = FieldGroupUpdate::from_changes(FieldGroup::UserConfig, &changes);

        assert_eq!(
            update.changes,
            json!({"kafka_user_config": {"kafka_rest": true, "public_access": {"prometheus": true}}})
        );
        assert_eq!(
            update.value("kafka_user_config.public_access.prometheus"),
            Some(&json!(true))
        );
        assert_eq!(update.paths.len(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let cloud = Arc::new(MemoryCloud::new());
        let client = RetryingClient::new(cloud.clone(), RetryConfig::immediate(3));
        let id = client.create(&project("test-acc-pr-1")).await.unwrap();

        cloud.fail_next(Operation::Read, transient("test-acc-pr-1"));
        cloud.fail_next(Operation::Read, transient("test-acc-pr-1"));
        let state = client.read(&id).await.unwrap();

        assert_eq!(state.name(), "test-acc-pr-1");
        assert_eq!(cloud.calls(Operation::Read), 3);
    }

    #[tokio::test]
    async fn test_retries_give_up_after_max_attempts() {
        let cloud = Arc::new(MemoryCloud::new());
        let client = RetryingClient::new(cloud.clone(), RetryConfig::immediate(2));
        let id = client.create(&project("test-acc-pr-1")).await.unwrap();

        for _ in 0..3 {
            cloud.fail_next(Operation::Read, transient("test-acc-pr-1"));
        }
        let err = client.read(&id).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(cloud.calls(Operation::Read), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_retry_backoff() {
        let cloud = Arc::new(MemoryCloud::new());
        let id = cloud.create(&project("test-acc-pr-1")).await.unwrap();
        let (handle, token) = CancelHandle::new();
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.0,
            jitter: 0.0,
        };
        let client = RetryingClient::new(cloud.clone(), config).with_cancel(token);

        for _ in 0..4 {
            cloud.fail_next(Operation::Read, transient("test-acc-pr-1"));
        }
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = client.read(&id).await.unwrap_err();

        assert!(matches!(err, CloudError::Canceled { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(cloud.calls(Operation::Read), 1);
    }

    #[tokio::test]
    async fn test_fatal_failures_are_not_retried() {
        let cloud = Arc::new(MemoryCloud::new());
        let client = RetryingClient::new(cloud.clone(), RetryConfig::immediate(5));

        cloud.fail_next(
            Operation::Create,
            CloudError::fatal(ResourceKind::Project, "p", Operation::Create, "bad request"),
        );
        assert!(client.create(&project("p")).await.is_err());
        assert_eq!(cloud.calls(Operation::Create), 1);
    }

    #[tokio::test]
    async fn test_conflict_after_lost_create_response_is_success() {
        let cloud = Arc::new(MemoryCloud::new());
        let client = RetryingClient::new(cloud.clone(), RetryConfig::immediate(3));

        // first attempt lands remotely but the caller only sees a timeout
        cloud.fail_after_next(Operation::Create, transient("test-acc-pr-1"));
        let id = client.create(&project("test-acc-pr-1")).await.unwrap();

        assert_eq!(id, Identity::project("test-acc-pr-1"));
        assert_eq!(cloud.calls(Operation::Create), 2);
        assert_eq!(cloud.len(), 1);
    }
}
