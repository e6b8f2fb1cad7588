//! Ownership rules between resources
//!
//! Parent/child edges form a DAG. The [`HierarchyValidator`] answers the
//! questions the orchestrator needs before deleting a parent or moving a
//! child, always from a fresh listing.

use crate::client::{ListFilter, RemoteClient};
use crate::error::Result;
use crate::identity::Identity;
use crate::kind::ResourceKind;
use crate::state::RemoteState;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Directed parent -> child edges that never form a cycle
#[derive(Debug, Clone)]
pub struct AssociationGraph<N: Ord + Clone> {
    edges: BTreeMap<N, BTreeSet<N>>,
}

impl<N: Ord + Clone> Default for AssociationGraph<N> {
    fn default() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }
}

impl<N: Ord + Clone> AssociationGraph<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `parent -> child`; returns `false` (and adds nothing) for a
    /// self-edge or an edge that would close a cycle
    pub fn associate(&mut self, parent: N, child: N) -> bool {
        if parent == child || self.reaches(&child, &parent) {
            return false;
        }
        self.edges.entry(parent).or_default().insert(child);
        true
    }

    pub fn dissociate(&mut self, parent: &N, child: &N) {
        if let Some(children) = self.edges.get_mut(parent) {
            children.remove(child);
        }
    }

    pub fn children(&self, parent: &N) -> impl Iterator<Item = &N> {
        self.edges.get(parent).into_iter().flatten()
    }

    /// Whether `to` is reachable from `from` along child edges
    pub fn reaches(&self, from: &N, to: &N) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if seen.insert(node) {
                stack.extend(self.children(node));
            }
        }
        false
    }
}

/// The static kind hierarchy as a graph
pub fn kind_graph() -> AssociationGraph<ResourceKind> {
    let mut graph = AssociationGraph::new();
    for kind in ResourceKind::ALL {
        for child in kind.behavior().children {
            graph.associate(kind, *child);
        }
    }
    graph
}

/// Gatekeeper for operations that touch cross-resource ownership
pub struct HierarchyValidator {
    client: Arc<dyn RemoteClient>,
}

impl HierarchyValidator {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self { client }
    }

    /// Fresh read of a parent that must exist
    pub async fn require_present(&self, parent: &Identity) -> Result<RemoteState> {
        self.client.read(parent).await
    }

    /// Live children that keep `parent` from being deleted
    pub async fn blocking_children(&self, parent: &Identity) -> Result<Vec<RemoteState>> {
        let mut blockers = Vec::new();
        for child_kind in parent.kind().behavior().children {
            if !child_kind.behavior().blocks_parent_delete {
                continue;
            }
            let filter = ListFilter::under(parent.clone());
            blockers.extend(self.client.list(*child_kind, &filter).await?);
        }
        Ok(blockers)
    }

    pub async fn can_delete(&self, parent: &Identity) -> Result<bool> {
        Ok(self.blocking_children(parent).await?.is_empty())
    }

    /// Reasons `child` cannot move under `new_parent` right now
    ///
    /// The new parent must exist and the edge must not close a cycle; every
    /// child of `child` must be in a terminal state. `None` dissociates.
    pub async fn reassociation_blockers(
        &self,
        child: &Identity,
        new_parent: Option<&Identity>,
    ) -> Result<Vec<String>> {
        let mut blockers = Vec::new();

        if let Some(parent) = new_parent {
            self.require_present(parent).await?;

            let mut graph = AssociationGraph::new();
            let mut cursor = parent.clone();
            while let Some(up) = cursor.parent() {
                graph.associate(up.clone(), cursor.clone());
                cursor = up;
            }
            if !graph.associate(parent.clone(), child.clone()) {
                blockers.push(format!(
                    "{} {parent} cannot own {} {child}: cycle",
                    parent.kind(),
                    child.kind()
                ));
            }
        }

        for grandchild_kind in child.kind().behavior().children {
            let filter = ListFilter::under(child.clone());
            for state in self.client.list(*grandchild_kind, &filter).await? {
                if !state.is_terminal() {
                    blockers.push(format!(
                        "{} {} is {}",
                        state.kind(),
                        state.identity,
                        state.status_label()
                    ));
                }
            }
        }

        Ok(blockers)
    }

    pub async fn can_reassociate(
        &self,
        child: &Identity,
        new_parent: Option<&Identity>,
    ) -> Result<bool> {
        Ok(self
            .reassociation_blockers(child, new_parent)
            .await?
            .is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::memory::MemoryCloud;
    use crate::spec::{AccountSpec, KafkaSpec, ProjectSpec, ResourceSpec, ServiceUserSpec};
    use crate::state::RemoteStatus;

    #[test]
    fn test_graph_rejects_cycles_and_self_edges() {
        let mut graph = AssociationGraph::new();
        assert!(graph.associate("a", "b"));
        assert!(graph.associate("b", "c"));
        assert!(!graph.associate("c", "a"));
        assert!(!graph.associate("b", "b"));
        assert!(graph.reaches(&"a", &"c"));

        graph.dissociate(&"b", &"c");
        assert!(graph.associate("c", "a"));
    }

    #[test]
    fn test_kind_hierarchy_is_acyclic() {
        let graph = kind_graph();
        for kind in ResourceKind::ALL {
            for child in kind.behavior().children {
                assert!(graph.reaches(&kind, child));
                assert!(!graph.reaches(child, &kind), "{child} reaches {kind}");
            }
        }
        assert!(graph.reaches(&ResourceKind::Account, &ResourceKind::KafkaTopic));
    }

    fn project(name: &str, account_id: Option<&str>) -> ResourceSpec {
        ResourceSpec::Project(ProjectSpec {
            project: name.to_string(),
            account_id: account_id.map(str::to_string).into(),
            billing_group: Field::Unset,
            technical_emails: Field::Unset,
            default_cloud: Field::Unset,
        })
    }

    fn kafka(project: &str) -> ResourceSpec {
        ResourceSpec::Kafka(KafkaSpec {
            project: project.to_string(),
            service_name: "k".to_string(),
            plan: "startup-2".to_string(),
            cloud_name: Field::Unset,
            project_vpc_id: Field::Unset,
            maintenance_window_dow: Field::Unset,
            maintenance_window_time: Field::Unset,
            termination_protection: Field::Unset,
            kafka_user_config: None,
        })
    }

    #[tokio::test]
    async fn test_services_block_project_delete() {
        let cloud = Arc::new(MemoryCloud::new());
        let validator = HierarchyValidator::new(cloud.clone());
        let p = cloud.create(&project("p", None)).await.unwrap();
        assert!(validator.can_delete(&p).await.unwrap());

        let k = cloud.create(&kafka("p")).await.unwrap();
        let blockers = validator.blocking_children(&p).await.unwrap();
        assert_eq!(blockers.len(), 1);
        assert_eq!(blockers[0].identity, k);
    }

    #[tokio::test]
    async fn test_service_users_do_not_block_service_delete() {
        let cloud = Arc::new(MemoryCloud::new());
        let validator = HierarchyValidator::new(cloud.clone());
        cloud.create(&project("p", None)).await.unwrap();
        let k = cloud.create(&kafka("p")).await.unwrap();
        cloud
            .create(&ResourceSpec::ServiceUser(ServiceUserSpec {
                project: "p".to_string(),
                service_name: "k".to_string(),
                username: "app".to_string(),
                password: Field::Unset,
            }))
            .await
            .unwrap();

        assert!(validator.can_delete(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_reassociation_waits_for_services() {
        let cloud = Arc::new(MemoryCloud::new().with_settle_reads(2));
        let validator = HierarchyValidator::new(cloud.clone());
        let account = cloud
            .create(&ResourceSpec::Account(AccountSpec {
                name: "test-acc-ac-1".to_string(),
            }))
            .await
            .unwrap();
        let p = cloud.create(&project("p", None)).await.unwrap();
        let k = cloud.create(&kafka("p")).await.unwrap();

        let blockers = validator
            .reassociation_blockers(&p, Some(&account))
            .await
            .unwrap();
        assert_eq!(blockers, vec!["kafka p/k is REBUILDING".to_string()]);

        cloud.set_status(&k, RemoteStatus::Running);
        assert!(validator.can_reassociate(&p, Some(&account)).await.unwrap());
        assert!(validator.can_reassociate(&p, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_reassociation_to_missing_parent_fails() {
        let cloud = Arc::new(MemoryCloud::new());
        let validator = HierarchyValidator::new(cloud.clone());
        let p = cloud.create(&project("p", None)).await.unwrap();

        let err = validator
            .reassociation_blockers(&p, Some(&Identity::account("a-missing")))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
