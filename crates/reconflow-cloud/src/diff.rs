//! Diff and apply engine
//!
//! [`plan`] compares a desired spec with the last observed state and emits
//! the minimal ordered set of remote mutations; [`apply`] executes them.

use crate::action::{FieldChange, OperationPlan, PlanStep};
use crate::client::{FieldGroupUpdate, RemoteClient};
use crate::error::{CloudError, Operation, Result};
use crate::identity::Identity;
use crate::kind::{FieldGroup, FieldRole, Mutability};
use crate::spec::ResourceSpec;
use crate::state::RemoteState;
use serde_json::Value;
use std::collections::BTreeMap;

/// Null, empty string, `false`, empty array and empty object all mean "not set"
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Walk the desired tree; keys absent from `desired` are left alone
fn diff_value(path: &str, desired: &Value, observed: &Value, out: &mut Vec<FieldChange>) {
    match desired {
        Value::Object(fields) => {
            for (key, want) in fields {
                let have = observed.get(key).unwrap_or(&Value::Null);
                diff_value(&child_path(path, key), want, have, out);
            }
        }
        Value::Null => {
            if !is_empty(observed) {
                out.push(FieldChange::new(path, Value::Null, observed.clone()));
            }
        }
        _ => {
            if desired != observed && !(is_empty(desired) && is_empty(observed)) {
                out.push(FieldChange::new(path, desired.clone(), observed.clone()));
            }
        }
    }
}

/// Compute the plan that moves `observed` to `spec`
///
/// With no observed state the plan is a single create. A changed immutable
/// field yields a `[Delete, Create]` replacement plan listing the fields.
pub fn plan(spec: &ResourceSpec, observed: Option<&RemoteState>) -> Result<OperationPlan> {
    let kind = spec.kind();
    let Some(observed) = observed else {
        return Ok(OperationPlan {
            kind,
            identity: spec.identity(),
            steps: vec![PlanStep::Create],
            replacement: Vec::new(),
        });
    };

    let behavior = kind.behavior();
    let label = observed.identity.to_string();
    let desired = spec.desired_attributes()?;
    let current = observed.observed_attributes()?;

    let mut changes = Vec::new();
    diff_value("", &desired, &current, &mut changes);

    let association_changed = changes.iter().any(|c| {
        behavior
            .rule_for(&c.path)
            .is_some_and(|r| r.role == FieldRole::Association)
    });
    if association_changed {
        // defaults of the old parent must not follow the object
        for rule in behavior.rules.iter().filter(|r| r.role == FieldRole::Inherited) {
            let pinned = desired.get(rule.path).is_some();
            let have = current.get(rule.path).unwrap_or(&Value::Null);
            if !pinned && !is_empty(have) {
                changes.push(FieldChange::new(rule.path, Value::Null, have.clone()));
            }
        }
    }

    let mut replacement = Vec::new();
    let mut groups: BTreeMap<usize, (FieldGroup, Vec<FieldChange>)> = BTreeMap::new();
    for change in changes {
        let rule = behavior.rule_for(&change.path).ok_or_else(|| {
            CloudError::fatal(
                kind,
                &label,
                Operation::Validate,
                format!("unknown attribute '{}'", change.path),
            )
        })?;

        let group = match rule.mutability {
            Mutability::Computed => continue,
            Mutability::Immutable => {
                replacement.push(change.path);
                continue;
            }
            Mutability::InPlace(group) => group,
            Mutability::GrowOnly(group) => {
                let bounds = (change.desired.as_u64(), change.observed.as_u64());
                if let (Some(want), Some(have)) = bounds {
                    if want < have {
                        return Err(CloudError::fatal(
                            kind,
                            &label,
                            Operation::Update,
                            format!("{} cannot be decreased ({have} -> {want})", change.path),
                        ));
                    }
                }
                group
            }
        };
        groups
            .entry(behavior.group_rank(group))
            .or_insert_with(|| (group, Vec::new()))
            .1
            .push(change);
    }

    let steps = if replacement.is_empty() {
        groups
            .into_values()
            .map(|(group, changes)| PlanStep::Update { group, changes })
            .collect()
    } else {
        vec![PlanStep::Delete, PlanStep::Create]
    };

    Ok(OperationPlan {
        kind,
        identity: Some(observed.identity.clone()),
        steps,
        replacement,
    })
}

fn label_of(identity: &Option<Identity>, spec: &ResourceSpec) -> String {
    identity
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| spec.display_name())
}

/// Execute `plan` step by step and read the object back
///
/// A failure on the first step is returned as is; a later failure is wrapped
/// in [`CloudError::PartialApply`] so the caller knows earlier steps landed.
pub async fn apply(
    client: &dyn RemoteClient,
    spec: &ResourceSpec,
    plan: &OperationPlan,
) -> Result<RemoteState> {
    let kind = plan.kind;
    let total = plan.steps.len();
    let mut identity = plan.identity.clone();

    for (index, step) in plan.steps.iter().enumerate() {
        tracing::info!(
            kind = %kind,
            identity = %label_of(&identity, spec),
            step = %step,
            "Applying step {}/{}",
            index + 1,
            total
        );

        let result = match step {
            PlanStep::Create => match client.create(spec).await {
                Ok(id) => {
                    identity = Some(id);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            PlanStep::Update { group, changes } => match &identity {
                Some(id) => {
                    let update = FieldGroupUpdate::from_changes(*group, changes);
                    client.update(id, &update).await
                }
                None => Err(CloudError::fatal(
                    kind,
                    spec.display_name(),
                    Operation::Update,
                    "update step without an identity",
                )),
            },
            PlanStep::Delete => match &identity {
                Some(id) => match client.delete(id).await {
                    Err(err) if err.is_not_found() => Ok(()),
                    other => other,
                },
                None => Ok(()),
            },
        };

        if let Err(source) = result {
            if index == 0 {
                return Err(source);
            }
            return Err(CloudError::PartialApply {
                kind,
                identity: label_of(&identity, spec),
                completed: index,
                total,
                source: Box::new(source),
            });
        }
    }

    let Some(id) = identity.clone() else {
        return Err(CloudError::fatal(
            kind,
            spec.display_name(),
            Operation::Read,
            "nothing to read back: plan has no identity",
        ));
    };
    client.read(&id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::kind::ResourceKind;
    use crate::memory::MemoryCloud;
    use crate::spec::{
        KafkaSettings, KafkaSpec, KafkaTopicSpec, KafkaUserConfig, ProjectSpec, PublicAccess,
    };
    use crate::state::{KafkaState, KafkaTopicState, Observed, ProjectState, RemoteStatus};

    fn kafka_spec() -> KafkaSpec {
        KafkaSpec {
            project: "p".to_string(),
            service_name: "k".to_string(),
            plan: "business-4".to_string(),
            cloud_name: Field::Unset,
            project_vpc_id: Field::Unset,
            maintenance_window_dow: Field::Set("monday".to_string()),
            maintenance_window_time: Field::Set("10:00:00".to_string()),
            termination_protection: Field::Unset,
            kafka_user_config: None,
        }
    }

    fn kafka_state() -> RemoteState {
        RemoteState::new(
            Identity::kafka("p", "k"),
            Observed::Kafka(KafkaState {
                project: "p".to_string(),
                service_name: "k".to_string(),
                plan: "business-4".to_string(),
                cloud_name: "google-europe-west1".to_string(),
                maintenance_window_dow: "monday".to_string(),
                maintenance_window_time: "10:00:00".to_string(),
                service_uri: "k-p.aivencloud.com:12691".to_string(),
                ..Default::default()
            }),
        )
        .with_status(RemoteStatus::Running)
    }

    #[test]
    fn test_no_observed_state_plans_create() {
        let spec = ResourceSpec::Kafka(kafka_spec());
        let plan = plan(&spec, None).unwrap();
        assert_eq!(plan.steps, vec![PlanStep::Create]);
    }

    #[test]
    fn test_matching_state_plans_nothing() {
        let spec = ResourceSpec::Kafka(kafka_spec());
        let plan = plan(&spec, Some(&kafka_state())).unwrap();
        assert!(plan.is_empty(), "unexpected steps: {:?}", plan.steps);
    }

    #[test]
    fn test_groups_follow_kind_order() {
        let mut spec = kafka_spec();
        spec.termination_protection = Field::Set(true);
        spec.plan = "business-8".to_string();
        spec.kafka_user_config = Some(KafkaUserConfig {
            kafka_rest: Field::Set(true),
            public_access: Some(PublicAccess {
                prometheus: Field::Set(true),
                ..Default::default()
            }),
            ..Default::default()
        });

        let plan = plan(&ResourceSpec::Kafka(spec), Some(&kafka_state())).unwrap();
        let groups: Vec<FieldGroup> = plan
            .steps
            .iter()
            .map(|s| match s {
                PlanStep::Update { group, .. } => *group,
                other => panic!("unexpected step {other}"),
            })
            .collect();
        assert_eq!(
            groups,
            vec![FieldGroup::Plan, FieldGroup::UserConfig, FieldGroup::Protection]
        );
        assert!(plan.changes().any(|c| c.path == "kafka_user_config.public_access.prometheus"));
    }

    #[test]
    fn test_clear_differs_only_from_non_empty() {
        let mut spec = kafka_spec();
        spec.project_vpc_id = Field::Clear;
        let plan_empty = plan(&ResourceSpec::Kafka(spec.clone()), Some(&kafka_state())).unwrap();
        assert!(plan_empty.is_empty());

        let mut state = kafka_state();
        if let Observed::Kafka(k) = &mut state.observed {
            k.project_vpc_id = "vpc-1".to_string();
        }
        let plan = plan(&ResourceSpec::Kafka(spec), Some(&state)).unwrap();
        let change = plan.changes().next().unwrap();
        assert_eq!(change.path, "project_vpc_id");
        assert_eq!(change.desired, Value::Null);
    }

    #[test]
    fn test_immutable_change_requires_replacement() {
        let mut spec = kafka_spec();
        spec.service_name = "renamed".to_string();
        let plan = plan(&ResourceSpec::Kafka(spec), Some(&kafka_state())).unwrap();

        assert_eq!(plan.steps, vec![PlanStep::Delete, PlanStep::Create]);
        assert_eq!(plan.replacement, vec!["service_name".to_string()]);
    }

    #[test]
    fn test_grow_only_rejects_decrease() {
        let spec = ResourceSpec::KafkaTopic(KafkaTopicSpec {
            project: "p".to_string(),
            service_name: "k".to_string(),
            topic_name: "t".to_string(),
            partitions: 2,
            replication: 2,
            config: None,
        });
        let state = RemoteState::new(
            Identity::parse(ResourceKind::KafkaTopic, "p/k/t").unwrap(),
            Observed::KafkaTopic(KafkaTopicState {
                project: "p".to_string(),
                service_name: "k".to_string(),
                topic_name: "t".to_string(),
                partitions: 6,
                replication: 2,
                config: None,
            }),
        );

        let err = plan(&spec, Some(&state)).unwrap_err();
        assert!(err.to_string().contains("partitions cannot be decreased"));
    }

    #[test]
    fn test_reassociation_resets_inherited_fields() {
        let observed = RemoteState::new(
            Identity::project("p"),
            Observed::Project(ProjectState {
                project: "p".to_string(),
                account_id: "a1".to_string(),
                billing_group: "bg-a1".to_string(),
                ..Default::default()
            }),
        );
        let mut spec = ProjectSpec {
            project: "p".to_string(),
            account_id: Field::Set("a2".to_string()),
            billing_group: Field::Unset,
            technical_emails: Field::Unset,
            default_cloud: Field::Unset,
        };

        let moved = plan(&ResourceSpec::Project(spec.clone()), Some(&observed)).unwrap();
        let paths: Vec<&str> = moved.changes().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["account_id", "billing_group"]);
        assert_eq!(moved.steps.len(), 1);

        // a pinned value is kept
        spec.billing_group = Field::Set("bg-a1".to_string());
        let pinned = plan(&ResourceSpec::Project(spec), Some(&observed)).unwrap();
        let paths: Vec<&str> = pinned.changes().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["account_id"]);
    }

    #[tokio::test]
    async fn test_apply_updates_and_reads_back() {
        let cloud = MemoryCloud::new();
        cloud
            .create(&ResourceSpec::Project(ProjectSpec {
                project: "p".to_string(),
                account_id: Field::Unset,
                billing_group: Field::Unset,
                technical_emails: Field::Unset,
                default_cloud: Field::Unset,
            }))
            .await
            .unwrap();
        let spec = ResourceSpec::Kafka(kafka_spec());
        let id = cloud.create(&spec).await.unwrap();
        let before = cloud.read(&id).await.unwrap();

        let mut desired = kafka_spec();
        desired.maintenance_window_dow = Field::Set("friday".to_string());
        let desired = ResourceSpec::Kafka(desired);
        let plan = plan(&desired, Some(&before)).unwrap();
        let after = apply(&cloud, &desired, &plan).await.unwrap();

        let Observed::Kafka(k) = &after.observed else {
            panic!("expected kafka");
        };
        assert_eq!(k.maintenance_window_dow, "friday");
        assert!(super::plan(&desired, Some(&after)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nested_null_resets_user_config() {
        let cloud = MemoryCloud::new();
        cloud
            .create(&ResourceSpec::Project(ProjectSpec {
                project: "p".to_string(),
                account_id: Field::Unset,
                billing_group: Field::Unset,
                technical_emails: Field::Unset,
                default_cloud: Field::Unset,
            }))
            .await
            .unwrap();
        let mut created = kafka_spec();
        created.kafka_user_config = Some(KafkaUserConfig {
            kafka_version: Field::Set("3.5".to_string()),
            kafka: Some(KafkaSettings {
                log_retention_bytes: Field::Set(1000),
                ..Default::default()
            }),
            ..Default::default()
        });
        let id = cloud.create(&ResourceSpec::Kafka(created)).await.unwrap();
        let before = cloud.read(&id).await.unwrap();

        let mut desired = kafka_spec();
        desired.kafka_user_config = Some(KafkaUserConfig {
            kafka_version: Field::Clear,
            kafka: Some(KafkaSettings {
                log_retention_bytes: Field::Clear,
                ..Default::default()
            }),
            ..Default::default()
        });
        let desired = ResourceSpec::Kafka(desired);
        let plan = plan(&desired, Some(&before)).unwrap();

        let [PlanStep::Update { group, changes }] = &plan.steps[..] else {
            panic!("expected one update, got {:?}", plan.steps);
        };
        assert_eq!(*group, FieldGroup::UserConfig);
        let mut reset: Vec<(&str, &Value)> = changes
            .iter()
            .map(|c| (c.path.as_str(), &c.desired))
            .collect();
        reset.sort_by_key(|(path, _)| *path);
        assert_eq!(
            reset,
            vec![
                ("kafka_user_config.kafka.log_retention_bytes", &Value::Null),
                ("kafka_user_config.kafka_version", &Value::Null),
            ]
        );

        let after = apply(&cloud, &desired, &plan).await.unwrap();
        let Observed::Kafka(k) = &after.observed else {
            panic!("expected kafka");
        };
        let user_config = k.kafka_user_config.as_ref().unwrap();
        assert!(user_config.kafka_version.as_set().is_none());
        assert!(super::plan(&desired, Some(&after)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_after_first_step_is_partial() {
        let cloud = MemoryCloud::new();
        cloud
            .create(&ResourceSpec::Project(ProjectSpec {
                project: "p".to_string(),
                account_id: Field::Unset,
                billing_group: Field::Unset,
                technical_emails: Field::Unset,
                default_cloud: Field::Unset,
            }))
            .await
            .unwrap();
        let id = cloud.create(&ResourceSpec::Kafka(kafka_spec())).await.unwrap();
        let before = cloud.read(&id).await.unwrap();

        let mut desired = kafka_spec();
        desired.plan = "business-8".to_string();
        desired.termination_protection = Field::Set(true);
        let desired = ResourceSpec::Kafka(desired);
        let plan = plan(&desired, Some(&before)).unwrap();
        assert_eq!(plan.steps.len(), 2);

        cloud.fail_next(
            Operation::Update,
            CloudError::fatal(ResourceKind::Kafka, "p/k", Operation::Update, "plan rejected"),
        );
        let err = apply(&cloud, &desired, &plan).await.unwrap_err();
        assert!(matches!(err, CloudError::Fatal { .. }));

        // plan step lands, protection step fails
        cloud.succeed_next(Operation::Update);
        cloud.fail_next(
            Operation::Update,
            CloudError::fatal(ResourceKind::Kafka, "p/k", Operation::Update, "protection rejected"),
        );
        let err = apply(&cloud, &desired, &plan).await.unwrap_err();
        match &err {
            CloudError::PartialApply {
                completed, total, ..
            } => {
                assert_eq!((*completed, *total), (1, 2));
            }
            other => panic!("expected partial apply, got {other}"),
        }
        assert!(err.to_string().contains("protection rejected"));

        let Some(Observed::Kafka(k)) = cloud.snapshot(&id).map(|s| s.observed) else {
            panic!("expected kafka");
        };
        assert_eq!(k.plan, "business-8");
        assert!(!k.termination_protection);
    }
}
