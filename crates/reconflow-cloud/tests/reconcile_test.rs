mod common;

use common::{attrs, run, spec};
use reconflow_cloud::diff;
use reconflow_cloud::{
    CancelHandle, CloudError, Identity, Lifecycle, MemoryCloud, Operation, RemoteStatus,
    ResourceKind, ResourceLifecycle, RetryConfig, RetryingClient, RunContext, sweep_all,
};
use std::sync::Arc;

async fn account(run: &RunContext, name: &str) -> String {
    let state = run
        .orchestrator(ResourceKind::Account)
        .create(&spec(&format!("kind: account\nname: {name}\n")))
        .await
        .unwrap();
    state.identity.leaf().to_string()
}

fn project(name: &str, account_id: &str) -> String {
    format!("kind: project\nproject: {name}\naccount_id: {account_id}\n")
}

const KAFKA: &str = r#"
kind: kafka
project: test-acc-pr-1
service_name: test-acc-sr-1
plan: business-4
maintenance_window_dow: monday
maintenance_window_time: "10:00:00"
kafka_user_config:
  kafka_rest: true
  kafka_connect: true
  public_access:
    kafka_rest: true
    kafka_connect: true
"#;

#[tokio::test]
async fn test_project_moves_between_accounts() {
    let cloud = Arc::new(MemoryCloud::new());
    let run = run(&cloud);
    let a1 = account(&run, "test-acc-ac-1").await;
    let a2 = account(&run, "test-acc-ac-2").await;

    let mut p = run.orchestrator(ResourceKind::Project);
    let state = p.create(&spec(&project("test-acc-pr-1", &a1))).await.unwrap();
    assert_eq!(attrs(&state).get("billing_group"), format!("bg-{a1}"));

    // the old account's billing group must not follow the project
    let state = p.update(&spec(&project("test-acc-pr-1", &a2))).await.unwrap();
    assert_eq!(attrs(&state).get("account_id"), a2);
    assert_eq!(attrs(&state).get("billing_group"), format!("bg-{a2}"));

    let state = p
        .update(&spec(&project("test-acc-pr-1", "null")))
        .await
        .unwrap();
    assert_eq!(attrs(&state).get("account_id"), "");
    assert_eq!(attrs(&state).get("billing_group"), "");
    assert_eq!(p.lifecycle(), Lifecycle::Ready);
}

#[tokio::test]
async fn test_pinned_billing_group_survives_reassociation() {
    let cloud = Arc::new(MemoryCloud::new());
    let run = run(&cloud);
    let a1 = account(&run, "test-acc-ac-1").await;
    let a2 = account(&run, "test-acc-ac-2").await;

    let pinned = |account_id: &str| {
        spec(&format!(
            "{}billing_group: bg-custom\n",
            project("test-acc-pr-1", account_id)
        ))
    };
    let mut p = run.orchestrator(ResourceKind::Project);
    p.create(&pinned(&a1)).await.unwrap();
    let state = p.update(&pinned(&a2)).await.unwrap();

    assert_eq!(attrs(&state).get("account_id"), a2);
    assert_eq!(attrs(&state).get("billing_group"), "bg-custom");
}

#[tokio::test]
async fn test_reassociation_waits_for_services_to_settle() {
    let cloud = Arc::new(MemoryCloud::new().with_settle_reads(3));
    let run = run(&cloud);
    let a1 = account(&run, "test-acc-ac-1").await;
    let a2 = account(&run, "test-acc-ac-2").await;

    let mut p = run.orchestrator(ResourceKind::Project);
    p.create(&spec(&project("test-acc-pr-1", &a1))).await.unwrap();
    run.orchestrator(ResourceKind::Kafka)
        .create(&spec(KAFKA))
        .await
        .unwrap();
    cloud.set_status(
        &Identity::kafka("test-acc-pr-1", "test-acc-sr-1"),
        RemoteStatus::Rebalancing,
    );

    let err = p
        .update(&spec(&project("test-acc-pr-1", &a2)))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::DependencyExists { .. }), "{err}");
    assert_eq!(cloud.calls(Operation::Update), 0);
}

#[tokio::test]
async fn test_kafka_reaches_running_and_round_trips_user_config() {
    let cloud = Arc::new(MemoryCloud::new().with_settle_reads(4));
    let run = run(&cloud);
    run.orchestrator(ResourceKind::Project)
        .create(&spec("kind: project\nproject: test-acc-pr-1\n"))
        .await
        .unwrap();

    let desired = spec(KAFKA);
    let mut service = run.orchestrator(ResourceKind::Kafka);
    let state = service.create(&desired).await.unwrap();

    let attributes = attrs(&state);
    assert_eq!(attributes.get("state"), "RUNNING");
    assert_eq!(attributes.get("maintenance_window_dow"), "monday");
    assert_eq!(attributes.get("maintenance_window_time"), "10:00:00");
    assert_eq!(attributes.get("termination_protection"), "false");
    assert_eq!(attributes.get("kafka_user_config.0.kafka_rest"), "true");
    assert_eq!(attributes.get("kafka_user_config.0.kafka_connect"), "true");
    assert_eq!(
        attributes.get("kafka_user_config.0.public_access.0.kafka_rest"),
        "true"
    );
    assert_eq!(
        attributes.get("kafka_user_config.0.public_access.0.kafka_connect"),
        "true"
    );
    // unset siblings stay empty
    assert_eq!(attributes.get("kafka_user_config.0.public_access.0.kafka"), "");
    assert_eq!(attributes.get("kafka_user_config.0.schema_registry"), "");
    assert!(attributes.get("kafka.0.rest_uri").starts_with("https://"));
    assert!(attributes.get("kafka.0.connect_uri").starts_with("https://"));
    assert_eq!(attributes.get("kafka.0.schema_registry_uri"), "");
    assert!(diff::plan(&desired, Some(&state)).unwrap().is_empty());

    let bigger = spec(&KAFKA.replace("business-4", "business-8"));
    let state = service.update(&bigger).await.unwrap();
    assert_eq!(attrs(&state).get("plan"), "business-8");
    assert_eq!(attrs(&state).get("state"), "RUNNING");
    assert_eq!(service.lifecycle(), Lifecycle::Ready);
}

#[tokio::test]
async fn test_delete_respects_dependencies() {
    let cloud = Arc::new(MemoryCloud::new());
    let run = run(&cloud);
    let mut p = run.orchestrator(ResourceKind::Project);
    p.create(&spec("kind: project\nproject: test-acc-pr-1\n"))
        .await
        .unwrap();
    let mut service = run.orchestrator(ResourceKind::Kafka);
    service.create(&spec(KAFKA)).await.unwrap();

    let err = p.delete().await.unwrap_err();
    match err {
        CloudError::DependencyExists { children, .. } => {
            assert_eq!(children, vec!["kafka test-acc-pr-1/test-acc-sr-1".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cloud.calls(Operation::Delete), 0);

    service.delete().await.unwrap();
    p.delete().await.unwrap();
    assert!(p.read().await.unwrap().is_none());
    assert_eq!(p.lifecycle(), Lifecycle::Absent);
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_import_then_plan_is_empty() {
    let cloud = Arc::new(MemoryCloud::new());
    let run = run(&cloud);
    let a1 = account(&run, "test-acc-ac-1").await;
    run.orchestrator(ResourceKind::Project)
        .create(&spec(&format!(
            "{}technical_emails: [ops@example.com]\n",
            project("test-acc-pr-1", &a1)
        )))
        .await
        .unwrap();
    run.orchestrator(ResourceKind::Kafka)
        .create(&spec(KAFKA))
        .await
        .unwrap();

    for identity in [
        Identity::account(&a1),
        Identity::project("test-acc-pr-1"),
        Identity::kafka("test-acc-pr-1", "test-acc-sr-1"),
    ] {
        let mut imported = run.orchestrator(identity.kind());
        let synthesized = imported.import(&identity).await.unwrap();
        let plan = diff::plan(&synthesized, imported.state()).unwrap();
        assert!(plan.is_empty(), "{identity}: {:?}", plan.steps);
        assert_eq!(imported.lifecycle(), Lifecycle::Ready);
    }
}

#[tokio::test]
async fn test_immutable_change_requires_replacement() {
    let cloud = Arc::new(MemoryCloud::new());
    let run = run(&cloud);
    run.orchestrator(ResourceKind::Project)
        .create(&spec("kind: project\nproject: test-acc-pr-1\n"))
        .await
        .unwrap();
    let mut service = run.orchestrator(ResourceKind::Kafka);
    service.create(&spec(KAFKA)).await.unwrap();

    let renamed = spec(&KAFKA.replace("test-acc-sr-1", "test-acc-sr-2"));
    let err = service.update(&renamed).await.unwrap_err();
    match &err {
        CloudError::RequiresReplacement { fields, .. } => {
            assert_eq!(fields, &vec!["service_name".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cloud.calls(Operation::Update), 0);

    let state = service.replace(&renamed).await.unwrap();
    assert_eq!(state.identity, Identity::kafka("test-acc-pr-1", "test-acc-sr-2"));
    assert!(
        cloud
            .snapshot(&Identity::kafka("test-acc-pr-1", "test-acc-sr-1"))
            .is_none()
    );
}

#[tokio::test]
async fn test_creation_tolerates_visibility_lag() {
    let cloud = Arc::new(MemoryCloud::new().with_visibility_lag(2));
    let run = run(&cloud);

    let mut p = run.orchestrator(ResourceKind::Project);
    p.create(&spec("kind: project\nproject: test-acc-pr-1\n"))
        .await
        .unwrap();

    assert_eq!(p.lifecycle(), Lifecycle::Ready);
    assert_eq!(cloud.calls(Operation::Read), 3);
}

#[tokio::test]
async fn test_ensure_is_idempotent() {
    let cloud = Arc::new(MemoryCloud::new());
    let run = run(&cloud);
    let desired = spec("kind: account\nname: test-acc-ac-1\n");

    let first = run
        .orchestrator(ResourceKind::Account)
        .ensure(&desired)
        .await
        .unwrap();
    let second = run
        .orchestrator(ResourceKind::Account)
        .ensure(&desired)
        .await
        .unwrap();

    assert_eq!(first.identity, second.identity);
    assert_eq!(cloud.calls(Operation::Create), 1);
    assert_eq!(cloud.calls(Operation::Update), 0);
}

#[tokio::test]
async fn test_cancel_stops_polling_and_keeps_object() {
    let cloud = Arc::new(MemoryCloud::new().with_settle_reads(1_000));
    let (handle, token) = CancelHandle::new();
    let run = run(&cloud).with_cancel(token);
    run.orchestrator(ResourceKind::Project)
        .create(&spec("kind: project\nproject: test-acc-pr-1\n"))
        .await
        .unwrap();
    let reads_before = cloud.calls(Operation::Read);

    let mut service = run.orchestrator(ResourceKind::Kafka);
    let task = tokio::spawn(async move {
        let result = service.create(&spec(KAFKA)).await;
        (service, result)
    });
    while cloud.calls(Operation::Read) < reads_before + 3 {
        tokio::task::yield_now().await;
    }
    handle.cancel();

    let (service, result) = task.await.unwrap();
    assert!(matches!(result, Err(CloudError::Canceled { .. })));
    assert_eq!(service.lifecycle(), Lifecycle::Provisioning);

    let reads_after = cloud.calls(Operation::Read);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(cloud.calls(Operation::Read), reads_after);
    assert!(
        cloud
            .snapshot(&Identity::kafka("test-acc-pr-1", "test-acc-sr-1"))
            .is_some()
    );
}

#[tokio::test]
async fn test_deadline_surfaces_timeout() {
    let cloud = Arc::new(MemoryCloud::new().with_settle_reads(1_000));
    let run = run(&cloud);
    run.orchestrator(ResourceKind::Project)
        .create(&spec("kind: project\nproject: test-acc-pr-1\n"))
        .await
        .unwrap();

    let mut service = run.orchestrator(ResourceKind::Kafka);
    let err = service.create(&spec(KAFKA)).await.unwrap_err();
    match err {
        CloudError::Timeout { last_state, .. } => assert_eq!(last_state, "REBUILDING"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(service.lifecycle(), Lifecycle::Failed);
}

#[tokio::test]
async fn test_retried_create_that_landed_succeeds() {
    let cloud = Arc::new(MemoryCloud::new());
    let client = Arc::new(RetryingClient::new(cloud.clone(), RetryConfig::immediate(3)));
    let run = RunContext::new(client);

    cloud.fail_after_next(
        Operation::Create,
        CloudError::Transient {
            kind: ResourceKind::Project,
            identity: "test-acc-pr-1".to_string(),
            operation: Operation::Create,
            message: "connection reset".to_string(),
        },
    );
    let mut p = run.orchestrator(ResourceKind::Project);
    p.create(&spec("kind: project\nproject: test-acc-pr-1\n"))
        .await
        .unwrap();

    assert_eq!(p.lifecycle(), Lifecycle::Ready);
    assert_eq!(cloud.calls(Operation::Create), 2);
}

#[tokio::test]
async fn test_sweep_cleans_a_whole_tree() {
    let cloud = Arc::new(MemoryCloud::new());
    let run = run(&cloud);
    let a1 = account(&run, "test-acc-ac-1").await;
    run.orchestrator(ResourceKind::Project)
        .create(&spec(&project("test-acc-pr-1", &a1)))
        .await
        .unwrap();
    run.orchestrator(ResourceKind::Kafka)
        .create(&spec(KAFKA))
        .await
        .unwrap();
    for yaml in [
        "kind: kafka_topic\nproject: test-acc-pr-1\nservice_name: test-acc-sr-1\ntopic_name: test-acc-tp-1\npartitions: 3\nreplication: 2\n",
        "kind: service_user\nproject: test-acc-pr-1\nservice_name: test-acc-sr-1\nusername: test-acc-us-1\n",
    ] {
        let desired = spec(yaml);
        run.orchestrator(desired.kind())
            .create(&desired)
            .await
            .unwrap();
    }
    // the first delete lands but the response is a 404
    cloud.fail_after_next(
        Operation::Delete,
        CloudError::not_found(ResourceKind::KafkaTopic, "test-acc-tp-1"),
    );

    let result = sweep_all(&run, "test-acc-").await;

    assert!(result.is_success(), "{:?}", result.failed);
    assert!(cloud.is_empty());
}
