//! Aiven API payloads and their mapping onto reconflow types

use chrono::{DateTime, Utc};
use reconflow_cloud::spec::{
    KafkaSpec, KafkaTopicSpec, KafkaUserConfig, ProjectSpec, TopicConfig,
};
use reconflow_cloud::state::{
    AccountState, AccountTeamMemberState, AccountTeamState, KafkaConnection, KafkaState,
    KafkaTopicState, Observed, ProjectState, ServiceUserState,
};
use reconflow_cloud::{Field, Identity, RemoteState, RemoteStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

// ============ Responses ============

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,
}

impl ApiErrorBody {
    pub fn describe(&self) -> String {
        if !self.message.is_empty() {
            return self.message.clone();
        }
        self.errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountEnvelope {
    pub account: AccountWire,
}

#[derive(Debug, Deserialize)]
pub struct AccountList {
    #[serde(default)]
    pub accounts: Vec<AccountWire>,
}

#[derive(Debug, Deserialize)]
pub struct AccountWire {
    pub account_id: String,
    pub account_name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub owner_team_id: String,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl AccountWire {
    pub fn into_state(self) -> RemoteState {
        let mut state = RemoteState::new(
            Identity::account(&self.account_id),
            Observed::Account(AccountState {
                account_id: self.account_id,
                name: self.account_name,
                tenant_id: self.tenant_id,
                owner_team_id: self.owner_team_id,
            }),
        );
        state.create_time = self.create_time;
        state.update_time = self.update_time;
        state
    }
}

#[derive(Debug, Deserialize)]
pub struct TeamEnvelope {
    pub team: TeamWire,
}

#[derive(Debug, Deserialize)]
pub struct TeamList {
    #[serde(default)]
    pub teams: Vec<TeamWire>,
}

#[derive(Debug, Deserialize)]
pub struct TeamWire {
    pub account_id: String,
    pub team_id: String,
    pub team_name: String,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl TeamWire {
    pub fn into_state(self) -> RemoteState {
        let mut state = RemoteState::new(
            Identity::AccountTeam {
                account_id: self.account_id.clone(),
                team_id: self.team_id.clone(),
            },
            Observed::AccountTeam(AccountTeamState {
                account_id: self.account_id,
                team_id: self.team_id,
                name: self.team_name,
            }),
        );
        state.create_time = self.create_time;
        state.update_time = self.update_time;
        state
    }
}

#[derive(Debug, Deserialize)]
pub struct MemberList {
    #[serde(default)]
    pub members: Vec<MemberWire>,
}

#[derive(Debug, Deserialize)]
pub struct MemberWire {
    pub user_id: String,
    pub user_email: String,
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct InviteList {
    #[serde(default)]
    pub account_invites: Vec<InviteWire>,
}

#[derive(Debug, Deserialize)]
pub struct InviteWire {
    pub user_email: String,
    #[serde(default)]
    pub invited_by_user_email: String,
    pub create_time: Option<DateTime<Utc>>,
}

/// A team member, either accepted or still invited
pub fn member_state(
    account_id: &str,
    team_id: &str,
    user_email: &str,
    accepted: bool,
    invited_by_user_email: String,
    create_time: Option<DateTime<Utc>>,
) -> RemoteState {
    let mut state = RemoteState::new(
        Identity::AccountTeamMember {
            account_id: account_id.to_string(),
            team_id: team_id.to_string(),
            user_email: user_email.to_string(),
        },
        Observed::AccountTeamMember(AccountTeamMemberState {
            account_id: account_id.to_string(),
            team_id: team_id.to_string(),
            user_email: user_email.to_string(),
            accepted,
            invited_by_user_email,
        }),
    );
    state.create_time = create_time;
    state
}

#[derive(Debug, Deserialize)]
pub struct ProjectEnvelope {
    pub project: ProjectWire,
}

#[derive(Debug, Deserialize)]
pub struct ProjectList {
    #[serde(default)]
    pub projects: Vec<ProjectWire>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectWire {
    pub project_name: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub billing_group_id: Option<String>,
    #[serde(default)]
    pub tech_emails: Vec<EmailWire>,
    #[serde(default)]
    pub default_cloud: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailWire {
    pub email: String,
}

impl ProjectWire {
    pub fn into_state(self) -> RemoteState {
        RemoteState::new(
            Identity::project(&self.project_name),
            Observed::Project(ProjectState {
                project: self.project_name,
                account_id: self.account_id.unwrap_or_default(),
                billing_group: self.billing_group_id.unwrap_or_default(),
                technical_emails: self.tech_emails.into_iter().map(|e| e.email).collect(),
                default_cloud: self.default_cloud,
            }),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceEnvelope {
    pub service: ServiceWire,
}

#[derive(Debug, Deserialize)]
pub struct ServiceList {
    #[serde(default)]
    pub services: Vec<ServiceWire>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceWire {
    pub service_name: String,
    pub service_type: String,
    pub plan: String,
    #[serde(default)]
    pub cloud_name: String,
    #[serde(default)]
    pub project_vpc_id: Option<String>,
    pub state: String,
    #[serde(default)]
    pub maintenance: Option<MaintenanceWire>,
    #[serde(default)]
    pub termination_protection: bool,
    #[serde(default)]
    pub user_config: Value,
    #[serde(default)]
    pub service_uri: String,
    #[serde(default)]
    pub service_uri_params: BTreeMap<String, String>,
    #[serde(default)]
    pub connection_info: Value,
    #[serde(default)]
    pub users: Vec<ServiceUserWire>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWire {
    pub dow: String,
    pub time: String,
}

impl ServiceWire {
    pub fn into_state(self, project: &str) -> serde_json::Result<RemoteState> {
        let user_config: Option<KafkaUserConfig> = match self.user_config {
            Value::Null => None,
            Value::Object(ref map) if map.is_empty() => None,
            value => Some(serde_json::from_value(value)?),
        };
        let text = |key: &str| {
            self.connection_info
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let connection = KafkaConnection {
            access_cert: text("kafka_access_cert"),
            access_key: text("kafka_access_key"),
            connect_uri: text("kafka_connect_uri"),
            rest_uri: text("kafka_rest_uri"),
            schema_registry_uri: text("schema_registry_uri"),
        };
        let (dow, time) = self
            .maintenance
            .map(|m| (m.dow, m.time))
            .unwrap_or_default();

        let mut state = RemoteState::new(
            Identity::kafka(project, &self.service_name),
            Observed::Kafka(KafkaState {
                project: project.to_string(),
                service_name: self.service_name,
                service_type: self.service_type,
                plan: self.plan,
                cloud_name: self.cloud_name,
                project_vpc_id: self.project_vpc_id.unwrap_or_default(),
                maintenance_window_dow: dow,
                maintenance_window_time: time,
                termination_protection: self.termination_protection,
                service_uri: self.service_uri,
                service_host: self
                    .service_uri_params
                    .get("host")
                    .cloned()
                    .unwrap_or_default(),
                service_port: self
                    .service_uri_params
                    .get("port")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or_default(),
                kafka_user_config: user_config,
                kafka: Some(connection),
            }),
        )
        .with_status(RemoteStatus::from_wire(&self.state));
        state.create_time = self.create_time;
        state.update_time = self.update_time;
        Ok(state)
    }
}

#[derive(Debug, Deserialize)]
pub struct TopicEnvelope {
    pub topic: TopicWire,
}

#[derive(Debug, Deserialize)]
pub struct TopicList {
    #[serde(default)]
    pub topics: Vec<TopicWire>,
}

#[derive(Debug, Deserialize)]
pub struct TopicWire {
    pub topic_name: String,
    /// Partition details on a single topic, a count in listings
    #[serde(default)]
    pub partitions: Value,
    #[serde(default)]
    pub replication: u32,
    #[serde(default)]
    pub state: String,
    /// Entries are `{"value": ...}` on a single topic
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl TopicWire {
    pub fn into_state(self, project: &str, service_name: &str) -> RemoteState {
        let partitions = match &self.partitions {
            Value::Array(items) => u32::try_from(items.len()).unwrap_or(u32::MAX),
            other => other
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or_default(),
        };
        let setting = |key: &str| {
            self.config.get(key).map(|entry| match entry.get("value") {
                Some(value) => value.clone(),
                None => entry.clone(),
            })
        };
        let config = TopicConfig {
            retention_ms: setting("retention_ms").and_then(|v| v.as_i64()).into(),
            cleanup_policy: setting("cleanup_policy")
                .and_then(|v| v.as_str().map(str::to_string))
                .into(),
            min_insync_replicas: setting("min_insync_replicas")
                .and_then(|v| v.as_u64())
                .and_then(|n| u32::try_from(n).ok())
                .into(),
        };
        let config = (config != TopicConfig::default()).then_some(config);

        let mut state = RemoteState::new(
            Identity::KafkaTopic {
                project: project.to_string(),
                service_name: service_name.to_string(),
                topic_name: self.topic_name.clone(),
            },
            Observed::KafkaTopic(KafkaTopicState {
                project: project.to_string(),
                service_name: service_name.to_string(),
                topic_name: self.topic_name,
                partitions,
                replication: self.replication,
                config,
            }),
        );
        if !self.state.is_empty() {
            state.status = Some(RemoteStatus::from_wire(&self.state));
        }
        state
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceUserEnvelope {
    pub user: ServiceUserWire,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceUserWire {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "type")]
    pub user_type: String,
    #[serde(default)]
    pub access_cert: String,
    #[serde(default)]
    pub access_key: String,
}

impl ServiceUserWire {
    pub fn into_state(self, project: &str, service_name: &str) -> RemoteState {
        RemoteState::new(
            Identity::ServiceUser {
                project: project.to_string(),
                service_name: service_name.to_string(),
                username: self.username.clone(),
            },
            Observed::ServiceUser(ServiceUserState {
                project: project.to_string(),
                service_name: service_name.to_string(),
                username: self.username,
                password: self.password,
                user_type: self.user_type,
                access_cert: self.access_cert,
                access_key: self.access_key,
            }),
        )
    }
}

// ============ Requests ============

fn set_text(body: &mut Map<String, Value>, key: &str, field: &Field<String>) {
    match field {
        Field::Set(value) => {
            body.insert(key.to_string(), json!(value));
        }
        Field::Clear => {
            body.insert(key.to_string(), Value::Null);
        }
        Field::Unset => {}
    }
}

fn emails(addresses: &[String]) -> Value {
    json!(
        addresses
            .iter()
            .map(|email| EmailWire {
                email: email.clone()
            })
            .collect::<Vec<_>>()
    )
}

pub fn create_project(spec: &ProjectSpec) -> Value {
    let mut body = Map::new();
    body.insert("project".to_string(), json!(spec.project));
    set_text(&mut body, "account_id", &spec.account_id);
    set_text(&mut body, "billing_group_id", &spec.billing_group);
    set_text(&mut body, "cloud", &spec.default_cloud);
    if let Field::Set(addresses) = &spec.technical_emails {
        body.insert("tech_emails".to_string(), emails(addresses));
    }
    Value::Object(body)
}

pub fn create_service(spec: &KafkaSpec) -> serde_json::Result<Value> {
    let mut body = Map::new();
    body.insert("service_name".to_string(), json!(spec.service_name));
    body.insert("service_type".to_string(), json!("kafka"));
    body.insert("plan".to_string(), json!(spec.plan));
    set_text(&mut body, "cloud", &spec.cloud_name);
    set_text(&mut body, "project_vpc_id", &spec.project_vpc_id);
    if let (Field::Set(dow), Field::Set(time)) =
        (&spec.maintenance_window_dow, &spec.maintenance_window_time)
    {
        body.insert("maintenance".to_string(), json!({ "dow": dow, "time": time }));
    }
    if let Field::Set(protected) = spec.termination_protection {
        body.insert("termination_protection".to_string(), json!(protected));
    }
    if let Some(user_config) = &spec.kafka_user_config {
        body.insert("user_config".to_string(), serde_json::to_value(user_config)?);
    }
    Ok(Value::Object(body))
}

pub fn create_topic(spec: &KafkaTopicSpec) -> serde_json::Result<Value> {
    let mut body = json!({
        "topic_name": spec.topic_name,
        "partitions": spec.partitions,
        "replication": spec.replication,
    });
    if let Some(config) = &spec.config {
        body["config"] = serde_json::to_value(config)?;
    }
    Ok(body)
}

/// Project update body from engine attribute changes
pub fn project_update(changes: &Value) -> Value {
    let mut body = Map::new();
    for (key, value) in changes.as_object().into_iter().flatten() {
        match key.as_str() {
            // an empty account id dissociates
            "account_id" => {
                body.insert(key.clone(), json!(value.as_str().unwrap_or_default()));
            }
            "billing_group" => {
                body.insert("billing_group_id".to_string(), value.clone());
            }
            "default_cloud" => {
                body.insert("cloud".to_string(), value.clone());
            }
            "technical_emails" => {
                let addresses: Vec<String> = value
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                body.insert("tech_emails".to_string(), emails(&addresses));
            }
            _ => {
                body.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(body)
}

/// Service update body; maintenance needs both halves of the window
pub fn service_update(changes: &Value, observed: Option<&KafkaState>) -> Value {
    let mut body = Map::new();
    let mut maintenance = observed
        .map(|s| json!({ "dow": s.maintenance_window_dow, "time": s.maintenance_window_time }))
        .unwrap_or_else(|| json!({}));
    let mut touched_maintenance = false;

    for (key, value) in changes.as_object().into_iter().flatten() {
        match key.as_str() {
            "cloud_name" => {
                body.insert("cloud".to_string(), value.clone());
            }
            "maintenance_window_dow" => {
                maintenance["dow"] = value.clone();
                touched_maintenance = true;
            }
            "maintenance_window_time" => {
                maintenance["time"] = value.clone();
                touched_maintenance = true;
            }
            "kafka_user_config" => {
                body.insert("user_config".to_string(), value.clone());
            }
            _ => {
                body.insert(key.clone(), value.clone());
            }
        }
    }
    if touched_maintenance {
        body.insert("maintenance".to_string(), maintenance);
    }
    Value::Object(body)
}
