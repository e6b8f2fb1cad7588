//! Observed state of remote objects
//!
//! A [`RemoteState`] is what a read returns. It is replaced wholesale after
//! every successful read and never patched locally.

use crate::error::Result;
use crate::field::Field;
use crate::identity::Identity;
use crate::kind::ResourceKind;
use crate::spec::{
    AccountSpec, AccountTeamMemberSpec, AccountTeamSpec, KafkaSpec, KafkaTopicSpec,
    KafkaUserConfig, ProjectSpec, ResourceSpec, ServiceUserSpec, TopicConfig,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote-reported status of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Rebuilding,
    Rebalancing,
    Running,
    Poweroff,
    Active,
    Configuring,
    Deleting,
    #[serde(other)]
    Unknown,
}

impl RemoteStatus {
    /// Parse the remote's status string; anything unrecognised is `Unknown`
    pub fn from_wire(value: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(value.to_ascii_uppercase()))
            .unwrap_or(RemoteStatus::Unknown)
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteStatus::Rebuilding => write!(f, "REBUILDING"),
            RemoteStatus::Rebalancing => write!(f, "REBALANCING"),
            RemoteStatus::Running => write!(f, "RUNNING"),
            RemoteStatus::Poweroff => write!(f, "POWEROFF"),
            RemoteStatus::Active => write!(f, "ACTIVE"),
            RemoteStatus::Configuring => write!(f, "CONFIGURING"),
            RemoteStatus::Deleting => write!(f, "DELETING"),
            RemoteStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountState {
    pub account_id: String,
    pub name: String,
    pub tenant_id: String,
    pub owner_team_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountTeamState {
    pub account_id: String,
    pub team_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountTeamMemberState {
    pub account_id: String,
    pub team_id: String,
    pub user_email: String,
    /// `false` while the invitation is pending
    pub accepted: bool,
    pub invited_by_user_email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectState {
    pub project: String,
    /// Empty when the project is not associated with an account
    pub account_id: String,
    pub billing_group: String,
    pub technical_emails: Vec<String>,
    pub default_cloud: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaState {
    pub project: String,
    pub service_name: String,
    pub service_type: String,
    pub plan: String,
    pub cloud_name: String,
    pub project_vpc_id: String,
    pub maintenance_window_dow: String,
    pub maintenance_window_time: String,
    pub termination_protection: bool,
    pub service_uri: String,
    pub service_host: String,
    pub service_port: u16,
    pub kafka_user_config: Option<KafkaUserConfig>,
    pub kafka: Option<KafkaConnection>,
}

/// Connection details published once the service is up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConnection {
    pub access_cert: String,
    pub access_key: String,
    pub connect_uri: String,
    pub rest_uri: String,
    pub schema_registry_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaTopicState {
    pub project: String,
    pub service_name: String,
    pub topic_name: String,
    pub partitions: u32,
    pub replication: u32,
    pub config: Option<TopicConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceUserState {
    pub project: String,
    pub service_name: String,
    pub username: String,
    pub password: String,
    #[serde(rename = "type")]
    pub user_type: String,
    pub access_cert: String,
    pub access_key: String,
}

/// Kind-specific observed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observed {
    Account(AccountState),
    AccountTeam(AccountTeamState),
    AccountTeamMember(AccountTeamMemberState),
    Project(ProjectState),
    Kafka(KafkaState),
    KafkaTopic(KafkaTopicState),
    ServiceUser(ServiceUserState),
}

/// Last observed state of one remote object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    pub identity: Identity,
    pub status: Option<RemoteStatus>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub observed: Observed,
}

fn optional(value: &str) -> Field<String> {
    if value.is_empty() {
        Field::Unset
    } else {
        Field::Set(value.to_string())
    }
}

impl RemoteState {
    pub fn new(identity: Identity, observed: Observed) -> Self {
        Self {
            identity,
            status: None,
            create_time: None,
            update_time: None,
            observed,
        }
    }

    pub fn with_status(mut self, status: RemoteStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.identity.kind()
    }

    /// Observed attributes as JSON, without the kind tag
    pub fn observed_attributes(&self) -> Result<serde_json::Value> {
        let value = match &self.observed {
            Observed::Account(s) => serde_json::to_value(s)?,
            Observed::AccountTeam(s) => serde_json::to_value(s)?,
            Observed::AccountTeamMember(s) => serde_json::to_value(s)?,
            Observed::Project(s) => serde_json::to_value(s)?,
            Observed::Kafka(s) => serde_json::to_value(s)?,
            Observed::KafkaTopic(s) => serde_json::to_value(s)?,
            Observed::ServiceUser(s) => serde_json::to_value(s)?,
        };
        Ok(value)
    }

    /// The object's own name, matching [`ResourceSpec::name`]
    pub fn name(&self) -> &str {
        match &self.observed {
            Observed::Account(s) => &s.name,
            Observed::AccountTeam(s) => &s.name,
            Observed::AccountTeamMember(s) => &s.user_email,
            Observed::Project(s) => &s.project,
            Observed::Kafka(s) => &s.service_name,
            Observed::KafkaTopic(s) => &s.topic_name,
            Observed::ServiceUser(s) => &s.username,
        }
    }

    pub fn termination_protection(&self) -> bool {
        matches!(&self.observed, Observed::Kafka(s) if s.termination_protection)
    }

    /// Owning account of a project, if associated
    pub fn account_id(&self) -> Option<&str> {
        match &self.observed {
            Observed::Project(s) if !s.account_id.is_empty() => Some(s.account_id.as_str()),
            _ => None,
        }
    }

    /// Current parent, including a project's dynamic account association
    pub fn parent(&self) -> Option<Identity> {
        match self.kind() {
            ResourceKind::Project => self.account_id().map(Identity::account),
            _ => self.identity.parent(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().behavior().is_terminal(self.status)
    }

    pub fn status_label(&self) -> String {
        self.status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    /// Spec that reproduces this object exactly
    ///
    /// Empty observed values become unset fields. Values that only exist
    /// server side (billing group inheritance, passwords) are left unset so
    /// the remote keeps managing them.
    pub fn to_spec(&self) -> ResourceSpec {
        match &self.observed {
            Observed::Account(s) => ResourceSpec::Account(AccountSpec {
                name: s.name.clone(),
            }),
            Observed::AccountTeam(s) => ResourceSpec::AccountTeam(AccountTeamSpec {
                account_id: s.account_id.clone(),
                name: s.name.clone(),
            }),
            Observed::AccountTeamMember(s) => {
                ResourceSpec::AccountTeamMember(AccountTeamMemberSpec {
                    account_id: s.account_id.clone(),
                    team_id: s.team_id.clone(),
                    user_email: s.user_email.clone(),
                })
            }
            Observed::Project(s) => ResourceSpec::Project(ProjectSpec {
                project: s.project.clone(),
                account_id: optional(&s.account_id),
                billing_group: Field::Unset,
                technical_emails: if s.technical_emails.is_empty() {
                    Field::Unset
                } else {
                    Field::Set(s.technical_emails.clone())
                },
                default_cloud: optional(&s.default_cloud),
            }),
            Observed::Kafka(s) => ResourceSpec::Kafka(KafkaSpec {
                project: s.project.clone(),
                service_name: s.service_name.clone(),
                plan: s.plan.clone(),
                cloud_name: optional(&s.cloud_name),
                project_vpc_id: optional(&s.project_vpc_id),
                maintenance_window_dow: optional(&s.maintenance_window_dow),
                maintenance_window_time: optional(&s.maintenance_window_time),
                termination_protection: Field::Set(s.termination_protection),
                kafka_user_config: s.kafka_user_config.clone(),
            }),
            Observed::KafkaTopic(s) => ResourceSpec::KafkaTopic(KafkaTopicSpec {
                project: s.project.clone(),
                service_name: s.service_name.clone(),
                topic_name: s.topic_name.clone(),
                partitions: s.partitions,
                replication: s.replication,
                config: s.config.clone(),
            }),
            Observed::ServiceUser(s) => ResourceSpec::ServiceUser(ServiceUserSpec {
                project: s.project.clone(),
                service_name: s.service_name.clone(),
                username: s.username.clone(),
                password: Field::Unset,
            }),
        }
    }
}
