//! Desired configuration, one typed record per resource kind

use crate::error::{CloudError, Operation, Result};
use crate::field::Field;
use crate::identity::Identity;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Desired state of one managed object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Account(AccountSpec),
    AccountTeam(AccountTeamSpec),
    AccountTeamMember(AccountTeamMemberSpec),
    Project(ProjectSpec),
    Kafka(KafkaSpec),
    KafkaTopic(KafkaTopicSpec),
    ServiceUser(ServiceUserSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTeamSpec {
    pub account_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTeamMemberSpec {
    pub account_id: String,
    pub team_id: String,
    pub user_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub project: String,
    /// Owning account; `null` dissociates the project
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub account_id: Field<String>,
    /// Defaults to the owning account's billing group when unset
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub billing_group: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub technical_emails: Field<Vec<String>>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub default_cloud: Field<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KafkaSpec {
    pub project: String,
    pub service_name: String,
    pub plan: String,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub cloud_name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub project_vpc_id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub maintenance_window_dow: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub maintenance_window_time: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub termination_protection: Field<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka_user_config: Option<KafkaUserConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KafkaUserConfig {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub kafka_version: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub kafka_rest: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub kafka_connect: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub schema_registry: Field<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<KafkaSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_access: Option<PublicAccess>,
}

/// Broker settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KafkaSettings {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub group_max_session_timeout_ms: Field<u64>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub log_retention_bytes: Field<i64>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub auto_create_topics_enable: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub num_partitions: Field<u32>,
}

/// Which endpoints are reachable from the public internet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicAccess {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub kafka: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub kafka_connect: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub kafka_rest: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub prometheus: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub schema_registry: Field<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KafkaTopicSpec {
    pub project: String,
    pub service_name: String,
    pub topic_name: String,
    pub partitions: u32,
    pub replication: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TopicConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub retention_ms: Field<i64>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub cleanup_policy: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub min_insync_replicas: Field<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUserSpec {
    pub project: String,
    pub service_name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub password: Field<String>,
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Account(_) => ResourceKind::Account,
            ResourceSpec::AccountTeam(_) => ResourceKind::AccountTeam,
            ResourceSpec::AccountTeamMember(_) => ResourceKind::AccountTeamMember,
            ResourceSpec::Project(_) => ResourceKind::Project,
            ResourceSpec::Kafka(_) => ResourceKind::Kafka,
            ResourceSpec::KafkaTopic(_) => ResourceKind::KafkaTopic,
            ResourceSpec::ServiceUser(_) => ResourceKind::ServiceUser,
        }
    }

    /// Identity derivable from the declaration alone; `None` for server-assigned kinds
    pub fn identity(&self) -> Option<Identity> {
        match self {
            ResourceSpec::Account(_) | ResourceSpec::AccountTeam(_) => None,
            ResourceSpec::AccountTeamMember(s) => Some(Identity::AccountTeamMember {
                account_id: s.account_id.clone(),
                team_id: s.team_id.clone(),
                user_email: s.user_email.clone(),
            }),
            ResourceSpec::Project(s) => Some(Identity::project(&s.project)),
            ResourceSpec::Kafka(s) => Some(Identity::kafka(&s.project, &s.service_name)),
            ResourceSpec::KafkaTopic(s) => Some(Identity::KafkaTopic {
                project: s.project.clone(),
                service_name: s.service_name.clone(),
                topic_name: s.topic_name.clone(),
            }),
            ResourceSpec::ServiceUser(s) => Some(Identity::ServiceUser {
                project: s.project.clone(),
                service_name: s.service_name.clone(),
                username: s.username.clone(),
            }),
        }
    }

    /// The object's own name, as matched by name lookups and sweeps
    pub fn name(&self) -> &str {
        match self {
            ResourceSpec::Account(s) => &s.name,
            ResourceSpec::AccountTeam(s) => &s.name,
            ResourceSpec::AccountTeamMember(s) => &s.user_email,
            ResourceSpec::Project(s) => &s.project,
            ResourceSpec::Kafka(s) => &s.service_name,
            ResourceSpec::KafkaTopic(s) => &s.topic_name,
            ResourceSpec::ServiceUser(s) => &s.username,
        }
    }

    /// Label used in errors and logs before an identity is known
    pub fn display_name(&self) -> String {
        match (self, self.identity()) {
            (_, Some(identity)) => identity.to_string(),
            (ResourceSpec::AccountTeam(s), None) => format!("{}/{}", s.account_id, s.name),
            (spec, None) => spec.name().to_string(),
        }
    }

    /// Parent object that must exist before this one can be created
    pub fn parent(&self) -> Option<Identity> {
        match self {
            ResourceSpec::Account(_) => None,
            ResourceSpec::AccountTeam(s) => Some(Identity::account(&s.account_id)),
            ResourceSpec::Project(s) => s.account_id.as_set().map(Identity::account),
            _ => self.identity().and_then(|id| id.parent()),
        }
    }

    /// Desired attributes as JSON, without the kind tag
    ///
    /// Unset fields are absent, cleared fields are `null`.
    pub fn desired_attributes(&self) -> Result<serde_json::Value> {
        let value = match self {
            ResourceSpec::Account(s) => serde_json::to_value(s)?,
            ResourceSpec::AccountTeam(s) => serde_json::to_value(s)?,
            ResourceSpec::AccountTeamMember(s) => serde_json::to_value(s)?,
            ResourceSpec::Project(s) => serde_json::to_value(s)?,
            ResourceSpec::Kafka(s) => serde_json::to_value(s)?,
            ResourceSpec::KafkaTopic(s) => serde_json::to_value(s)?,
            ResourceSpec::ServiceUser(s) => serde_json::to_value(s)?,
        };
        Ok(value)
    }

    /// Local checks run before any remote call
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind();
        let label = self.display_name();
        let invalid =
            |message: String| CloudError::fatal(kind, &label, Operation::Validate, message);

        let names: Vec<(&str, &str)> = match self {
            ResourceSpec::Account(s) => vec![("name", s.name.as_str())],
            ResourceSpec::AccountTeam(s) => {
                vec![("account_id", s.account_id.as_str()), ("name", s.name.as_str())]
            }
            ResourceSpec::AccountTeamMember(s) => vec![
                ("account_id", s.account_id.as_str()),
                ("team_id", s.team_id.as_str()),
                ("user_email", s.user_email.as_str()),
            ],
            ResourceSpec::Project(s) => vec![("project", s.project.as_str())],
            ResourceSpec::Kafka(s) => vec![
                ("project", s.project.as_str()),
                ("service_name", s.service_name.as_str()),
                ("plan", s.plan.as_str()),
            ],
            ResourceSpec::KafkaTopic(s) => vec![
                ("project", s.project.as_str()),
                ("service_name", s.service_name.as_str()),
                ("topic_name", s.topic_name.as_str()),
            ],
            ResourceSpec::ServiceUser(s) => vec![
                ("project", s.project.as_str()),
                ("service_name", s.service_name.as_str()),
                ("username", s.username.as_str()),
            ],
        };
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(invalid(format!("{field} must not be empty")));
            }
            if value.contains('/') {
                return Err(invalid(format!("{field} must not contain '/'")));
            }
        }

        match self {
            ResourceSpec::AccountTeamMember(s) if !s.user_email.contains('@') => {
                Err(invalid(format!("'{}' is not an email address", s.user_email)))
            }
            ResourceSpec::Project(s) => match s.technical_emails.as_set() {
                Some(emails) => match emails.iter().find(|e| !e.contains('@')) {
                    Some(bad) => Err(invalid(format!("'{bad}' is not an email address"))),
                    None => Ok(()),
                },
                None => Ok(()),
            },
            ResourceSpec::Kafka(s) => {
                if let Some(dow) = s.maintenance_window_dow.as_set() {
                    if !WEEKDAYS.contains(&dow.as_str()) {
                        return Err(invalid(format!(
                            "maintenance_window_dow '{dow}' is not a day of the week"
                        )));
                    }
                }
                if let Some(time) = s.maintenance_window_time.as_set() {
                    if chrono::NaiveTime::parse_from_str(time, "%H:%M:%S").is_err() {
                        return Err(invalid(format!(
                            "maintenance_window_time '{time}' must be HH:MM:SS"
                        )));
                    }
                }
                Ok(())
            }
            ResourceSpec::KafkaTopic(s) if s.partitions == 0 => {
                Err(invalid("partitions must be at least 1".to_string()))
            }
            ResourceSpec::KafkaTopic(s) if s.replication == 0 => {
                Err(invalid("replication must be at least 1".to_string()))
            }
            _ => Ok(()),
        }
    }
}
