//! Composite identities of remote objects

use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};

/// Stable key of a remote object, rendered as `/`-joined parts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Account {
        account_id: String,
    },
    AccountTeam {
        account_id: String,
        team_id: String,
    },
    AccountTeamMember {
        account_id: String,
        team_id: String,
        user_email: String,
    },
    Project {
        project: String,
    },
    Kafka {
        project: String,
        service_name: String,
    },
    KafkaTopic {
        project: String,
        service_name: String,
        topic_name: String,
    },
    ServiceUser {
        project: String,
        service_name: String,
        username: String,
    },
}

impl Identity {
    pub fn account(account_id: impl Into<String>) -> Self {
        Identity::Account {
            account_id: account_id.into(),
        }
    }

    pub fn project(project: impl Into<String>) -> Self {
        Identity::Project {
            project: project.into(),
        }
    }

    pub fn kafka(project: impl Into<String>, service_name: impl Into<String>) -> Self {
        Identity::Kafka {
            project: project.into(),
            service_name: service_name.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Identity::Account { .. } => ResourceKind::Account,
            Identity::AccountTeam { .. } => ResourceKind::AccountTeam,
            Identity::AccountTeamMember { .. } => ResourceKind::AccountTeamMember,
            Identity::Project { .. } => ResourceKind::Project,
            Identity::Kafka { .. } => ResourceKind::Kafka,
            Identity::KafkaTopic { .. } => ResourceKind::KafkaTopic,
            Identity::ServiceUser { .. } => ResourceKind::ServiceUser,
        }
    }

    pub fn parts(&self) -> Vec<&str> {
        match self {
            Identity::Account { account_id } => vec![account_id.as_str()],
            Identity::AccountTeam {
                account_id,
                team_id,
            } => vec![account_id.as_str(), team_id.as_str()],
            Identity::AccountTeamMember {
                account_id,
                team_id,
                user_email,
            } => vec![account_id.as_str(), team_id.as_str(), user_email.as_str()],
            Identity::Project { project } => vec![project.as_str()],
            Identity::Kafka {
                project,
                service_name,
            } => vec![project.as_str(), service_name.as_str()],
            Identity::KafkaTopic {
                project,
                service_name,
                topic_name: leaf,
            }
            | Identity::ServiceUser {
                project,
                service_name,
                username: leaf,
            } => vec![project.as_str(), service_name.as_str(), leaf.as_str()],
        }
    }

    /// Innermost part (the object's own name or id)
    pub fn leaf(&self) -> &str {
        self.parts().last().copied().unwrap_or_default()
    }

    /// Parse the `/`-joined form for the given kind
    pub fn parse(kind: ResourceKind, value: &str) -> Result<Self> {
        let parts: Vec<String> = value.split('/').map(str::to_string).collect();
        let expected = match kind {
            ResourceKind::Account | ResourceKind::Project => 1,
            ResourceKind::AccountTeam | ResourceKind::Kafka => 2,
            _ => 3,
        };
        if parts.len() != expected || parts.iter().any(|p| p.is_empty()) {
            return Err(CloudError::InvalidConfig(format!(
                "invalid {kind} id '{value}': expected {expected} non-empty '/'-separated part(s)"
            )));
        }

        let mut it = parts.into_iter();
        let mut next = || it.next().unwrap_or_default();
        Ok(match kind {
            ResourceKind::Account => Identity::Account { account_id: next() },
            ResourceKind::AccountTeam => Identity::AccountTeam {
                account_id: next(),
                team_id: next(),
            },
            ResourceKind::AccountTeamMember => Identity::AccountTeamMember {
                account_id: next(),
                team_id: next(),
                user_email: next(),
            },
            ResourceKind::Project => Identity::Project { project: next() },
            ResourceKind::Kafka => Identity::Kafka {
                project: next(),
                service_name: next(),
            },
            ResourceKind::KafkaTopic => Identity::KafkaTopic {
                project: next(),
                service_name: next(),
                topic_name: next(),
            },
            ResourceKind::ServiceUser => Identity::ServiceUser {
                project: next(),
                service_name: next(),
                username: next(),
            },
        })
    }

    /// Statically known parent; a project's account is an attribute, not part of its key
    pub fn parent(&self) -> Option<Identity> {
        match self {
            Identity::Account { .. } | Identity::Project { .. } => None,
            Identity::AccountTeam { account_id, .. } => Some(Identity::account(account_id)),
            Identity::AccountTeamMember {
                account_id,
                team_id,
                ..
            } => Some(Identity::AccountTeam {
                account_id: account_id.clone(),
                team_id: team_id.clone(),
            }),
            Identity::Kafka { project, .. } => Some(Identity::project(project)),
            Identity::KafkaTopic {
                project,
                service_name,
                ..
            }
            | Identity::ServiceUser {
                project,
                service_name,
                ..
            } => Some(Identity::kafka(project, service_name)),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.parts().join("/"))
    }
}
