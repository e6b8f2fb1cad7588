//! Aiven REST client
//!
//! Implements [`RemoteClient`] against the Aiven v1 API. Every call is a
//! single HTTP request (or a short, fixed sequence for team members and
//! unscoped listings); retries and polling belong to the engine.

use crate::error::{AivenError, Result};
use crate::wire::{
    self, AccountEnvelope, AccountList, ApiErrorBody, InviteList, MemberList, ProjectEnvelope,
    ProjectList, ServiceEnvelope, ServiceList, ServiceUserEnvelope, TeamEnvelope, TeamList,
    TopicEnvelope, TopicList,
};
use async_trait::async_trait;
use reconflow_cloud::state::Observed;
use reconflow_cloud::{
    Field, FieldGroup, FieldGroupUpdate, Identity, ListFilter, Operation,
    RemoteClient, RemoteState, ResourceKind, ResourceSpec,
};
use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.aiven.io/v1";
pub const DEFAULT_TOKEN_ENV: &str = "AIVEN_TOKEN";

/// Connection settings for the Aiven API
#[derive(Debug, Clone)]
pub struct AivenConfig {
    pub api_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl AivenConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Read the API token from the environment variable `token_env`
    pub fn from_env(token_env: &str) -> Result<Self> {
        match std::env::var(token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new(token.trim())),
            _ => Err(AivenError::MissingToken(token_env.to_string())),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Aiven control plane client
pub struct AivenClient {
    http: reqwest::Client,
    config: AivenConfig,
}

impl AivenClient {
    pub fn new(config: AivenConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(AivenError::InvalidConfig("empty API token".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("reconflow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        tracing::debug!(method = %method, url = %url, "Aiven request");

        let mut request = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("aivenv1 {}", self.config.token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.describe())
                .unwrap_or(text);
            return Err(AivenError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = if text.trim().is_empty() { "{}" } else { &text };
        Ok(serde_json::from_str(text)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<()> {
        self.send::<Value>(Method::PUT, path, Some(body)).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.send::<Value>(Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn create_remote(&self, spec: &ResourceSpec) -> Result<Identity> {
        match spec {
            ResourceSpec::Account(s) => {
                let created: AccountEnvelope = self
                    .post("/account", &json!({ "account_name": s.name }))
                    .await?;
                Ok(Identity::account(created.account.account_id))
            }
            ResourceSpec::AccountTeam(s) => {
                let created: TeamEnvelope = self
                    .post(
                        &format!("/account/{}/teams", s.account_id),
                        &json!({ "team_name": s.name }),
                    )
                    .await?;
                Ok(Identity::AccountTeam {
                    account_id: s.account_id.clone(),
                    team_id: created.team.team_id,
                })
            }
            ResourceSpec::AccountTeamMember(s) => {
                self.post::<Value>(
                    &format!("/account/{}/team/{}/members", s.account_id, s.team_id),
                    &json!({ "email": s.user_email }),
                )
                .await?;
                identity_of(spec)
            }
            ResourceSpec::Project(s) => {
                self.post::<Value>("/project", &wire::create_project(s)).await?;
                identity_of(spec)
            }
            ResourceSpec::Kafka(s) => {
                self.post::<Value>(
                    &format!("/project/{}/service", s.project),
                    &wire::create_service(s)?,
                )
                .await?;
                identity_of(spec)
            }
            ResourceSpec::KafkaTopic(s) => {
                self.post::<Value>(
                    &format!("/project/{}/service/{}/topic", s.project, s.service_name),
                    &wire::create_topic(s)?,
                )
                .await?;
                identity_of(spec)
            }
            ResourceSpec::ServiceUser(s) => {
                let path = format!("/project/{}/service/{}/user", s.project, s.service_name);
                self.post::<Value>(&path, &json!({ "username": s.username }))
                    .await?;
                if let Field::Set(password) = &s.password {
                    self.put(
                        &format!("{path}/{}", s.username),
                        &json!({ "operation": "reset-credentials", "new_password": password }),
                    )
                    .await?;
                }
                identity_of(spec)
            }
        }
    }

    async fn read_remote(&self, identity: &Identity) -> Result<RemoteState> {
        match identity {
            Identity::Account { account_id } => {
                let found: AccountEnvelope = self.get(&format!("/account/{account_id}")).await?;
                Ok(found.account.into_state())
            }
            Identity::AccountTeam {
                account_id,
                team_id,
            } => {
                let found: TeamEnvelope = self
                    .get(&format!("/account/{account_id}/team/{team_id}"))
                    .await?;
                Ok(found.team.into_state())
            }
            Identity::AccountTeamMember {
                account_id,
                team_id,
                user_email,
            } => self
                .members(account_id, team_id)
                .await?
                .into_iter()
                .find(|state| state.name() == user_email)
                .ok_or_else(|| AivenError::Api {
                    status: 404,
                    message: format!("{user_email} is neither a member nor invited"),
                }),
            Identity::Project { project } => {
                let found: ProjectEnvelope = self.get(&format!("/project/{project}")).await?;
                Ok(found.project.into_state())
            }
            Identity::Kafka {
                project,
                service_name,
            } => {
                let found: ServiceEnvelope = self
                    .get(&format!("/project/{project}/service/{service_name}"))
                    .await?;
                Ok(found.service.into_state(project)?)
            }
            Identity::KafkaTopic {
                project,
                service_name,
                topic_name,
            } => {
                let found: TopicEnvelope = self
                    .get(&format!(
                        "/project/{project}/service/{service_name}/topic/{topic_name}"
                    ))
                    .await?;
                Ok(found.topic.into_state(project, service_name))
            }
            Identity::ServiceUser {
                project,
                service_name,
                username,
            } => {
                let found: ServiceUserEnvelope = self
                    .get(&format!(
                        "/project/{project}/service/{service_name}/user/{username}"
                    ))
                    .await?;
                Ok(found.user.into_state(project, service_name))
            }
        }
    }

    /// Accepted members followed by pending invitations
    async fn members(&self, account_id: &str, team_id: &str) -> Result<Vec<RemoteState>> {
        let base = format!("/account/{account_id}/team/{team_id}");
        let members: MemberList = self.get(&format!("{base}/members")).await?;
        let invites: InviteList = self.get(&format!("{base}/invites")).await?;

        let mut states: Vec<RemoteState> = members
            .members
            .into_iter()
            .map(|m| {
                wire::member_state(
                    account_id,
                    team_id,
                    &m.user_email,
                    true,
                    String::new(),
                    m.create_time,
                )
            })
            .collect();
        for invite in invites.account_invites {
            if states.iter().all(|s| s.name() != invite.user_email) {
                states.push(wire::member_state(
                    account_id,
                    team_id,
                    &invite.user_email,
                    false,
                    invite.invited_by_user_email,
                    invite.create_time,
                ));
            }
        }
        Ok(states)
    }

    async fn update_remote(&self, identity: &Identity, update: &FieldGroupUpdate) -> Result<()> {
        match identity {
            Identity::Account { account_id } => {
                self.put(
                    &format!("/account/{account_id}"),
                    &json!({ "account_name": update.value("name") }),
                )
                .await
            }
            Identity::AccountTeam {
                account_id,
                team_id,
            } => {
                self.put(
                    &format!("/account/{account_id}/team/{team_id}"),
                    &json!({ "team_name": update.value("name") }),
                )
                .await
            }
            Identity::AccountTeamMember { .. } => Err(AivenError::InvalidConfig(
                "team members cannot be updated".to_string(),
            )),
            Identity::Project { project } => {
                self.put(
                    &format!("/project/{project}"),
                    &wire::project_update(&update.changes),
                )
                .await
            }
            Identity::Kafka {
                project,
                service_name,
            } => {
                let observed = if update.group == FieldGroup::Maintenance {
                    match self.read_remote(identity).await?.observed {
                        Observed::Kafka(kafka) => Some(kafka),
                        _ => None,
                    }
                } else {
                    None
                };
                self.put(
                    &format!("/project/{project}/service/{service_name}"),
                    &wire::service_update(&update.changes, observed.as_ref()),
                )
                .await
            }
            Identity::KafkaTopic {
                project,
                service_name,
                topic_name,
            } => {
                self.put(
                    &format!("/project/{project}/service/{service_name}/topic/{topic_name}"),
                    &update.changes,
                )
                .await
            }
            Identity::ServiceUser {
                project,
                service_name,
                username,
            } => {
                let mut body = json!({ "operation": "reset-credentials" });
                if let Some(Value::String(password)) = update.value("password") {
                    body["new_password"] = json!(password);
                }
                self.put(
                    &format!("/project/{project}/service/{service_name}/user/{username}"),
                    &body,
                )
                .await
            }
        }
    }

    async fn delete_remote(&self, identity: &Identity) -> Result<()> {
        match identity {
            Identity::Account { account_id } => {
                self.remove(&format!("/account/{account_id}")).await
            }
            Identity::AccountTeam {
                account_id,
                team_id,
            } => {
                self.remove(&format!("/account/{account_id}/team/{team_id}"))
                    .await
            }
            Identity::AccountTeamMember {
                account_id,
                team_id,
                user_email,
            } => {
                let base = format!("/account/{account_id}/team/{team_id}");
                let members: MemberList = self.get(&format!("{base}/members")).await?;
                match members.members.iter().find(|m| m.user_email == *user_email) {
                    Some(member) => self.remove(&format!("{base}/member/{}", member.user_id)).await,
                    None => self.remove(&format!("{base}/invites/{user_email}")).await,
                }
            }
            Identity::Project { project } => self.remove(&format!("/project/{project}")).await,
            Identity::Kafka {
                project,
                service_name,
            } => {
                self.remove(&format!("/project/{project}/service/{service_name}"))
                    .await
            }
            Identity::KafkaTopic {
                project,
                service_name,
                topic_name,
            } => {
                self.remove(&format!(
                    "/project/{project}/service/{service_name}/topic/{topic_name}"
                ))
                .await
            }
            Identity::ServiceUser {
                project,
                service_name,
                username,
            } => {
                self.remove(&format!(
                    "/project/{project}/service/{service_name}/user/{username}"
                ))
                .await
            }
        }
    }

    /// Objects of `kind` directly under `parent`
    async fn list_under(
        &self,
        kind: ResourceKind,
        parent: Option<&Identity>,
    ) -> Result<Vec<RemoteState>> {
        match (kind, parent) {
            (ResourceKind::Account, _) => {
                let found: AccountList = self.get("/account").await?;
                Ok(found.accounts.into_iter().map(|a| a.into_state()).collect())
            }
            (ResourceKind::AccountTeam, Some(Identity::Account { account_id })) => {
                let found: TeamList = self.get(&format!("/account/{account_id}/teams")).await?;
                Ok(found.teams.into_iter().map(|t| t.into_state()).collect())
            }
            (
                ResourceKind::AccountTeamMember,
                Some(Identity::AccountTeam {
                    account_id,
                    team_id,
                }),
            ) => self.members(account_id, team_id).await,
            (ResourceKind::Project, _) => {
                let found: ProjectList = self.get("/project").await?;
                Ok(found.projects.into_iter().map(|p| p.into_state()).collect())
            }
            (ResourceKind::Kafka, Some(Identity::Project { project })) => {
                let found: ServiceList = self.get(&format!("/project/{project}/service")).await?;
                found
                    .services
                    .into_iter()
                    .filter(|s| s.service_type == "kafka")
                    .map(|s| s.into_state(project).map_err(AivenError::from))
                    .collect()
            }
            (
                ResourceKind::KafkaTopic,
                Some(Identity::Kafka {
                    project,
                    service_name,
                }),
            ) => {
                let found: TopicList = self
                    .get(&format!("/project/{project}/service/{service_name}/topic"))
                    .await?;
                Ok(found
                    .topics
                    .into_iter()
                    .map(|t| t.into_state(project, service_name))
                    .collect())
            }
            (
                ResourceKind::ServiceUser,
                Some(Identity::Kafka {
                    project,
                    service_name,
                }),
            ) => {
                let found: ServiceEnvelope = self
                    .get(&format!("/project/{project}/service/{service_name}"))
                    .await?;
                Ok(found
                    .service
                    .users
                    .into_iter()
                    .map(|u| u.into_state(project, service_name))
                    .collect())
            }
            (kind, parent) => Err(AivenError::InvalidConfig(format!(
                "cannot list {kind} under {}",
                parent.map(|p| p.to_string()).unwrap_or_else(|| "nothing".to_string())
            ))),
        }
    }
}

fn identity_of(spec: &ResourceSpec) -> Result<Identity> {
    spec.identity()
        .ok_or_else(|| AivenError::UnexpectedResponse(format!("no identity for {}", spec.name())))
}

/// Whether listing `kind` needs a parent in the URL
fn needs_parent(kind: ResourceKind) -> bool {
    !matches!(kind, ResourceKind::Account | ResourceKind::Project)
}

#[async_trait]
impl RemoteClient for AivenClient {
    fn name(&self) -> &str {
        "aiven"
    }

    async fn create(&self, spec: &ResourceSpec) -> reconflow_cloud::Result<Identity> {
        self.create_remote(spec)
            .await
            .map_err(|e| e.into_cloud(spec.kind(), spec.display_name(), Operation::Create))
    }

    async fn read(&self, identity: &Identity) -> reconflow_cloud::Result<RemoteState> {
        self.read_remote(identity)
            .await
            .map_err(|e| e.into_cloud(identity.kind(), identity.to_string(), Operation::Read))
    }

    async fn update(
        &self,
        identity: &Identity,
        update: &FieldGroupUpdate,
    ) -> reconflow_cloud::Result<()> {
        tracing::info!(
            kind = %identity.kind(),
            identity = %identity,
            group = %update.group,
            "Updating remote object"
        );
        self.update_remote(identity, update)
            .await
            .map_err(|e| e.into_cloud(identity.kind(), identity.to_string(), Operation::Update))
    }

    async fn delete(&self, identity: &Identity) -> reconflow_cloud::Result<()> {
        self.delete_remote(identity)
            .await
            .map_err(|e| e.into_cloud(identity.kind(), identity.to_string(), Operation::Delete))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ListFilter,
    ) -> reconflow_cloud::Result<Vec<RemoteState>> {
        let parents = match (&filter.parent, kind.behavior().parent) {
            (Some(parent), _) if needs_parent(kind) => vec![Some(parent.clone())],
            (None, Some(parent_kind)) if needs_parent(kind) => self
                .list(parent_kind, &ListFilter::default())
                .await?
                .into_iter()
                .map(|state| Some(state.identity))
                .collect(),
            _ => vec![None],
        };

        let mut found = Vec::new();
        for parent in &parents {
            let states = self
                .list_under(kind, parent.as_ref())
                .await
                .map_err(|e| {
                    let scope = parent.as_ref().map(|p| p.to_string()).unwrap_or_default();
                    e.into_cloud(kind, scope, Operation::List)
                })?;
            found.extend(states.into_iter().filter(|s| filter.matches(s)));
        }
        Ok(found)
    }
}
