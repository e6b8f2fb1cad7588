//! Resource kinds and the per-kind behaviour table
//!
//! Every kind-specific decision the engine makes (terminal states, field
//! mutability, update grouping, ownership) is looked up here rather than
//! matched on at call sites.

use crate::error::CloudError;
use crate::state::RemoteStatus;
use serde::{Deserialize, Serialize};

/// Closed set of managed resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Account,
    AccountTeam,
    AccountTeamMember,
    Project,
    Kafka,
    KafkaTopic,
    ServiceUser,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Account,
        ResourceKind::AccountTeam,
        ResourceKind::AccountTeamMember,
        ResourceKind::Project,
        ResourceKind::Kafka,
        ResourceKind::KafkaTopic,
        ResourceKind::ServiceUser,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Account => "account",
            ResourceKind::AccountTeam => "account_team",
            ResourceKind::AccountTeamMember => "account_team_member",
            ResourceKind::Project => "project",
            ResourceKind::Kafka => "kafka",
            ResourceKind::KafkaTopic => "kafka_topic",
            ResourceKind::ServiceUser => "service_user",
        }
    }

    pub fn behavior(self) -> &'static KindBehavior {
        &BEHAVIORS[self as usize]
    }

    /// All kinds ordered so that every child comes before its parent
    pub fn deletion_order() -> Vec<ResourceKind> {
        fn visit(kind: ResourceKind, out: &mut Vec<ResourceKind>) {
            for child in kind.behavior().children {
                visit(*child, out);
            }
            if !out.contains(&kind) {
                out.push(kind);
            }
        }

        let mut order = Vec::with_capacity(Self::ALL.len());
        for kind in Self::ALL {
            if kind.behavior().parent.is_none() {
                visit(kind, &mut order);
            }
        }
        order
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches("aiven_").replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| CloudError::InvalidConfig(format!("unknown resource kind: {s}")))
    }
}

/// Set of fields that change together through one remote update call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Profile,
    Association,
    Contacts,
    Plan,
    Maintenance,
    UserConfig,
    Protection,
    TopicLayout,
    TopicConfig,
    Credentials,
}

impl std::fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldGroup::Profile => "profile",
            FieldGroup::Association => "association",
            FieldGroup::Contacts => "contacts",
            FieldGroup::Plan => "plan",
            FieldGroup::Maintenance => "maintenance",
            FieldGroup::UserConfig => "user_config",
            FieldGroup::Protection => "protection",
            FieldGroup::TopicLayout => "topic_layout",
            FieldGroup::TopicConfig => "topic_config",
            FieldGroup::Credentials => "credentials",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// A change forces delete-then-create
    Immutable,
    /// Sent through `update` with the given group
    InPlace(FieldGroup),
    /// Updatable in place, but only upwards; a decrease is rejected
    GrowOnly(FieldGroup),
    /// Owned by the remote side, never diffed
    Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Plain,
    /// Points at the owning parent (e.g. a project's `account_id`)
    Association,
    /// Defaulted from the current parent when left unset
    Inherited,
}

/// Mutability of one attribute path (prefix match on `.` boundaries)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub path: &'static str,
    pub mutability: Mutability,
    pub role: FieldRole,
}

impl FieldRule {
    const fn new(path: &'static str, mutability: Mutability, role: FieldRole) -> Self {
        Self {
            path,
            mutability,
            role,
        }
    }

    pub const fn immutable(path: &'static str) -> Self {
        Self::new(path, Mutability::Immutable, FieldRole::Plain)
    }

    pub const fn in_place(path: &'static str, group: FieldGroup) -> Self {
        Self::new(path, Mutability::InPlace(group), FieldRole::Plain)
    }

    pub const fn grow_only(path: &'static str, group: FieldGroup) -> Self {
        Self::new(path, Mutability::GrowOnly(group), FieldRole::Plain)
    }

    pub const fn computed(path: &'static str) -> Self {
        Self::new(path, Mutability::Computed, FieldRole::Plain)
    }

    pub const fn association(path: &'static str, group: FieldGroup) -> Self {
        Self::new(path, Mutability::InPlace(group), FieldRole::Association)
    }

    pub const fn inherited(path: &'static str, group: FieldGroup) -> Self {
        Self::new(path, Mutability::InPlace(group), FieldRole::Inherited)
    }

    fn covers(&self, path: &str) -> bool {
        path.strip_prefix(self.path)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    }
}

/// How a kind's identity comes into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// The remote side assigns an opaque id on create; lookup is by name
    ServerAssigned,
    /// The caller's name is the identity
    CallerAssigned,
}

/// Static description of one resource kind
#[derive(Debug)]
pub struct KindBehavior {
    pub kind: ResourceKind,
    pub naming: Naming,
    /// Stable states; empty means the kind is ready as soon as it is visible
    pub terminal: &'static [RemoteStatus],
    /// States that mean provisioning went wrong
    pub failure: &'static [RemoteStatus],
    pub rules: &'static [FieldRule],
    /// Order in which update groups are applied
    pub group_order: &'static [FieldGroup],
    pub parent: Option<ResourceKind>,
    pub children: &'static [ResourceKind],
    /// Whether a live object of this kind blocks deleting its parent
    pub blocks_parent_delete: bool,
    /// Whether the kind carries a `termination_protection` flag
    pub termination_protected: bool,
}

impl KindBehavior {
    pub fn is_synchronous(&self) -> bool {
        self.terminal.is_empty()
    }

    pub fn is_terminal(&self, status: Option<RemoteStatus>) -> bool {
        self.terminal.is_empty() || status.is_some_and(|s| self.terminal.contains(&s))
    }

    pub fn is_failure(&self, status: Option<RemoteStatus>) -> bool {
        status.is_some_and(|s| self.failure.contains(&s))
    }

    /// Most specific rule covering `path`
    pub fn rule_for(&self, path: &str) -> Option<&'static FieldRule> {
        self.rules
            .iter()
            .filter(|rule| rule.covers(path))
            .max_by_key(|rule| rule.path.len())
    }

    pub fn group_rank(&self, group: FieldGroup) -> usize {
        self.group_order
            .iter()
            .position(|g| *g == group)
            .unwrap_or(self.group_order.len())
    }
}

use FieldGroup::*;

// Indexed by `ResourceKind as usize`; keep in declaration order.
static BEHAVIORS: [KindBehavior; 7] = [
    KindBehavior {
        kind: ResourceKind::Account,
        naming: Naming::ServerAssigned,
        terminal: &[],
        failure: &[],
        rules: &[
            FieldRule::in_place("name", Profile),
            FieldRule::computed("account_id"),
            FieldRule::computed("tenant_id"),
            FieldRule::computed("owner_team_id"),
        ],
        group_order: &[Profile],
        parent: None,
        children: &[ResourceKind::AccountTeam, ResourceKind::Project],
        blocks_parent_delete: true,
        termination_protected: false,
    },
    KindBehavior {
        kind: ResourceKind::AccountTeam,
        naming: Naming::ServerAssigned,
        terminal: &[],
        failure: &[],
        rules: &[
            FieldRule::immutable("account_id"),
            FieldRule::in_place("name", Profile),
            FieldRule::computed("team_id"),
        ],
        group_order: &[Profile],
        parent: Some(ResourceKind::Account),
        children: &[ResourceKind::AccountTeamMember],
        blocks_parent_delete: true,
        termination_protected: false,
    },
    KindBehavior {
        kind: ResourceKind::AccountTeamMember,
        naming: Naming::CallerAssigned,
        terminal: &[],
        failure: &[],
        rules: &[
            FieldRule::immutable("account_id"),
            FieldRule::immutable("team_id"),
            FieldRule::immutable("user_email"),
            FieldRule::computed("accepted"),
            FieldRule::computed("invited_by_user_email"),
        ],
        group_order: &[],
        parent: Some(ResourceKind::AccountTeam),
        children: &[],
        blocks_parent_delete: true,
        termination_protected: false,
    },
    KindBehavior {
        kind: ResourceKind::Project,
        naming: Naming::CallerAssigned,
        terminal: &[],
        failure: &[],
        rules: &[
            FieldRule::immutable("project"),
            FieldRule::association("account_id", Association),
            FieldRule::inherited("billing_group", Association),
            FieldRule::in_place("technical_emails", Contacts),
            FieldRule::in_place("default_cloud", Contacts),
        ],
        group_order: &[Association, Contacts],
        parent: Some(ResourceKind::Account),
        children: &[ResourceKind::Kafka],
        blocks_parent_delete: true,
        termination_protected: false,
    },
    KindBehavior {
        kind: ResourceKind::Kafka,
        naming: Naming::CallerAssigned,
        terminal: &[RemoteStatus::Running],
        failure: &[RemoteStatus::Poweroff],
        rules: &[
            FieldRule::immutable("project"),
            FieldRule::immutable("service_name"),
            FieldRule::in_place("plan", Plan),
            FieldRule::in_place("cloud_name", Plan),
            FieldRule::in_place("project_vpc_id", Plan),
            FieldRule::in_place("maintenance_window_dow", Maintenance),
            FieldRule::in_place("maintenance_window_time", Maintenance),
            FieldRule::in_place("kafka_user_config", UserConfig),
            FieldRule::in_place("termination_protection", Protection),
            FieldRule::computed("service_type"),
            FieldRule::computed("service_uri"),
            FieldRule::computed("service_host"),
            FieldRule::computed("service_port"),
            FieldRule::computed("kafka"),
        ],
        // feature flags in the user config may depend on the plan
        group_order: &[Plan, Maintenance, UserConfig, Protection],
        parent: Some(ResourceKind::Project),
        children: &[ResourceKind::KafkaTopic, ResourceKind::ServiceUser],
        blocks_parent_delete: true,
        termination_protected: true,
    },
    KindBehavior {
        kind: ResourceKind::KafkaTopic,
        naming: Naming::CallerAssigned,
        terminal: &[RemoteStatus::Active],
        failure: &[RemoteStatus::Deleting],
        rules: &[
            FieldRule::immutable("project"),
            FieldRule::immutable("service_name"),
            FieldRule::immutable("topic_name"),
            FieldRule::grow_only("partitions", TopicLayout),
            FieldRule::in_place("replication", TopicLayout),
            FieldRule::in_place("config", TopicConfig),
        ],
        group_order: &[TopicLayout, TopicConfig],
        parent: Some(ResourceKind::Kafka),
        children: &[],
        blocks_parent_delete: true,
        termination_protected: false,
    },
    KindBehavior {
        kind: ResourceKind::ServiceUser,
        naming: Naming::CallerAssigned,
        terminal: &[],
        failure: &[],
        rules: &[
            FieldRule::immutable("project"),
            FieldRule::immutable("service_name"),
            FieldRule::immutable("username"),
            FieldRule::in_place("password", Credentials),
            FieldRule::computed("type"),
            FieldRule::computed("access_cert"),
            FieldRule::computed("access_key"),
        ],
        group_order: &[Credentials],
        parent: Some(ResourceKind::Kafka),
        children: &[],
        // removed together with the service
        blocks_parent_delete: false,
        termination_protected: false,
    },
];
