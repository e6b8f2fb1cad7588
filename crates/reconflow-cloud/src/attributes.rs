//! Flat attribute reporting
//!
//! Renders a [`RemoteState`] the way provider frameworks expose attributes:
//! scalars by name, nested blocks as `block.0.field`, lists as `list.#` plus
//! `list.N`.

use crate::error::Result;
use crate::state::RemoteState;
use chrono::SecondsFormat;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    values: BTreeMap<String, String>,
}

impl AttributeMap {
    pub fn from_state(state: &RemoteState) -> Result<Self> {
        let mut map = Self::default();
        map.flatten("", &state.observed_attributes()?);

        map.insert("id", state.identity.to_string());
        if let Some(status) = state.status {
            map.insert("state", status.to_string());
        }
        if let Some(time) = state.create_time {
            map.insert("create_time", time.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        if let Some(time) = state.update_time {
            map.insert("update_time", time.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        Ok(map)
    }

    /// Value at `key`; missing keys read as the empty string
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    fn flatten(&mut self, prefix: &str, value: &Value) {
        match value {
            Value::Null => {}
            Value::Bool(b) => self.insert(prefix, b.to_string()),
            Value::Number(n) => self.insert(prefix, n.to_string()),
            Value::String(s) => self.insert(prefix, s.clone()),
            Value::Array(items) => {
                self.insert(format!("{prefix}.#"), items.len().to_string());
                for (index, item) in items.iter().enumerate() {
                    self.flatten(&format!("{prefix}.{index}"), item);
                }
            }
            Value::Object(fields) => {
                for (key, field) in fields {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.0.{key}")
                    };
                    self.flatten(&path, field);
                }
            }
        }
    }
}

impl std::fmt::Display for AttributeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.values {
            writeln!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::identity::Identity;
    use crate::spec::{KafkaUserConfig, PublicAccess};
    use crate::state::{KafkaConnection, KafkaState, Observed, ProjectState, RemoteStatus};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_nested_blocks_and_lists() {
        let mut state = RemoteState::new(
            Identity::kafka("p", "k"),
            Observed::Kafka(KafkaState {
                project: "p".to_string(),
                service_name: "k".to_string(),
                plan: "business-4".to_string(),
                service_port: 12693,
                kafka_user_config: Some(KafkaUserConfig {
                    kafka_rest: Field::Set(true),
                    public_access: Some(PublicAccess {
                        kafka: Field::Set(false),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                kafka: Some(KafkaConnection {
                    rest_uri: "https://k-p.aivencloud.com:12695".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        )
        .with_status(RemoteStatus::Running);
        state.create_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

        let attrs = AttributeMap::from_state(&state).unwrap();
        assert_eq!(attrs.get("id"), "p/k");
        assert_eq!(attrs.get("state"), "RUNNING");
        assert_eq!(attrs.get("plan"), "business-4");
        assert_eq!(attrs.get("service_port"), "12693");
        assert_eq!(attrs.get("kafka_user_config.0.kafka_rest"), "true");
        assert_eq!(attrs.get("kafka_user_config.0.public_access.0.kafka"), "false");
        assert_eq!(attrs.get("kafka.0.rest_uri"), "https://k-p.aivencloud.com:12695");
        assert_eq!(attrs.get("create_time"), "2024-05-01T12:00:00Z");
        assert_eq!(attrs.get("kafka_user_config.0.kafka_connect"), "");
        assert!(!attrs.contains("update_time"));
    }

    #[test]
    fn test_lists_are_counted() {
        let state = RemoteState::new(
            Identity::project("p"),
            Observed::Project(ProjectState {
                project: "p".to_string(),
                technical_emails: vec!["a@example.com".to_string(), "b@example.com".to_string()],
                ..Default::default()
            }),
        );

        let attrs = AttributeMap::from_state(&state).unwrap();
        assert_eq!(attrs.get("technical_emails.#"), "2");
        assert_eq!(attrs.get("technical_emails.1"), "b@example.com");
        assert!(!attrs.contains("state"));
        assert!(attrs.to_string().contains("project = p\n"));
    }
}
