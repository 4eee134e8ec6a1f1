//! View configuration sidecar attached to a type or a CompDef.
//!
//! The core never interprets config topics. It only stores them and hands
//! them back.

use super::{Identifiable, PlayerModel, TopicModel};
use crate::constants::ROLE_CONFIGURABLE;
use crate::DmxError;
use std::collections::BTreeMap;

/// Config topics keyed by their type URI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewConfig {
    topics: BTreeMap<String, TopicModel>,
}

impl ViewConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a config topic. A second topic of the same type is a `SchemaViolation`.
    pub fn add_config_topic(&mut self, topic: TopicModel) -> Result<(), DmxError> {
        let type_uri = topic.type_uri().to_string();
        if self.topics.contains_key(&type_uri) {
            return Err(DmxError::SchemaViolation(format!(
                "view config already has a topic of type \"{}\"",
                type_uri
            )));
        }
        self.topics.insert(type_uri, topic);
        Ok(())
    }

    /// Insert or replace the config topic of the topic's type.
    pub fn put_config_topic(&mut self, topic: TopicModel) {
        self.topics.insert(topic.type_uri().to_string(), topic);
    }

    #[must_use]
    pub fn config_topic(&self, config_type_uri: &str) -> Option<&TopicModel> {
        self.topics.get(config_type_uri)
    }

    pub fn config_topics(&self) -> impl Iterator<Item = &TopicModel> {
        self.topics.values()
    }

    pub(crate) fn config_topics_mut(&mut self) -> impl Iterator<Item = &mut TopicModel> {
        self.topics.values_mut()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Wire form: an array of config topics.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.topics.values().map(TopicModel::to_json).collect())
    }

    /// Parse an array of config topics.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, DmxError> {
        let items = json.as_array().ok_or_else(|| {
            DmxError::SerializationError("view config must be a JSON array".to_string())
        })?;
        let mut config = Self::new();
        for item in items {
            config.add_config_topic(TopicModel::from_json(item)?)?;
        }
        Ok(config)
    }
}

/// Something a view config can be attached to: a type (a topic) or a CompDef
/// (an association).
pub trait Configurable {
    fn view_config(&self) -> &ViewConfig;

    fn view_config_mut(&mut self) -> &mut ViewConfig;

    /// The configurable as the player of a `dmx.core.configuration` association.
    fn configurable_player(&self) -> Result<PlayerModel, DmxError>;
}

pub(crate) fn configurable_player_of(object: &dyn Identifiable) -> Result<PlayerModel, DmxError> {
    Ok(PlayerModel::from_ref(object.player_ref()?, ROLE_CONFIGURABLE))
}
