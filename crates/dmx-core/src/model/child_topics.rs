//! # Child Topics
//!
//! The composite value tree: a mapping from CompDef URI to either one related
//! topic (cardinality `one`) or an ordered list of related topics
//! (cardinality `many`).
//!
//! An entry that is missing from the map was never loaded. An entry that is
//! present but holds `One(None)` or an empty `Many` was loaded and is empty.

use super::{AssocModel, Identifiable, TopicModel, TopicReference};
use std::collections::BTreeMap;

// =============================================================================
// RELATED WRAPPERS
// =============================================================================

/// An association reached through a further relating association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedAssocModel {
    pub assoc: AssocModel,
    pub relating_assoc: Option<Box<RelatedAssocModel>>,
}

impl RelatedAssocModel {
    #[must_use]
    pub fn new(assoc: AssocModel) -> Self {
        Self {
            assoc,
            relating_assoc: None,
        }
    }

    /// Attach the association through which this association was reached.
    #[must_use]
    pub fn via(mut self, relating: RelatedAssocModel) -> Self {
        self.relating_assoc = Some(Box::new(relating));
        self
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = self.assoc.to_json();
        if let (Some(obj), Some(relating)) = (json.as_object_mut(), &self.relating_assoc) {
            obj.insert("assoc".into(), relating.to_json());
        }
        json
    }
}

/// A child topic together with the association connecting it to its parent.
///
/// The relating association is `None` for values that were never stored
/// (a fresh child in an update request) or that have no real underlying
/// association. `reference` is set when the child was given as a reference
/// to an existing topic instead of a topic value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedTopicModel {
    pub topic: TopicModel,
    pub relating_assoc: Option<RelatedAssocModel>,
    pub reference: Option<TopicReference>,
}

impl RelatedTopicModel {
    #[must_use]
    pub fn new(topic: TopicModel) -> Self {
        Self {
            topic,
            relating_assoc: None,
            reference: None,
        }
    }

    /// A child given by reference only. The topic stays empty until resolved.
    #[must_use]
    pub fn reference(reference: TopicReference) -> Self {
        Self {
            topic: TopicModel::default(),
            relating_assoc: None,
            reference: Some(reference),
        }
    }

    /// A stored child reached through `assoc`.
    #[must_use]
    pub fn related(topic: TopicModel, assoc: AssocModel) -> Self {
        Self {
            topic,
            relating_assoc: Some(RelatedAssocModel::new(assoc)),
            reference: None,
        }
    }

    #[must_use]
    pub fn relating_assoc(&self) -> Option<&AssocModel> {
        self.relating_assoc.as_ref().map(|r| &r.assoc)
    }

    /// Wire form: the topic plus `assoc` when the relating association is known.
    /// An unresolved reference renders as its `ref_id:`/`ref_uri:` string.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        if let Some(reference) = &self.reference
            && self.topic.id_opt().is_none()
        {
            return serde_json::Value::String(reference.to_string());
        }
        let mut json = self.topic.to_json();
        if let (Some(obj), Some(relating)) = (json.as_object_mut(), &self.relating_assoc) {
            obj.insert("assoc".into(), relating.to_json());
        }
        json
    }
}

// =============================================================================
// CHILD VALUE
// =============================================================================

/// The value of one ChildTopics entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildValue {
    /// Cardinality `one`. `None` when the child was never set.
    One(Option<RelatedTopicModel>),
    /// Cardinality `many`, in storage order.
    Many(Vec<RelatedTopicModel>),
}

impl ChildValue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(child) => child.is_none(),
            Self::Many(list) => list.is_empty(),
        }
    }

    /// All related topics of this entry, zero or more.
    pub fn topics(&self) -> impl Iterator<Item = &RelatedTopicModel> {
        let slice: &[RelatedTopicModel] = match self {
            Self::One(child) => child.as_slice(),
            Self::Many(list) => list,
        };
        slice.iter()
    }

    pub(crate) fn topics_mut(&mut self) -> impl Iterator<Item = &mut RelatedTopicModel> {
        let slice: &mut [RelatedTopicModel] = match self {
            Self::One(child) => child.as_mut_slice(),
            Self::Many(list) => list,
        };
        slice.iter_mut()
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::One(None) => serde_json::Value::Null,
            Self::One(Some(child)) => child.to_json(),
            Self::Many(list) => {
                serde_json::Value::Array(list.iter().map(RelatedTopicModel::to_json).collect())
            }
        }
    }
}

// =============================================================================
// CHILD TOPICS
// =============================================================================

/// The composite value tree of a topic or association, keyed by CompDef URI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChildTopics {
    entries: BTreeMap<String, ChildValue>,
}

impl ChildTopics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for a CompDef, or `None` if it was never loaded.
    #[must_use]
    pub fn get(&self, comp_def_uri: &str) -> Option<&ChildValue> {
        self.entries.get(comp_def_uri)
    }

    pub fn get_mut(&mut self, comp_def_uri: &str) -> Option<&mut ChildValue> {
        self.entries.get_mut(comp_def_uri)
    }

    /// Whether the entry was loaded (possibly as empty).
    #[must_use]
    pub fn is_loaded(&self, comp_def_uri: &str) -> bool {
        self.entries.contains_key(comp_def_uri)
    }

    /// The child of a `one` entry. `None` when unset, unloaded, or a list.
    #[must_use]
    pub fn get_one(&self, comp_def_uri: &str) -> Option<&RelatedTopicModel> {
        match self.entries.get(comp_def_uri) {
            Some(ChildValue::One(child)) => child.as_ref(),
            _ => None,
        }
    }

    /// The children of a `many` entry. Empty when unset, unloaded, or a single.
    #[must_use]
    pub fn get_many(&self, comp_def_uri: &str) -> &[RelatedTopicModel] {
        match self.entries.get(comp_def_uri) {
            Some(ChildValue::Many(list)) => list,
            _ => &[],
        }
    }

    /// The scalar value of a `one` child as a string.
    #[must_use]
    pub fn string_value(&self, comp_def_uri: &str) -> Option<String> {
        self.get_one(comp_def_uri)
            .map(|child| child.topic.value().to_string())
    }

    /// Set a `one` entry, replacing whatever was there.
    pub fn set_one(&mut self, comp_def_uri: impl Into<String>, child: Option<RelatedTopicModel>) {
        self.entries.insert(comp_def_uri.into(), ChildValue::One(child));
    }

    /// Replace a whole entry.
    pub fn put(&mut self, comp_def_uri: impl Into<String>, value: ChildValue) {
        self.entries.insert(comp_def_uri.into(), value);
    }

    /// Append to a `many` entry, creating it if needed. A `one` entry at the
    /// same key is converted into a list holding its previous child.
    pub fn add_many(&mut self, comp_def_uri: impl Into<String>, child: RelatedTopicModel) {
        let entry = self
            .entries
            .entry(comp_def_uri.into())
            .or_insert_with(|| ChildValue::Many(Vec::new()));
        match entry {
            ChildValue::Many(list) => list.push(child),
            ChildValue::One(previous) => {
                let mut list: Vec<_> = previous.take().into_iter().collect();
                list.push(child);
                *entry = ChildValue::Many(list);
            }
        }
    }

    pub fn remove(&mut self, comp_def_uri: &str) -> Option<ChildValue> {
        self.entries.remove(comp_def_uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChildValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every related topic of every entry.
    pub fn related_topics(&self) -> impl Iterator<Item = &RelatedTopicModel> {
        self.entries.values().flat_map(ChildValue::topics)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wire form: `{compDefUri: <topic-or-list-or-null>}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
