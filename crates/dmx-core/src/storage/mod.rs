//! # Storage Collaborator
//!
//! The core never touches a database directly. Everything goes through the
//! object-safe [`Storage`] trait, which speaks in flat records keyed by id:
//! - `TopicRecord` / `AssocRecord`: one stored object each
//! - `RoleRecord`: a role type plus an id-based `PlayerRef`
//! - properties: a flat key/value bag per object, optionally indexed
//!
//! Two implementations are provided:
//! - `MemoryStore`: volatile, transactions by snapshot
//! - `RedbStore`: the same indexes, persisted to a redb database
//!
//! `StorageBackend` selects one of them at runtime.

mod memory;
mod redb_store;
mod state;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::model::PlayerRef;
use crate::{DmxError, ObjectId, SimpleValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// RECORDS
// =============================================================================

/// A stored topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub id: ObjectId,
    pub uri: Option<String>,
    pub type_uri: String,
    pub value: SimpleValue,
}

impl TopicRecord {
    #[must_use]
    pub fn new(
        id: ObjectId,
        uri: Option<&str>,
        type_uri: impl Into<String>,
        value: impl Into<SimpleValue>,
    ) -> Self {
        Self {
            id,
            uri: uri.map(str::to_string),
            type_uri: type_uri.into(),
            value: value.into(),
        }
    }
}

/// One end of a stored association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub role_type_uri: String,
    pub player: PlayerRef,
}

impl RoleRecord {
    #[must_use]
    pub fn new(role_type_uri: impl Into<String>, player: PlayerRef) -> Self {
        Self {
            role_type_uri: role_type_uri.into(),
            player,
        }
    }
}

/// A stored association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssocRecord {
    pub id: ObjectId,
    pub uri: Option<String>,
    pub type_uri: String,
    pub value: SimpleValue,
    pub role1: RoleRecord,
    pub role2: RoleRecord,
}

/// A stored property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub value: SimpleValue,
    pub indexed: bool,
}

/// An object reached through an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedRecord<T> {
    pub object: T,
    pub assoc: AssocRecord,
}

/// Restricts a related-object query. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedFilter {
    pub assoc_type_uri: Option<String>,
    pub my_role_type_uri: Option<String>,
    pub others_role_type_uri: Option<String>,
    pub others_type_uri: Option<String>,
}

impl RelatedFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn assoc_type(mut self, uri: impl Into<String>) -> Self {
        self.assoc_type_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn my_role(mut self, uri: impl Into<String>) -> Self {
        self.my_role_type_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn others_role(mut self, uri: impl Into<String>) -> Self {
        self.others_role_type_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn others_type(mut self, uri: impl Into<String>) -> Self {
        self.others_type_uri = Some(uri.into());
        self
    }
}

/// Boxed cursor over stored records.
pub type Cursor<'a, T> = Box<dyn Iterator<Item = Result<T, DmxError>> + 'a>;

// =============================================================================
// STORAGE TRAIT
// =============================================================================

/// The storage collaborator.
///
/// All operations are synchronous. Related-object results come back in
/// association-id order, which is creation order.
pub trait Storage {
    fn fetch_topic(&self, id: ObjectId) -> Result<Option<TopicRecord>, DmxError>;

    fn fetch_assoc(&self, id: ObjectId) -> Result<Option<AssocRecord>, DmxError>;

    fn fetch_topic_by_uri(&self, uri: &str) -> Result<Option<TopicRecord>, DmxError>;

    fn fetch_assoc_by_uri(&self, uri: &str) -> Result<Option<AssocRecord>, DmxError>;

    /// The first topic of `type_uri` carrying `value`.
    fn fetch_topic_by_value(
        &self,
        type_uri: &str,
        value: &SimpleValue,
    ) -> Result<Option<TopicRecord>, DmxError>;

    fn query_topics(&self, type_uri: &str) -> Result<Vec<TopicRecord>, DmxError>;

    fn query_assocs(&self, type_uri: &str) -> Result<Vec<AssocRecord>, DmxError>;

    fn fetch_related_topics(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Result<Vec<RelatedRecord<TopicRecord>>, DmxError>;

    /// At most one related topic. More than one is an `InvalidState` failure.
    fn fetch_related_topic(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Result<Option<RelatedRecord<TopicRecord>>, DmxError> {
        let mut related = self.fetch_related_topics(player, filter)?;
        if related.len() > 1 {
            return Err(DmxError::InvalidState(format!(
                "{} {} has {} related topics where at most one is expected ({:?})",
                player.kind().name(),
                player.id(),
                related.len(),
                filter
            )));
        }
        Ok(related.pop())
    }

    fn fetch_related_assocs(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Result<Vec<RelatedRecord<AssocRecord>>, DmxError>;

    /// Every association in which `player` plays a role.
    fn fetch_assocs_of(&self, player: PlayerRef) -> Result<Vec<AssocRecord>, DmxError>;

    /// Cursor over all topics.
    fn topics(&self) -> Cursor<'_, TopicRecord>;

    /// Cursor over all associations.
    fn assocs(&self) -> Cursor<'_, AssocRecord>;

    /// Allocate an id. Topics and associations share one id space.
    fn next_id(&mut self) -> Result<ObjectId, DmxError>;

    /// Insert or replace a topic.
    fn put_topic(&mut self, record: TopicRecord) -> Result<(), DmxError>;

    /// Insert or replace an association. Both players must exist.
    fn put_assoc(&mut self, record: AssocRecord) -> Result<(), DmxError>;

    /// Delete a topic and its properties.
    fn delete_topic(&mut self, id: ObjectId) -> Result<(), DmxError>;

    /// Delete an association and its properties.
    fn delete_assoc(&mut self, id: ObjectId) -> Result<(), DmxError>;

    fn fetch_property(&self, id: ObjectId, key: &str) -> Result<SimpleValue, DmxError>;

    fn has_property(&self, id: ObjectId, key: &str) -> Result<bool, DmxError>;

    fn store_property(
        &mut self,
        id: ObjectId,
        key: &str,
        value: SimpleValue,
        indexed: bool,
    ) -> Result<(), DmxError>;

    fn remove_property(&mut self, id: ObjectId, key: &str) -> Result<(), DmxError>;

    fn fetch_properties(&self, id: ObjectId) -> Result<BTreeMap<String, SimpleValue>, DmxError>;

    /// Ids of the objects whose indexed property `key` equals `value`.
    fn query_by_property(&self, key: &str, value: &SimpleValue) -> Result<Vec<ObjectId>, DmxError>;

    /// Start a transaction. Nesting is an `InvalidState` failure.
    fn begin(&mut self) -> Result<(), DmxError>;

    fn commit(&mut self) -> Result<(), DmxError>;

    fn rollback(&mut self) -> Result<(), DmxError>;

    fn in_transaction(&self) -> bool;
}

/// Implement the read and property half of [`Storage`] by delegating to a
/// `state: GraphState` field. Writes stay with the implementor.
macro_rules! delegate_reads {
    () => {
        fn fetch_topic(&self, id: ObjectId) -> Result<Option<TopicRecord>, DmxError> {
            Ok(self.state.topics.get(&id).cloned())
        }

        fn fetch_assoc(&self, id: ObjectId) -> Result<Option<AssocRecord>, DmxError> {
            Ok(self.state.assocs.get(&id).cloned())
        }

        fn fetch_topic_by_uri(&self, uri: &str) -> Result<Option<TopicRecord>, DmxError> {
            Ok(self.state.topic_by_uri(uri))
        }

        fn fetch_assoc_by_uri(&self, uri: &str) -> Result<Option<AssocRecord>, DmxError> {
            Ok(self.state.assoc_by_uri(uri))
        }

        fn fetch_topic_by_value(
            &self,
            type_uri: &str,
            value: &SimpleValue,
        ) -> Result<Option<TopicRecord>, DmxError> {
            Ok(self.state.topic_by_value(type_uri, value))
        }

        fn query_topics(&self, type_uri: &str) -> Result<Vec<TopicRecord>, DmxError> {
            Ok(self.state.topics_of_type(type_uri))
        }

        fn query_assocs(&self, type_uri: &str) -> Result<Vec<AssocRecord>, DmxError> {
            Ok(self.state.assocs_of_type(type_uri))
        }

        fn fetch_related_topics(
            &self,
            player: PlayerRef,
            filter: &RelatedFilter,
        ) -> Result<Vec<RelatedRecord<TopicRecord>>, DmxError> {
            Ok(self.state.related_topics(player, filter))
        }

        fn fetch_related_assocs(
            &self,
            player: PlayerRef,
            filter: &RelatedFilter,
        ) -> Result<Vec<RelatedRecord<AssocRecord>>, DmxError> {
            Ok(self.state.related_assocs(player, filter))
        }

        fn fetch_assocs_of(&self, player: PlayerRef) -> Result<Vec<AssocRecord>, DmxError> {
            Ok(self.state.assocs_of(player))
        }

        fn topics(&self) -> Cursor<'_, TopicRecord> {
            Box::new(self.state.topics.values().cloned().map(Ok))
        }

        fn assocs(&self) -> Cursor<'_, AssocRecord> {
            Box::new(self.state.assocs.values().cloned().map(Ok))
        }

        fn fetch_property(&self, id: ObjectId, key: &str) -> Result<SimpleValue, DmxError> {
            self.state
                .property(id, key)
                .map(|entry| entry.value.clone())
                .ok_or_else(|| DmxError::PropertyNotFound {
                    id,
                    key: key.to_string(),
                })
        }

        fn has_property(&self, id: ObjectId, key: &str) -> Result<bool, DmxError> {
            Ok(self.state.property(id, key).is_some())
        }

        fn fetch_properties(
            &self,
            id: ObjectId,
        ) -> Result<std::collections::BTreeMap<String, SimpleValue>, DmxError> {
            Ok(self
                .state
                .properties
                .get(&id)
                .map(|props| {
                    props
                        .iter()
                        .map(|(k, v)| (k.clone(), v.value.clone()))
                        .collect()
                })
                .unwrap_or_default())
        }

        fn query_by_property(
            &self,
            key: &str,
            value: &SimpleValue,
        ) -> Result<Vec<ObjectId>, DmxError> {
            Ok(self.state.query_by_property(key, value))
        }
    };
}

pub(crate) use delegate_reads;

// =============================================================================
// RUNTIME BACKEND SELECTION
// =============================================================================

/// Storage chosen at runtime.
#[derive(Debug)]
pub enum StorageBackend {
    /// Volatile in-memory arena.
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    /// Open or create a redb database at the given path.
    pub fn redb(path: impl AsRef<Path>) -> Result<Self, DmxError> {
        RedbStore::open(path).map(Self::Persistent)
    }

    fn inner(&self) -> &dyn Storage {
        match self {
            Self::InMemory(s) => s,
            Self::Persistent(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Storage {
        match self {
            Self::InMemory(s) => s,
            Self::Persistent(s) => s,
        }
    }
}

impl Storage for StorageBackend {
    fn fetch_topic(&self, id: ObjectId) -> Result<Option<TopicRecord>, DmxError> {
        self.inner().fetch_topic(id)
    }

    fn fetch_assoc(&self, id: ObjectId) -> Result<Option<AssocRecord>, DmxError> {
        self.inner().fetch_assoc(id)
    }

    fn fetch_topic_by_uri(&self, uri: &str) -> Result<Option<TopicRecord>, DmxError> {
        self.inner().fetch_topic_by_uri(uri)
    }

    fn fetch_assoc_by_uri(&self, uri: &str) -> Result<Option<AssocRecord>, DmxError> {
        self.inner().fetch_assoc_by_uri(uri)
    }

    fn fetch_topic_by_value(
        &self,
        type_uri: &str,
        value: &SimpleValue,
    ) -> Result<Option<TopicRecord>, DmxError> {
        self.inner().fetch_topic_by_value(type_uri, value)
    }

    fn query_topics(&self, type_uri: &str) -> Result<Vec<TopicRecord>, DmxError> {
        self.inner().query_topics(type_uri)
    }

    fn query_assocs(&self, type_uri: &str) -> Result<Vec<AssocRecord>, DmxError> {
        self.inner().query_assocs(type_uri)
    }

    fn fetch_related_topics(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Result<Vec<RelatedRecord<TopicRecord>>, DmxError> {
        self.inner().fetch_related_topics(player, filter)
    }

    fn fetch_related_assocs(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Result<Vec<RelatedRecord<AssocRecord>>, DmxError> {
        self.inner().fetch_related_assocs(player, filter)
    }

    fn fetch_assocs_of(&self, player: PlayerRef) -> Result<Vec<AssocRecord>, DmxError> {
        self.inner().fetch_assocs_of(player)
    }

    fn topics(&self) -> Cursor<'_, TopicRecord> {
        self.inner().topics()
    }

    fn assocs(&self) -> Cursor<'_, AssocRecord> {
        self.inner().assocs()
    }

    fn next_id(&mut self) -> Result<ObjectId, DmxError> {
        self.inner_mut().next_id()
    }

    fn put_topic(&mut self, record: TopicRecord) -> Result<(), DmxError> {
        self.inner_mut().put_topic(record)
    }

    fn put_assoc(&mut self, record: AssocRecord) -> Result<(), DmxError> {
        self.inner_mut().put_assoc(record)
    }

    fn delete_topic(&mut self, id: ObjectId) -> Result<(), DmxError> {
        self.inner_mut().delete_topic(id)
    }

    fn delete_assoc(&mut self, id: ObjectId) -> Result<(), DmxError> {
        self.inner_mut().delete_assoc(id)
    }

    fn fetch_property(&self, id: ObjectId, key: &str) -> Result<SimpleValue, DmxError> {
        self.inner().fetch_property(id, key)
    }

    fn has_property(&self, id: ObjectId, key: &str) -> Result<bool, DmxError> {
        self.inner().has_property(id, key)
    }

    fn store_property(
        &mut self,
        id: ObjectId,
        key: &str,
        value: SimpleValue,
        indexed: bool,
    ) -> Result<(), DmxError> {
        self.inner_mut().store_property(id, key, value, indexed)
    }

    fn remove_property(&mut self, id: ObjectId, key: &str) -> Result<(), DmxError> {
        self.inner_mut().remove_property(id, key)
    }

    fn fetch_properties(&self, id: ObjectId) -> Result<BTreeMap<String, SimpleValue>, DmxError> {
        self.inner().fetch_properties(id)
    }

    fn query_by_property(&self, key: &str, value: &SimpleValue) -> Result<Vec<ObjectId>, DmxError> {
        self.inner().query_by_property(key, value)
    }

    fn begin(&mut self) -> Result<(), DmxError> {
        self.inner_mut().begin()
    }

    fn commit(&mut self) -> Result<(), DmxError> {
        self.inner_mut().commit()
    }

    fn rollback(&mut self) -> Result<(), DmxError> {
        self.inner_mut().rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner().in_transaction()
    }
}
