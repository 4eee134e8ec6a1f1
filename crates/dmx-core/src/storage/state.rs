//! # Graph State
//!
//! The id-keyed arena shared by both storage implementations, with its
//! secondary indexes. Everything is a `BTreeMap`/`BTreeSet`, so iteration
//! order is id order, which is creation order.

use super::{AssocRecord, PropertyEntry, RelatedFilter, RelatedRecord, TopicRecord};
use crate::model::PlayerRef;
use crate::{DmxError, ObjectId, ObjectKind, SimpleValue};
use std::collections::{BTreeMap, BTreeSet};

type ValueKey = (String, SimpleValue);

#[derive(Debug, Clone, Default)]
pub(crate) struct GraphState {
    pub(crate) topics: BTreeMap<ObjectId, TopicRecord>,
    pub(crate) assocs: BTreeMap<ObjectId, AssocRecord>,
    pub(crate) properties: BTreeMap<ObjectId, BTreeMap<String, PropertyEntry>>,
    pub(crate) next_id: u64,
    uri_index: BTreeMap<String, ObjectId>,
    type_index: BTreeMap<String, BTreeSet<ObjectId>>,
    value_index: BTreeMap<ValueKey, BTreeSet<ObjectId>>,
    /// Player id -> ids of the associations it plays a role in.
    membership: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    property_index: BTreeMap<ValueKey, BTreeSet<ObjectId>>,
}

impl GraphState {
    pub(crate) fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub(crate) fn contains(&self, id: ObjectId) -> bool {
        self.topics.contains_key(&id) || self.assocs.contains_key(&id)
    }

    fn kind_of(&self, id: ObjectId) -> Option<ObjectKind> {
        if self.topics.contains_key(&id) {
            Some(ObjectKind::Topic)
        } else if self.assocs.contains_key(&id) {
            Some(ObjectKind::Assoc)
        } else {
            None
        }
    }

    fn type_uri_of(&self, id: ObjectId) -> Option<&str> {
        self.topics
            .get(&id)
            .map(|t| t.type_uri.as_str())
            .or_else(|| self.assocs.get(&id).map(|a| a.type_uri.as_str()))
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub(crate) fn topic_by_uri(&self, uri: &str) -> Option<TopicRecord> {
        self.uri_index
            .get(uri)
            .and_then(|id| self.topics.get(id))
            .cloned()
    }

    pub(crate) fn assoc_by_uri(&self, uri: &str) -> Option<AssocRecord> {
        self.uri_index
            .get(uri)
            .and_then(|id| self.assocs.get(id))
            .cloned()
    }

    pub(crate) fn topic_by_value(&self, type_uri: &str, value: &SimpleValue) -> Option<TopicRecord> {
        self.value_index
            .get(&(type_uri.to_string(), value.clone()))
            .and_then(|ids| ids.iter().find_map(|id| self.topics.get(id)))
            .cloned()
    }

    pub(crate) fn topics_of_type(&self, type_uri: &str) -> Vec<TopicRecord> {
        self.ids_of_type(type_uri)
            .filter_map(|id| self.topics.get(&id))
            .cloned()
            .collect()
    }

    pub(crate) fn assocs_of_type(&self, type_uri: &str) -> Vec<AssocRecord> {
        self.ids_of_type(type_uri)
            .filter_map(|id| self.assocs.get(&id))
            .cloned()
            .collect()
    }

    fn ids_of_type(&self, type_uri: &str) -> impl Iterator<Item = ObjectId> + '_ {
        self.type_index.get(type_uri).into_iter().flatten().copied()
    }

    pub(crate) fn assocs_of(&self, player: PlayerRef) -> Vec<AssocRecord> {
        self.membership
            .get(&player.id())
            .into_iter()
            .flatten()
            .filter_map(|id| self.assocs.get(id))
            .cloned()
            .collect()
    }

    /// Associations of `player` passing `filter`, each paired with the player
    /// on the other side.
    fn related(&self, player: PlayerRef, filter: &RelatedFilter) -> Vec<(AssocRecord, PlayerRef)> {
        let mut result = Vec::new();
        for assoc in self.assocs_of(player) {
            if filter
                .assoc_type_uri
                .as_deref()
                .is_some_and(|t| t != assoc.type_uri)
            {
                continue;
            }
            let pairs = [(&assoc.role1, &assoc.role2), (&assoc.role2, &assoc.role1)];
            let other = pairs.iter().find_map(|(mine, other)| {
                let mine_ok = mine.player == player
                    && filter
                        .my_role_type_uri
                        .as_deref()
                        .is_none_or(|r| r == mine.role_type_uri);
                let other_ok = filter
                    .others_role_type_uri
                    .as_deref()
                    .is_none_or(|r| r == other.role_type_uri);
                let type_ok = filter
                    .others_type_uri
                    .as_deref()
                    .is_none_or(|t| self.type_uri_of(other.player.id()) == Some(t));
                (mine_ok && other_ok && type_ok).then_some(other.player)
            });
            if let Some(other) = other {
                result.push((assoc, other));
            }
        }
        result
    }

    pub(crate) fn related_topics(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Vec<RelatedRecord<TopicRecord>> {
        self.related(player, filter)
            .into_iter()
            .filter_map(|(assoc, other)| match other {
                PlayerRef::Topic(id) => self.topics.get(&id).map(|t| RelatedRecord {
                    object: t.clone(),
                    assoc,
                }),
                PlayerRef::Assoc(_) => None,
            })
            .collect()
    }

    pub(crate) fn related_assocs(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Vec<RelatedRecord<AssocRecord>> {
        self.related(player, filter)
            .into_iter()
            .filter_map(|(assoc, other)| match other {
                PlayerRef::Assoc(id) => self.assocs.get(&id).map(|a| RelatedRecord {
                    object: a.clone(),
                    assoc,
                }),
                PlayerRef::Topic(_) => None,
            })
            .collect()
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    fn check_uri(&self, uri: Option<&str>, id: ObjectId) -> Result<(), DmxError> {
        if let Some(uri) = uri
            && let Some(owner) = self.uri_index.get(uri)
            && *owner != id
        {
            return Err(DmxError::SchemaViolation(format!(
                "URI \"{}\" is already used by object {}",
                uri, owner
            )));
        }
        Ok(())
    }

    fn check_player(&self, player: PlayerRef) -> Result<(), DmxError> {
        match self.kind_of(player.id()) {
            Some(kind) if kind == player.kind() => Ok(()),
            Some(_) => Err(DmxError::InvalidState(format!(
                "object {} is not a {}",
                player.id(),
                player.kind().name()
            ))),
            None => Err(match player {
                PlayerRef::Topic(id) => DmxError::TopicNotFound(id),
                PlayerRef::Assoc(id) => DmxError::AssocNotFound(id),
            }),
        }
    }

    pub(crate) fn put_topic(&mut self, record: TopicRecord) -> Result<(), DmxError> {
        if self.assocs.contains_key(&record.id) {
            return Err(DmxError::InvalidState(format!(
                "id {} already belongs to an association",
                record.id
            )));
        }
        self.check_uri(record.uri.as_deref(), record.id)?;
        self.unindex_topic(record.id);
        self.index_common(record.id, record.uri.as_deref(), &record.type_uri);
        self.value_index
            .entry((record.type_uri.clone(), record.value.clone()))
            .or_default()
            .insert(record.id);
        self.bump_next_id(record.id);
        self.topics.insert(record.id, record);
        Ok(())
    }

    pub(crate) fn put_assoc(&mut self, record: AssocRecord) -> Result<(), DmxError> {
        if self.topics.contains_key(&record.id) {
            return Err(DmxError::InvalidState(format!(
                "id {} already belongs to a topic",
                record.id
            )));
        }
        self.check_uri(record.uri.as_deref(), record.id)?;
        for role in [&record.role1, &record.role2] {
            if role.player.id() != record.id {
                self.check_player(role.player)?;
            }
        }
        self.insert_assoc(record);
        Ok(())
    }

    /// Index an association without checking its players. Used when loading
    /// a database, where a player may be stored after the association.
    pub(crate) fn insert_assoc(&mut self, record: AssocRecord) {
        self.unindex_assoc(record.id);
        self.index_common(record.id, record.uri.as_deref(), &record.type_uri);
        for role in [&record.role1, &record.role2] {
            self.membership
                .entry(role.player.id())
                .or_default()
                .insert(record.id);
        }
        self.bump_next_id(record.id);
        self.assocs.insert(record.id, record);
    }

    pub(crate) fn delete_topic(&mut self, id: ObjectId) -> Result<TopicRecord, DmxError> {
        let record = self.unindex_topic(id).ok_or(DmxError::TopicNotFound(id))?;
        self.drop_properties(id);
        Ok(record)
    }

    pub(crate) fn delete_assoc(&mut self, id: ObjectId) -> Result<AssocRecord, DmxError> {
        let record = self.unindex_assoc(id).ok_or(DmxError::AssocNotFound(id))?;
        self.drop_properties(id);
        Ok(record)
    }

    fn bump_next_id(&mut self, id: ObjectId) {
        self.next_id = self.next_id.max(id.0.saturating_add(1));
    }

    fn index_common(&mut self, id: ObjectId, uri: Option<&str>, type_uri: &str) {
        if let Some(uri) = uri {
            self.uri_index.insert(uri.to_string(), id);
        }
        self.type_index
            .entry(type_uri.to_string())
            .or_default()
            .insert(id);
    }

    fn unindex_common(&mut self, id: ObjectId, uri: Option<&str>, type_uri: &str) {
        if let Some(uri) = uri {
            self.uri_index.remove(uri);
        }
        remove_from(&mut self.type_index, type_uri.to_string(), id);
    }

    fn unindex_topic(&mut self, id: ObjectId) -> Option<TopicRecord> {
        let old = self.topics.remove(&id)?;
        self.unindex_common(id, old.uri.as_deref(), &old.type_uri);
        remove_from(&mut self.value_index, (old.type_uri.clone(), old.value.clone()), id);
        Some(old)
    }

    fn unindex_assoc(&mut self, id: ObjectId) -> Option<AssocRecord> {
        let old = self.assocs.remove(&id)?;
        self.unindex_common(id, old.uri.as_deref(), &old.type_uri);
        for role in [&old.role1, &old.role2] {
            remove_from(&mut self.membership, role.player.id(), id);
        }
        Some(old)
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    pub(crate) fn property(&self, id: ObjectId, key: &str) -> Option<&PropertyEntry> {
        self.properties.get(&id).and_then(|props| props.get(key))
    }

    pub(crate) fn store_property(
        &mut self,
        id: ObjectId,
        key: &str,
        value: SimpleValue,
        indexed: bool,
    ) -> Result<(), DmxError> {
        if !self.contains(id) {
            return Err(DmxError::ObjectNotFound(id));
        }
        self.remove_property(id, key);
        if indexed {
            self.property_index
                .entry((key.to_string(), value.clone()))
                .or_default()
                .insert(id);
        }
        self.properties
            .entry(id)
            .or_default()
            .insert(key.to_string(), PropertyEntry { value, indexed });
        Ok(())
    }

    pub(crate) fn remove_property(&mut self, id: ObjectId, key: &str) -> Option<PropertyEntry> {
        let props = self.properties.get_mut(&id)?;
        let old = props.remove(key)?;
        if props.is_empty() {
            self.properties.remove(&id);
        }
        if old.indexed {
            remove_from(&mut self.property_index, (key.to_string(), old.value.clone()), id);
        }
        Some(old)
    }

    fn drop_properties(&mut self, id: ObjectId) {
        let keys: Vec<String> = self
            .properties
            .get(&id)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();
        for key in keys {
            self.remove_property(id, &key);
        }
    }

    pub(crate) fn query_by_property(&self, key: &str, value: &SimpleValue) -> Vec<ObjectId> {
        self.property_index
            .get(&(key.to_string(), value.clone()))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn remove_from<K: Ord>(index: &mut BTreeMap<K, BTreeSet<ObjectId>>, key: K, id: ObjectId) {
    if let Some(ids) = index.get_mut(&key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(&key);
        }
    }
}
