//! Role players: the two endpoints of an association.

use super::{AssocModel, DmxObject, TopicModel};
use crate::storage::{RoleRecord, Storage};
use crate::{DmxError, ObjectId, ObjectKind};
use serde::{Deserialize, Serialize};

/// Id-based reference to a stored role player.
///
/// This is how roles are persisted: never an owning pointer, only the id
/// plus the discriminant telling which table to look in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlayerRef {
    Topic(ObjectId),
    Assoc(ObjectId),
}

impl PlayerRef {
    #[must_use]
    pub const fn id(self) -> ObjectId {
        match self {
            Self::Topic(id) | Self::Assoc(id) => id,
        }
    }

    #[must_use]
    pub const fn kind(self) -> ObjectKind {
        match self {
            Self::Topic(_) => ObjectKind::Topic,
            Self::Assoc(_) => ObjectKind::Assoc,
        }
    }

    /// Load the referenced object from storage.
    pub fn fetch(self, storage: &dyn Storage) -> Result<DmxObject, DmxError> {
        match self {
            Self::Topic(id) => storage
                .fetch_topic(id)?
                .map(|r| DmxObject::Topic(TopicModel::from_record(r)))
                .ok_or(DmxError::TopicNotFound(id)),
            Self::Assoc(id) => storage
                .fetch_assoc(id)?
                .map(|r| DmxObject::Assoc(AssocModel::from_record(r)))
                .ok_or(DmxError::AssocNotFound(id)),
        }
    }
}

/// A topic playing a role, referenced by id or by URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPlayer {
    pub topic_id: Option<ObjectId>,
    pub topic_uri: Option<String>,
    pub role_type_uri: String,
}

/// An association playing a role. Associations are referenced by id only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocPlayer {
    pub assoc_id: ObjectId,
    pub role_type_uri: String,
}

/// One end of an association: a role type plus a reference to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerModel {
    Topic(TopicPlayer),
    Assoc(AssocPlayer),
}

impl PlayerModel {
    /// A topic player referenced by id.
    #[must_use]
    pub fn topic(topic_id: ObjectId, role_type_uri: impl Into<String>) -> Self {
        Self::Topic(TopicPlayer {
            topic_id: Some(topic_id),
            topic_uri: None,
            role_type_uri: role_type_uri.into(),
        })
    }

    /// A topic player referenced by URI. The id is filled in by `resolve`.
    #[must_use]
    pub fn topic_by_uri(topic_uri: impl Into<String>, role_type_uri: impl Into<String>) -> Self {
        Self::Topic(TopicPlayer {
            topic_id: None,
            topic_uri: Some(topic_uri.into()),
            role_type_uri: role_type_uri.into(),
        })
    }

    /// An association player.
    #[must_use]
    pub fn assoc(assoc_id: ObjectId, role_type_uri: impl Into<String>) -> Self {
        Self::Assoc(AssocPlayer {
            assoc_id,
            role_type_uri: role_type_uri.into(),
        })
    }

    /// A player for an already resolved reference.
    #[must_use]
    pub fn from_ref(player: PlayerRef, role_type_uri: impl Into<String>) -> Self {
        match player {
            PlayerRef::Topic(id) => Self::topic(id, role_type_uri),
            PlayerRef::Assoc(id) => Self::assoc(id, role_type_uri),
        }
    }

    pub(crate) fn from_record(record: RoleRecord) -> Self {
        Self::from_ref(record.player, record.role_type_uri)
    }

    #[must_use]
    pub fn role_type_uri(&self) -> &str {
        match self {
            Self::Topic(p) => &p.role_type_uri,
            Self::Assoc(p) => &p.role_type_uri,
        }
    }

    /// The player id, if known. A topic referenced only by URI has none yet.
    #[must_use]
    pub fn player_id_opt(&self) -> Option<ObjectId> {
        match self {
            Self::Topic(p) => p.topic_id,
            Self::Assoc(p) => Some(p.assoc_id),
        }
    }

    /// The player id. Fails for a topic player that is referenced by URI and
    /// was not resolved yet.
    pub fn player_id(&self) -> Result<ObjectId, DmxError> {
        self.player_id_opt().ok_or_else(|| {
            DmxError::InvalidState(format!(
                "player of role \"{}\" is referenced by URI and not resolved yet",
                self.role_type_uri()
            ))
        })
    }

    pub fn player_ref(&self) -> Result<PlayerRef, DmxError> {
        let id = self.player_id()?;
        Ok(match self {
            Self::Topic(_) => PlayerRef::Topic(id),
            Self::Assoc(_) => PlayerRef::Assoc(id),
        })
    }

    /// Resolve a URI reference to an id, in place.
    ///
    /// A topic player with neither id nor URI, or with a URI naming no topic,
    /// is an `UnresolvedReference` failure.
    pub fn resolve(&mut self, storage: &dyn Storage) -> Result<PlayerRef, DmxError> {
        if let Self::Topic(p) = self
            && p.topic_id.is_none()
        {
            let uri = p.topic_uri.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
                DmxError::UnresolvedReference(format!(
                    "topic player of role \"{}\" has neither id nor URI",
                    p.role_type_uri
                ))
            })?;
            let record = storage.fetch_topic_by_uri(uri)?.ok_or_else(|| {
                DmxError::UnresolvedReference(format!("no topic with URI \"{}\"", uri))
            })?;
            p.topic_id = Some(record.id);
        }
        self.player_ref()
    }

    /// Load the full player object from storage.
    pub fn get_player(&self, storage: &dyn Storage) -> Result<DmxObject, DmxError> {
        self.player_ref()?.fetch(storage)
    }

    pub(crate) fn to_record(&self) -> Result<RoleRecord, DmxError> {
        Ok(RoleRecord {
            role_type_uri: self.role_type_uri().to_string(),
            player: self.player_ref()?,
        })
    }

    /// Wire form: `{topicId, topicUri, roleTypeUri}` or `{assocId, roleTypeUri}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Topic(p) => serde_json::json!({
                "topicId": ObjectId::to_wire(p.topic_id),
                "topicUri": p.topic_uri,
                "roleTypeUri": p.role_type_uri,
            }),
            Self::Assoc(p) => serde_json::json!({
                "assocId": p.assoc_id.0,
                "roleTypeUri": p.role_type_uri,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, TopicRecord};

    #[test]
    fn topic_player_by_uri_resolves_to_id() {
        let mut store = MemoryStore::new();
        let id = store.next_id().expect("id");
        store
            .put_topic(TopicRecord::new(id, Some("dmx.core.one"), "dmx.core.cardinality", "One"))
            .expect("put");

        let mut player = PlayerModel::topic_by_uri("dmx.core.one", "dmx.core.child");
        assert!(player.player_id().is_err());

        let resolved = player.resolve(&store).expect("resolve");
        assert_eq!(resolved, PlayerRef::Topic(id));
        assert_eq!(player.player_id().expect("id"), id);

        let object = player.get_player(&store).expect("player");
        assert_eq!(object.as_topic().map(|t| t.value().to_string()).as_deref(), Some("One"));
        assert!(object.as_assoc().is_none());
    }

    #[test]
    fn unknown_uri_is_unresolved_reference() {
        let store = MemoryStore::new();
        let mut player = PlayerModel::topic_by_uri("no.such.uri", "dmx.core.child");
        let err = player.resolve(&store).expect_err("unresolved");
        assert_eq!(err.kind(), crate::ErrorKind::UnresolvedReference);

        let mut empty = PlayerModel::topic_by_uri("", "dmx.core.child");
        assert_eq!(
            empty.resolve(&store).expect_err("empty").kind(),
            crate::ErrorKind::UnresolvedReference
        );
    }

    #[test]
    fn wire_shapes() {
        let t = PlayerModel::topic(ObjectId(5), "dmx.core.parent").to_json();
        assert_eq!(t["topicId"], 5);
        assert_eq!(t["roleTypeUri"], "dmx.core.parent");

        let a = PlayerModel::assoc(ObjectId(9), "dmx.core.child").to_json();
        assert_eq!(a["assocId"], 9);
        assert!(a.get("topicId").is_none());
    }
}
