//! Associations: typed hyperedges with exactly two roles.

use super::{ChildTopics, Identifiable, ObjectFields, PlayerModel, impl_object_traits};
use crate::storage::AssocRecord;
use crate::{DmxError, ObjectId, ObjectKind, SimpleValue};

/// A typed edge between two role players.
///
/// Either player may be a topic or another association. The association owns
/// its two roles; the roles reference their players by id (or topic URI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocModel {
    pub(crate) fields: ObjectFields,
    pub(crate) role1: PlayerModel,
    pub(crate) role2: PlayerModel,
}

impl_object_traits!(AssocModel, ObjectKind::Assoc);

impl AssocModel {
    /// A transient association of the given type.
    #[must_use]
    pub fn new(type_uri: impl Into<String>, role1: PlayerModel, role2: PlayerModel) -> Self {
        Self {
            fields: ObjectFields::new(type_uri),
            role1,
            role2,
        }
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.fields.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<SimpleValue>) -> Self {
        self.fields.set_value(value.into());
        self
    }

    #[must_use]
    pub fn role1(&self) -> &PlayerModel {
        &self.role1
    }

    #[must_use]
    pub fn role2(&self) -> &PlayerModel {
        &self.role2
    }

    pub(crate) fn roles_mut(&mut self) -> [&mut PlayerModel; 2] {
        [&mut self.role1, &mut self.role2]
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.fields.id = Some(id);
    }

    pub(crate) fn set_uri_field(&mut self, uri: Option<String>) {
        self.fields.uri = uri;
    }

    #[must_use]
    pub fn childs(&self) -> &ChildTopics {
        &self.fields.childs
    }

    #[must_use]
    pub fn value(&self) -> &SimpleValue {
        &self.fields.value
    }

    /// Whether both roles carry the same role type (a symmetric association).
    #[must_use]
    pub fn has_same_role_type_uris(&self) -> bool {
        self.role1.role_type_uri() == self.role2.role_type_uri()
    }

    /// Whether `player_id` plays either role.
    #[must_use]
    pub fn has_player(&self, player_id: ObjectId) -> bool {
        self.role1.player_id_opt() == Some(player_id) || self.role2.player_id_opt() == Some(player_id)
    }

    /// The id of the player on the other side of `player_id`.
    pub fn other_player_id(&self, player_id: ObjectId) -> Result<ObjectId, DmxError> {
        let id1 = self.role1.player_id()?;
        let id2 = self.role2.player_id()?;
        if id1 == player_id {
            Ok(id2)
        } else if id2 == player_id {
            Ok(id1)
        } else {
            Err(self.role_mismatch(player_id))
        }
    }

    /// Whether the two roles correspond to the given (role type, player id)
    /// pairs, in either assignment order.
    ///
    /// When both roles share a role type, types cannot tell the roles apart
    /// and the player ids alone decide.
    #[must_use]
    pub fn matches(
        &self,
        role_type_uri1: &str,
        player_id1: ObjectId,
        role_type_uri2: &str,
        player_id2: ObjectId,
    ) -> bool {
        let (Some(id1), Some(id2)) = (self.role1.player_id_opt(), self.role2.player_id_opt()) else {
            return false;
        };
        if self.has_same_role_type_uris() {
            return (id1 == player_id1 && id2 == player_id2) || (id1 == player_id2 && id2 == player_id1);
        }
        let rt1 = self.role1.role_type_uri();
        let rt2 = self.role2.role_type_uri();
        (rt1 == role_type_uri1 && id1 == player_id1 && rt2 == role_type_uri2 && id2 == player_id2)
            || (rt1 == role_type_uri2 && id1 == player_id2 && rt2 == role_type_uri1 && id2 == player_id1)
    }

    /// The role whose player has the same id as `player`.
    ///
    /// Matching is by player id only. If one player occupies both roles the
    /// first role is returned.
    pub fn role_for_player(&self, player: &PlayerModel) -> Result<&PlayerModel, DmxError> {
        let player_id = player.player_id()?;
        [&self.role1, &self.role2]
            .into_iter()
            .find(|role| role.player_id_opt() == Some(player_id))
            .ok_or_else(|| self.role_mismatch(player_id))
    }

    /// The role played by the object with the given role type, if any.
    #[must_use]
    pub fn role_by_type(&self, role_type_uri: &str) -> Option<&PlayerModel> {
        [&self.role1, &self.role2]
            .into_iter()
            .find(|role| role.role_type_uri() == role_type_uri)
    }

    fn role_mismatch(&self, player_id: ObjectId) -> DmxError {
        DmxError::RoleMismatch {
            assoc_id: ObjectId::to_wire(self.fields.id),
            player_id,
        }
    }

    pub(crate) fn from_record(record: AssocRecord) -> Self {
        Self {
            fields: ObjectFields {
                id: Some(record.id),
                uri: record.uri,
                type_uri: record.type_uri,
                value: record.value,
                value_set: true,
                childs: ChildTopics::default(),
            },
            role1: PlayerModel::from_record(record.role1),
            role2: PlayerModel::from_record(record.role2),
        }
    }

    pub(crate) fn to_record(&self) -> Result<AssocRecord, DmxError> {
        Ok(AssocRecord {
            id: self.id()?,
            uri: self.fields.uri.clone(),
            type_uri: self.fields.type_uri.clone(),
            value: self.fields.value.clone(),
            role1: self.role1.to_record()?,
            role2: self.role2.to_record()?,
        })
    }

    /// Wire form: the topic fields plus `role1` and `role2`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = self.fields.to_json();
        map.insert("role1".into(), self.role1.to_json());
        map.insert("role2".into(), self.role2.to_json());
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directed() -> AssocModel {
        let mut assoc = AssocModel::new(
            "dmx.core.composition",
            PlayerModel::topic(ObjectId(1), "dmx.core.parent"),
            PlayerModel::topic(ObjectId(2), "dmx.core.child"),
        );
        assoc.set_id(ObjectId(10));
        assoc
    }

    #[test]
    fn other_player_is_symmetric() {
        let assoc = directed();
        assert_eq!(assoc.other_player_id(ObjectId(1)).expect("other"), ObjectId(2));
        assert_eq!(assoc.other_player_id(ObjectId(2)).expect("other"), ObjectId(1));

        let err = assoc.other_player_id(ObjectId(3)).expect_err("stranger");
        assert_eq!(err.kind(), crate::ErrorKind::RoleMismatch);
    }

    #[test]
    fn mismatch_names_the_association() {
        let err = directed().other_player_id(ObjectId(3)).expect_err("stranger");
        assert_eq!(err.to_string(), "3 is not a player of association 10");

        let transient = AssocModel::new(
            "dmx.core.composition",
            PlayerModel::topic(ObjectId(1), "dmx.core.parent"),
            PlayerModel::topic(ObjectId(2), "dmx.core.child"),
        );
        let err = transient.other_player_id(ObjectId(3)).expect_err("stranger");
        assert!(matches!(err, DmxError::RoleMismatch { assoc_id: -1, .. }));
    }

    #[test]
    fn matches_in_either_order() {
        let assoc = directed();
        assert!(assoc.matches("dmx.core.parent", ObjectId(1), "dmx.core.child", ObjectId(2)));
        assert!(assoc.matches("dmx.core.child", ObjectId(2), "dmx.core.parent", ObjectId(1)));
        assert!(!assoc.matches("dmx.core.child", ObjectId(1), "dmx.core.parent", ObjectId(2)));
    }

    #[test]
    fn symmetric_assoc_matches_on_ids_only() {
        let assoc = AssocModel::new(
            "dmx.core.association",
            PlayerModel::topic(ObjectId(1), "dmx.core.default"),
            PlayerModel::topic(ObjectId(2), "dmx.core.default"),
        );
        assert!(assoc.has_same_role_type_uris());
        assert!(assoc.matches("x", ObjectId(1), "y", ObjectId(2)));
        assert!(assoc.matches("y", ObjectId(2), "x", ObjectId(1)));
        assert!(!assoc.matches("dmx.core.default", ObjectId(1), "dmx.core.default", ObjectId(3)));
    }

    #[test]
    fn role_for_player_by_id() {
        let assoc = directed();
        let role = assoc
            .role_for_player(&PlayerModel::topic(ObjectId(2), "ignored"))
            .expect("role");
        assert_eq!(role.role_type_uri(), "dmx.core.child");
        assert!(assoc.role_for_player(&PlayerModel::topic(ObjectId(7), "x")).is_err());
    }

    #[test]
    fn assoc_can_play_a_role() {
        let outer = AssocModel::new(
            "dmx.core.composition",
            PlayerModel::assoc(ObjectId(10), "dmx.core.parent"),
            PlayerModel::topic(ObjectId(5), "dmx.core.child"),
        );
        assert!(outer.has_player(ObjectId(10)));
        let json = outer.to_json();
        assert_eq!(json["role1"]["assocId"], 10);
        assert_eq!(json["role2"]["topicId"], 5);
    }
}
