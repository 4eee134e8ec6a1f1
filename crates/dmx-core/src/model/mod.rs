//! # Object Model
//!
//! In-memory projections of stored topics and associations.
//!
//! A model is a transient, thread-confined value: it is materialized for one
//! logical operation and dropped afterwards. Cross-object references are
//! always ids (`PlayerRef`), never owning pointers, so the hypergraph (where
//! associations may play roles in other associations) needs no cycles in
//! memory.
//!
//! Concrete kinds are flat structs composed from the shared `ObjectFields`
//! group, with capabilities expressed as small traits:
//! - `Identifiable`: id, URI, type URI, kind
//! - `HasSimpleValue`: the scalar value
//! - `HasChildTopics`: the composite value tree
//! - `HasCompDefs`: the ordered composition definitions of a type

mod assoc;
mod child_topics;
mod comp_def;
mod player;
mod topic;
mod topic_ref;
mod type_model;
mod view_config;

pub use assoc::AssocModel;
pub use child_topics::{ChildTopics, ChildValue, RelatedAssocModel, RelatedTopicModel};
pub use comp_def::{Cardinality, CompDefModel};
pub use player::{AssocPlayer, PlayerModel, PlayerRef, TopicPlayer};
pub use topic::TopicModel;
pub use topic_ref::TopicReference;
pub use type_model::{DataType, IndexMode, TypeKind, TypeModel, TypeView};
pub use view_config::{Configurable, ViewConfig};

use crate::{DmxError, ObjectId, ObjectKind, SimpleValue};

// =============================================================================
// CAPABILITY TRAITS
// =============================================================================

/// Identity of a topic or association.
pub trait Identifiable {
    /// The id, or `None` while the object is transient.
    fn id_opt(&self) -> Option<ObjectId>;

    /// The optional, globally unique URI.
    fn uri(&self) -> Option<&str>;

    /// URI of the object's type.
    fn type_uri(&self) -> &str;

    /// Topic or association.
    fn kind(&self) -> ObjectKind;

    /// The id. Reading it before storage assigned one is an `InvalidState` failure.
    fn id(&self) -> Result<ObjectId, DmxError> {
        self.id_opt().ok_or_else(|| {
            DmxError::InvalidState(format!(
                "id of transient {} of type \"{}\" read before it was assigned",
                self.kind().name(),
                self.type_uri()
            ))
        })
    }

    /// Id-based reference to this object as a role player.
    fn player_ref(&self) -> Result<PlayerRef, DmxError> {
        let id = self.id()?;
        Ok(match self.kind() {
            ObjectKind::Topic => PlayerRef::Topic(id),
            ObjectKind::Assoc => PlayerRef::Assoc(id),
        })
    }

    /// Short description for error messages and logs.
    fn describe(&self) -> String {
        format!(
            "{} {} (type \"{}\")",
            self.kind().name(),
            ObjectId::to_wire(self.id_opt()),
            self.type_uri()
        )
    }
}

/// The scalar value of an object.
pub trait HasSimpleValue {
    fn simple_value(&self) -> &SimpleValue;

    fn set_simple_value(&mut self, value: SimpleValue);

    /// Whether the value was given explicitly, as opposed to left empty.
    fn has_simple_value(&self) -> bool;
}

/// The composite value tree of an object.
pub trait HasChildTopics: Identifiable + HasSimpleValue {
    fn child_topics(&self) -> &ChildTopics;

    fn child_topics_mut(&mut self) -> &mut ChildTopics;
}

/// The ordered composition definitions of a type.
pub trait HasCompDefs {
    /// URI of the type owning the CompDefs.
    fn owner_uri(&self) -> &str;

    /// All CompDefs, in sequence order.
    fn comp_defs(&self) -> &[CompDefModel];

    /// The CompDef with the given URI.
    fn comp_def(&self, comp_def_uri: &str) -> Result<&CompDefModel, DmxError> {
        self.comp_defs()
            .iter()
            .find(|cd| cd.comp_def_uri() == comp_def_uri)
            .ok_or_else(|| DmxError::CompDefNotFound {
                type_uri: self.owner_uri().to_string(),
                comp_def_uri: comp_def_uri.to_string(),
            })
    }

    fn has_comp_def(&self, comp_def_uri: &str) -> bool {
        self.comp_defs()
            .iter()
            .any(|cd| cd.comp_def_uri() == comp_def_uri)
    }

    /// URIs of all CompDefs, in sequence order.
    fn comp_def_uris(&self) -> Vec<String> {
        self.comp_defs().iter().map(|cd| cd.comp_def_uri()).collect()
    }
}

// =============================================================================
// SHARED FIELD GROUP
// =============================================================================

/// Fields common to topics and associations.
///
/// `value_set` records whether the value was given explicitly. An update
/// without a value leaves the stored value alone. It takes no part in
/// equality.
#[derive(Debug, Clone, Default)]
pub struct ObjectFields {
    pub(crate) id: Option<ObjectId>,
    pub(crate) uri: Option<String>,
    pub(crate) type_uri: String,
    pub(crate) value: SimpleValue,
    pub(crate) value_set: bool,
    pub(crate) childs: ChildTopics,
}

impl PartialEq for ObjectFields {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.uri == other.uri
            && self.type_uri == other.type_uri
            && self.value == other.value
            && self.childs == other.childs
    }
}

impl Eq for ObjectFields {}

impl ObjectFields {
    pub(crate) fn new(type_uri: impl Into<String>) -> Self {
        Self {
            type_uri: type_uri.into(),
            ..Self::default()
        }
    }

    pub(crate) fn set_value(&mut self, value: SimpleValue) {
        self.value = value;
        self.value_set = true;
    }

    /// Wire fields shared by both kinds: `{id, uri, typeUri, value, childs}`.
    pub(crate) fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), ObjectId::to_wire(self.id).into());
        map.insert(
            "uri".into(),
            self.uri
                .as_ref()
                .map_or(serde_json::Value::Null, |u| u.clone().into()),
        );
        map.insert("typeUri".into(), self.type_uri.clone().into());
        map.insert("value".into(), self.value.to_json());
        map.insert("childs".into(), self.childs.to_json());
        map
    }
}

/// Implement the capability traits for a struct with a `fields: ObjectFields` member.
macro_rules! impl_object_traits {
    ($ty:ty, $kind:expr) => {
        impl $crate::model::Identifiable for $ty {
            fn id_opt(&self) -> Option<$crate::ObjectId> {
                self.fields.id
            }

            fn uri(&self) -> Option<&str> {
                self.fields.uri.as_deref()
            }

            fn type_uri(&self) -> &str {
                &self.fields.type_uri
            }

            fn kind(&self) -> $crate::ObjectKind {
                $kind
            }
        }

        impl $crate::model::HasSimpleValue for $ty {
            fn simple_value(&self) -> &$crate::SimpleValue {
                &self.fields.value
            }

            fn set_simple_value(&mut self, value: $crate::SimpleValue) {
                self.fields.set_value(value);
            }

            fn has_simple_value(&self) -> bool {
                self.fields.value_set
            }
        }

        impl $crate::model::HasChildTopics for $ty {
            fn child_topics(&self) -> &$crate::model::ChildTopics {
                &self.fields.childs
            }

            fn child_topics_mut(&mut self) -> &mut $crate::model::ChildTopics {
                &mut self.fields.childs
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&self.to_json(), serializer)
            }
        }
    };
}

pub(crate) use impl_object_traits;

// =============================================================================
// EITHER KIND
// =============================================================================

/// A resolved role player: a topic or an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmxObject {
    Topic(TopicModel),
    Assoc(AssocModel),
}

impl DmxObject {
    #[must_use]
    pub fn as_topic(&self) -> Option<&TopicModel> {
        match self {
            Self::Topic(t) => Some(t),
            Self::Assoc(_) => None,
        }
    }

    #[must_use]
    pub fn as_assoc(&self) -> Option<&AssocModel> {
        match self {
            Self::Assoc(a) => Some(a),
            Self::Topic(_) => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Topic(t) => t.to_json(),
            Self::Assoc(a) => a.to_json(),
        }
    }

    fn inner(&self) -> &dyn Identifiable {
        match self {
            Self::Topic(t) => t,
            Self::Assoc(a) => a,
        }
    }
}

impl Identifiable for DmxObject {
    fn id_opt(&self) -> Option<ObjectId> {
        self.inner().id_opt()
    }

    fn uri(&self) -> Option<&str> {
        self.inner().uri()
    }

    fn type_uri(&self) -> &str {
        self.inner().type_uri()
    }

    fn kind(&self) -> ObjectKind {
        self.inner().kind()
    }
}
