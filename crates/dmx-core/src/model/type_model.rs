//! # Types
//!
//! Topic types and association types. A type is itself a topic (of type
//! `dmx.core.topic_type` or `dmx.core.assoc_type`) carrying a data type, an
//! ordered CompDef sequence, index modes and a view config.
//!
//! `TypeModel` is the canonical representation held by the type cache; every
//! schema mutation goes through it. Callers outside the core see a
//! `TypeView`: a clone filtered by read permission that has no mutating
//! operations at all.

use super::view_config::configurable_player_of;
use super::{
    CompDefModel, Configurable, HasCompDefs, Identifiable, PlayerModel, TopicModel, ViewConfig,
};
use crate::access::AccessControl;
use crate::constants::{
    ASSOC_TYPE, DATA_TYPE_COMPOSITE, DATA_TYPE_ENTITY, DATA_TYPE_IDENTITY, DATA_TYPE_VALUE,
    TOPIC_TYPE,
};
use crate::{DmxError, ObjectId, ObjectKind};

// =============================================================================
// CLASSIFIERS
// =============================================================================

/// The data type of a type's instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    /// Deduplicated by value.
    Value,
    /// Every instance is distinct.
    Identity,
    /// Association types with child topics.
    Composite,
    /// Reference-only placeholder.
    Entity,
}

impl DataType {
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Value => DATA_TYPE_VALUE,
            Self::Identity => DATA_TYPE_IDENTITY,
            Self::Composite => DATA_TYPE_COMPOSITE,
            Self::Entity => DATA_TYPE_ENTITY,
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self, DmxError> {
        match uri {
            DATA_TYPE_VALUE => Ok(Self::Value),
            DATA_TYPE_IDENTITY => Ok(Self::Identity),
            DATA_TYPE_COMPOSITE => Ok(Self::Composite),
            DATA_TYPE_ENTITY => Ok(Self::Entity),
            other => Err(DmxError::SchemaViolation(format!(
                "\"{}\" is not a data type URI",
                other
            ))),
        }
    }
}

/// Topic type or association type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKind {
    TopicType,
    AssocType,
}

impl TypeKind {
    /// Type URI of the type topic itself.
    #[must_use]
    pub const fn meta_type_uri(self) -> &'static str {
        match self {
            Self::TopicType => TOPIC_TYPE,
            Self::AssocType => ASSOC_TYPE,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TopicType => "topic type",
            Self::AssocType => "association type",
        }
    }

    pub fn from_meta_type_uri(uri: &str) -> Result<Self, DmxError> {
        match uri {
            TOPIC_TYPE => Ok(Self::TopicType),
            ASSOC_TYPE => Ok(Self::AssocType),
            other => Err(DmxError::SchemaViolation(format!(
                "\"{}\" is neither a topic type nor an association type",
                other
            ))),
        }
    }

    /// Check that `data_type` is legal for this kind.
    fn validate(self, type_uri: &str, data_type: DataType) -> Result<(), DmxError> {
        let (forbidden, remedy) = match self {
            Self::TopicType => (
                matches!(data_type, DataType::Composite),
                format!("\"{}\" or \"{}\"", DATA_TYPE_VALUE, DATA_TYPE_IDENTITY),
            ),
            Self::AssocType => (
                matches!(data_type, DataType::Value | DataType::Identity),
                format!("\"{}\"", DATA_TYPE_COMPOSITE),
            ),
        };
        if forbidden {
            return Err(DmxError::SchemaViolation(format!(
                "{} \"{}\" can't have data type \"{}\", use {}",
                self.name(),
                type_uri,
                data_type.uri(),
                remedy
            )));
        }
        Ok(())
    }
}

/// How instances of a type are indexed by the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexMode {
    Key,
    Fulltext,
    FulltextKey,
}

impl IndexMode {
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Key => "dmx.core.key",
            Self::Fulltext => "dmx.core.fulltext",
            Self::FulltextKey => "dmx.core.fulltext_key",
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self, DmxError> {
        match uri {
            "dmx.core.key" => Ok(Self::Key),
            "dmx.core.fulltext" => Ok(Self::Fulltext),
            "dmx.core.fulltext_key" => Ok(Self::FulltextKey),
            other => Err(DmxError::SchemaViolation(format!(
                "\"{}\" is not an index mode URI",
                other
            ))),
        }
    }
}

// =============================================================================
// CANONICAL TYPE
// =============================================================================

/// The canonical representation of a topic type or association type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeModel {
    topic: TopicModel,
    uri: String,
    kind: TypeKind,
    data_type: DataType,
    comp_defs: Vec<CompDefModel>,
    index_modes: Vec<IndexMode>,
    view_config: ViewConfig,
}

impl TypeModel {
    /// A new topic type. Data type `composite` is a `SchemaViolation`.
    pub fn topic_type(
        uri: impl Into<String>,
        label: impl Into<String>,
        data_type: DataType,
    ) -> Result<Self, DmxError> {
        Self::checked(TypeKind::TopicType, uri.into(), label.into(), data_type)
    }

    /// A new association type. Data types `value` and `identity` are a
    /// `SchemaViolation`.
    pub fn assoc_type(
        uri: impl Into<String>,
        label: impl Into<String>,
        data_type: DataType,
    ) -> Result<Self, DmxError> {
        Self::checked(TypeKind::AssocType, uri.into(), label.into(), data_type)
    }

    fn checked(kind: TypeKind, uri: String, label: String, data_type: DataType) -> Result<Self, DmxError> {
        kind.validate(&uri, data_type)?;
        Ok(Self::unchecked(kind, uri, label, data_type))
    }

    /// Construct without validating the data type. Bootstrap only.
    pub(crate) fn unchecked(kind: TypeKind, uri: String, label: String, data_type: DataType) -> Self {
        let topic = TopicModel::new(kind.meta_type_uri())
            .with_uri(uri.clone())
            .with_value(label);
        Self {
            topic,
            uri,
            kind,
            data_type,
            comp_defs: Vec::new(),
            index_modes: Vec::new(),
            view_config: ViewConfig::default(),
        }
    }

    #[must_use]
    pub fn type_kind(&self) -> TypeKind {
        self.kind
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.topic.value().to_string()
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Change the data type, validated like construction.
    pub fn set_data_type(&mut self, data_type: DataType) -> Result<(), DmxError> {
        self.kind.validate(&self.uri, data_type)?;
        self.data_type = data_type;
        Ok(())
    }

    /// A type without CompDefs holds a simple value only.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.comp_defs.is_empty()
    }

    /// The type topic.
    #[must_use]
    pub fn topic(&self) -> &TopicModel {
        &self.topic
    }

    pub(crate) fn topic_mut(&mut self) -> &mut TopicModel {
        &mut self.topic
    }

    pub(crate) fn comp_defs_mut(&mut self) -> &mut [CompDefModel] {
        &mut self.comp_defs
    }

    fn position(&self, comp_def_uri: &str) -> Result<usize, DmxError> {
        self.comp_defs
            .iter()
            .position(|cd| cd.comp_def_uri() == comp_def_uri)
            .ok_or_else(|| DmxError::CompDefNotFound {
                type_uri: self.uri.clone(),
                comp_def_uri: comp_def_uri.to_string(),
            })
    }

    fn check_insertable(&self, comp_def: &CompDefModel) -> Result<(), DmxError> {
        if comp_def.parent_type_uri() != self.uri {
            return Err(DmxError::SchemaViolation(format!(
                "comp def \"{}\" has parent type \"{}\", expected \"{}\"",
                comp_def.comp_def_uri(),
                comp_def.parent_type_uri(),
                self.uri
            )));
        }
        if self.has_comp_def(&comp_def.comp_def_uri()) {
            return Err(DmxError::SchemaViolation(format!(
                "type \"{}\" already has comp def \"{}\"",
                self.uri,
                comp_def.comp_def_uri()
            )));
        }
        Ok(())
    }

    /// Append a CompDef.
    pub fn add_comp_def(&mut self, comp_def: CompDefModel) -> Result<(), DmxError> {
        self.check_insertable(&comp_def)?;
        self.comp_defs.push(comp_def);
        Ok(())
    }

    /// Insert a CompDef before the named sibling, which must exist.
    pub fn add_comp_def_before(
        &mut self,
        comp_def: CompDefModel,
        before_comp_def_uri: &str,
    ) -> Result<(), DmxError> {
        let index = self.position(before_comp_def_uri)?;
        self.check_insertable(&comp_def)?;
        self.comp_defs.insert(index, comp_def);
        Ok(())
    }

    /// Remove a CompDef, keeping the order of the rest.
    pub fn remove_comp_def(&mut self, comp_def_uri: &str) -> Result<CompDefModel, DmxError> {
        let index = self.position(comp_def_uri)?;
        Ok(self.comp_defs.remove(index))
    }

    /// URIs of the CompDefs consulted for the label, in CompDef order.
    ///
    /// These are the CompDefs flagged `include_in_label`. A type with CompDefs
    /// but no flagged one is labeled by its first CompDef.
    #[must_use]
    pub fn label_config(&self) -> Vec<String> {
        label_config_of(&self.comp_defs)
    }

    /// Flag exactly the named CompDefs as label CompDefs.
    pub fn set_label_config(&mut self, comp_def_uris: &[&str]) -> Result<(), DmxError> {
        for uri in comp_def_uris {
            self.position(uri)?;
        }
        for comp_def in &mut self.comp_defs {
            let included = comp_def_uris.contains(&comp_def.comp_def_uri().as_str());
            comp_def.set_include_in_label(included);
        }
        Ok(())
    }

    #[must_use]
    pub fn index_modes(&self) -> &[IndexMode] {
        &self.index_modes
    }

    pub fn set_index_modes(&mut self, index_modes: Vec<IndexMode>) {
        self.index_modes = index_modes;
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.topic.set_id(id);
    }

    /// The userland view: only CompDefs readable under `acl`, no mutators.
    #[must_use]
    pub fn view(&self, acl: &dyn AccessControl) -> TypeView {
        let mut inner = self.clone();
        inner.comp_defs.retain(|cd| acl.has_read_permission(cd));
        TypeView { inner }
    }

    /// Wire form: the type topic plus `dataTypeUri`, `compDefs`,
    /// `indexModeUris` and `viewConfigTopics`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = self.topic.to_json();
        if let Some(obj) = json.as_object_mut() {
            obj.insert("dataTypeUri".into(), self.data_type.uri().into());
            obj.insert(
                "compDefs".into(),
                serde_json::Value::Array(self.comp_defs.iter().map(CompDefModel::to_json).collect()),
            );
            obj.insert(
                "indexModeUris".into(),
                serde_json::Value::Array(
                    self.index_modes.iter().map(|m| m.uri().into()).collect(),
                ),
            );
            obj.insert("viewConfigTopics".into(), self.view_config.to_json());
        }
        json
    }

    /// Parse a type definition. Validates like the constructors.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, DmxError> {
        let field = |key: &str| json.get(key).and_then(|v| v.as_str());
        let uri = field("uri")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DmxError::SerializationError("type needs a \"uri\"".to_string()))?;
        let kind = TypeKind::from_meta_type_uri(field("typeUri").unwrap_or(TOPIC_TYPE))?;
        let label = json
            .get("value")
            .map(crate::SimpleValue::from_json)
            .transpose()?
            .map(|v| v.to_string())
            .unwrap_or_default();
        let data_type = DataType::from_uri(field("dataTypeUri").unwrap_or(DATA_TYPE_VALUE))?;
        let mut model = Self::checked(kind, uri.to_string(), label, data_type)?;

        if let Some(comp_defs) = json.get("compDefs").and_then(|v| v.as_array()) {
            for comp_def in comp_defs {
                model.add_comp_def(CompDefModel::from_json(comp_def, uri)?)?;
            }
        }
        if let Some(modes) = json.get("indexModeUris").and_then(|v| v.as_array()) {
            model.index_modes = modes
                .iter()
                .filter_map(|m| m.as_str())
                .map(IndexMode::from_uri)
                .collect::<Result<_, _>>()?;
        }
        if let Some(view_config) = json.get("viewConfigTopics") {
            model.view_config = ViewConfig::from_json(view_config)?;
        }
        Ok(model)
    }
}

fn label_config_of(comp_defs: &[CompDefModel]) -> Vec<String> {
    let flagged: Vec<String> = comp_defs
        .iter()
        .filter(|cd| cd.include_in_label())
        .map(CompDefModel::comp_def_uri)
        .collect();
    if flagged.is_empty() {
        comp_defs.first().map(CompDefModel::comp_def_uri).into_iter().collect()
    } else {
        flagged
    }
}

impl HasCompDefs for TypeModel {
    fn owner_uri(&self) -> &str {
        &self.uri
    }

    fn comp_defs(&self) -> &[CompDefModel] {
        &self.comp_defs
    }
}

impl Identifiable for TypeModel {
    fn id_opt(&self) -> Option<ObjectId> {
        self.topic.id_opt()
    }

    fn uri(&self) -> Option<&str> {
        Some(&self.uri)
    }

    fn type_uri(&self) -> &str {
        self.topic.type_uri()
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Topic
    }
}

impl Configurable for TypeModel {
    fn view_config(&self) -> &ViewConfig {
        &self.view_config
    }

    fn view_config_mut(&mut self) -> &mut ViewConfig {
        &mut self.view_config
    }

    fn configurable_player(&self) -> Result<PlayerModel, DmxError> {
        configurable_player_of(&self.topic)
    }
}

// =============================================================================
// USERLAND VIEW
// =============================================================================

/// Read-only, permission-filtered clone of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeView {
    inner: TypeModel,
}

impl TypeView {
    #[must_use]
    pub fn type_kind(&self) -> TypeKind {
        self.inner.kind
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.inner.label()
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.inner.data_type
    }

    #[must_use]
    pub fn label_config(&self) -> Vec<String> {
        self.inner.label_config()
    }

    #[must_use]
    pub fn index_modes(&self) -> &[IndexMode] {
        &self.inner.index_modes
    }

    #[must_use]
    pub fn view_config(&self) -> &ViewConfig {
        &self.inner.view_config
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.inner.to_json()
    }
}

impl HasCompDefs for TypeView {
    fn owner_uri(&self) -> &str {
        &self.inner.uri
    }

    fn comp_defs(&self) -> &[CompDefModel] {
        &self.inner.comp_defs
    }
}

impl Identifiable for TypeView {
    fn id_opt(&self) -> Option<ObjectId> {
        self.inner.id_opt()
    }

    fn uri(&self) -> Option<&str> {
        Some(&self.inner.uri)
    }

    fn type_uri(&self) -> &str {
        self.inner.topic.type_uri()
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Topic
    }
}

impl serde::Serialize for TypeView {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.to_json(), serializer)
    }
}
