//! Composition definitions: the typed, ordered links from a parent type to a
//! child type.

use super::view_config::configurable_player_of;
use super::{AssocModel, Configurable, Identifiable, PlayerModel, ViewConfig};
use crate::constants::{
    CARDINALITY_MANY, CARDINALITY_ONE, COMPOSITION, COMPOSITION_DEF, ROLE_CHILD_TYPE,
    ROLE_PARENT_TYPE,
};
use crate::{DmxError, ObjectId, ObjectKind};

/// Suffix appended to the child type URI when a CompDef has a custom
/// association type, so two CompDefs to the same child type stay distinct.
const CUSTOM_SUFFIX: &str = "#";

/// How many children a CompDef allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::One => CARDINALITY_ONE,
            Self::Many => CARDINALITY_MANY,
        }
    }

    /// Any URI other than `dmx.core.one`/`dmx.core.many` is a `SchemaViolation`.
    pub fn from_uri(uri: &str) -> Result<Self, DmxError> {
        match uri {
            CARDINALITY_ONE => Ok(Self::One),
            CARDINALITY_MANY => Ok(Self::Many),
            other => Err(DmxError::SchemaViolation(format!(
                "\"{}\" is an unexpected cardinality URI",
                other
            ))),
        }
    }
}

/// A CompDef, stored as a `dmx.core.composition_def` association between the
/// parent type topic and the child type topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompDefModel {
    assoc: AssocModel,
    parent_type_uri: String,
    child_type_uri: String,
    custom_assoc_type_uri: Option<String>,
    child_cardinality_uri: String,
    include_in_label: bool,
    view_config: ViewConfig,
}

impl CompDefModel {
    /// A transient CompDef.
    #[must_use]
    pub fn new(
        parent_type_uri: impl Into<String>,
        child_type_uri: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self::from_parts(parent_type_uri, child_type_uri, cardinality.uri())
    }

    /// A CompDef whose cardinality URI is taken as stored. It is validated
    /// when read through [`CompDefModel::cardinality`].
    #[must_use]
    pub fn from_parts(
        parent_type_uri: impl Into<String>,
        child_type_uri: impl Into<String>,
        child_cardinality_uri: impl Into<String>,
    ) -> Self {
        let parent_type_uri = parent_type_uri.into();
        let child_type_uri = child_type_uri.into();
        let assoc = AssocModel::new(
            COMPOSITION_DEF,
            PlayerModel::topic_by_uri(parent_type_uri.clone(), ROLE_PARENT_TYPE),
            PlayerModel::topic_by_uri(child_type_uri.clone(), ROLE_CHILD_TYPE),
        );
        Self {
            assoc,
            parent_type_uri,
            child_type_uri,
            custom_assoc_type_uri: None,
            child_cardinality_uri: child_cardinality_uri.into(),
            include_in_label: false,
            view_config: ViewConfig::default(),
        }
    }

    #[must_use]
    pub fn with_custom_assoc_type(mut self, assoc_type_uri: impl Into<String>) -> Self {
        self.custom_assoc_type_uri = Some(assoc_type_uri.into()).filter(|u| !u.is_empty());
        self
    }

    #[must_use]
    pub fn with_include_in_label(mut self, include: bool) -> Self {
        self.include_in_label = include;
        self
    }

    #[must_use]
    pub fn with_view_config(mut self, view_config: ViewConfig) -> Self {
        self.view_config = view_config;
        self
    }

    /// Identifier of this CompDef, unique within its parent type: the child
    /// type URI, qualified by the custom association type if there is one.
    #[must_use]
    pub fn comp_def_uri(&self) -> String {
        match &self.custom_assoc_type_uri {
            Some(custom) => format!("{}{}{}", self.child_type_uri, CUSTOM_SUFFIX, custom),
            None => self.child_type_uri.clone(),
        }
    }

    #[must_use]
    pub fn parent_type_uri(&self) -> &str {
        &self.parent_type_uri
    }

    #[must_use]
    pub fn child_type_uri(&self) -> &str {
        &self.child_type_uri
    }

    #[must_use]
    pub fn custom_assoc_type_uri(&self) -> Option<&str> {
        self.custom_assoc_type_uri.as_deref()
    }

    /// The association type used between parent and child instances.
    #[must_use]
    pub fn instance_level_assoc_type_uri(&self) -> &str {
        self.custom_assoc_type_uri.as_deref().unwrap_or(COMPOSITION)
    }

    #[must_use]
    pub fn child_cardinality_uri(&self) -> &str {
        &self.child_cardinality_uri
    }

    pub fn cardinality(&self) -> Result<Cardinality, DmxError> {
        Cardinality::from_uri(&self.child_cardinality_uri).map_err(|e| {
            e.context(format!(
                "comp def \"{}\" of type \"{}\"",
                self.comp_def_uri(),
                self.parent_type_uri
            ))
        })
    }

    #[must_use]
    pub fn include_in_label(&self) -> bool {
        self.include_in_label
    }

    pub fn set_include_in_label(&mut self, include: bool) {
        self.include_in_label = include;
    }

    /// The underlying `dmx.core.composition_def` association.
    #[must_use]
    pub fn assoc(&self) -> &AssocModel {
        &self.assoc
    }

    pub(crate) fn assoc_mut(&mut self) -> &mut AssocModel {
        &mut self.assoc
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.assoc.set_id(id);
    }

    /// Rebuild a CompDef around a stored association.
    pub(crate) fn with_assoc(mut self, assoc: AssocModel) -> Self {
        self.assoc = assoc;
        self
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = self.assoc.to_json();
        if let Some(obj) = json.as_object_mut() {
            obj.insert("compDefUri".into(), self.comp_def_uri().into());
            obj.insert("parentTypeUri".into(), self.parent_type_uri.clone().into());
            obj.insert("childTypeUri".into(), self.child_type_uri.clone().into());
            obj.insert(
                "customAssocTypeUri".into(),
                self.custom_assoc_type_uri
                    .clone()
                    .map_or(serde_json::Value::Null, Into::into),
            );
            obj.insert(
                "instanceLevelAssocTypeUri".into(),
                self.instance_level_assoc_type_uri().into(),
            );
            obj.insert(
                "childCardinalityUri".into(),
                self.child_cardinality_uri.clone().into(),
            );
            obj.insert("includeInLabel".into(), self.include_in_label.into());
            obj.insert("viewConfigTopics".into(), self.view_config.to_json());
        }
        json
    }

    /// Parse a CompDef. `parentTypeUri` may be omitted when the CompDef is
    /// part of a type definition; the caller supplies it.
    pub fn from_json(json: &serde_json::Value, parent_type_uri: &str) -> Result<Self, DmxError> {
        let field = |key: &str| json.get(key).and_then(|v| v.as_str());
        let child_type_uri = field("childTypeUri").ok_or_else(|| {
            DmxError::SerializationError("comp def needs a \"childTypeUri\"".to_string())
        })?;
        let cardinality = field("childCardinalityUri").unwrap_or(CARDINALITY_ONE);
        let mut comp_def = Self::from_parts(
            field("parentTypeUri").unwrap_or(parent_type_uri),
            child_type_uri,
            cardinality,
        );
        if let Some(custom) = field("customAssocTypeUri") {
            comp_def = comp_def.with_custom_assoc_type(custom);
        }
        if let Some(include) = json.get("includeInLabel").and_then(|v| v.as_bool()) {
            comp_def.include_in_label = include;
        }
        if let Some(view_config) = json.get("viewConfigTopics") {
            comp_def.view_config = ViewConfig::from_json(view_config)?;
        }
        Ok(comp_def)
    }
}

impl Identifiable for CompDefModel {
    fn id_opt(&self) -> Option<ObjectId> {
        self.assoc.id_opt()
    }

    fn uri(&self) -> Option<&str> {
        self.assoc.uri()
    }

    fn type_uri(&self) -> &str {
        self.assoc.type_uri()
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Assoc
    }
}

impl Configurable for CompDefModel {
    fn view_config(&self) -> &ViewConfig {
        &self.view_config
    }

    fn view_config_mut(&mut self) -> &mut ViewConfig {
        &mut self.view_config
    }

    fn configurable_player(&self) -> Result<PlayerModel, DmxError> {
        configurable_player_of(self)
    }
}
