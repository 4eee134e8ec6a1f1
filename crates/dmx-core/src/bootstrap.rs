//! # Bootstrap
//!
//! The type system is itself stored as types, so the first types can't be
//! validated against a schema that doesn't exist yet. Installation runs in
//! two explicit phases:
//!
//! 1. the meta model is written raw: data type, cardinality and role type
//!    topics, the meta types, and the topic and association types the schema
//!    storage relies on. Nothing is validated.
//! 2. the type cache is loaded from what phase 1 wrote, and every further
//!    default goes through the validating constructors and value storage.
//!
//! Both phases are idempotent.

use crate::constants::{
    ASSOC_TYPE, ASSOCIATION, CARDINALITY, CARDINALITY_MANY, CARDINALITY_ONE, COMPOSITION,
    COMPOSITION_DEF, CONFIGURATION, DATA_TYPE, META_TYPE, ROLE_CHILD, ROLE_CHILD_TYPE,
    ROLE_CONFIGURABLE, ROLE_DEFAULT, ROLE_PARENT, ROLE_PARENT_TYPE, ROLE_PREDECESSOR,
    ROLE_SUCCESSOR, ROLE_TYPE, ROLE_VIEW_CONFIG, SEQUENCE, TOPIC_TYPE,
};
use crate::context::OpContext;
use crate::model::{DataType, Identifiable, TopicModel, TypeKind, TypeModel};
use crate::storage::{Storage, TopicRecord};
use crate::type_storage::{self, TypeCache};
use crate::value_storage::ValueStorage;
use crate::DmxError;

const DATA_TYPES: [(DataType, &str); 4] = [
    (DataType::Value, "Value"),
    (DataType::Identity, "Identity"),
    (DataType::Composite, "Composite"),
    (DataType::Entity, "Entity"),
];

const CARDINALITIES: [(&str, &str); 2] = [(CARDINALITY_ONE, "One"), (CARDINALITY_MANY, "Many")];

const ROLE_TYPES: [(&str, &str); 8] = [
    (ROLE_PARENT, "Parent"),
    (ROLE_CHILD, "Child"),
    (ROLE_PARENT_TYPE, "Parent Type"),
    (ROLE_CHILD_TYPE, "Child Type"),
    (ROLE_PREDECESSOR, "Predecessor"),
    (ROLE_SUCCESSOR, "Successor"),
    (ROLE_CONFIGURABLE, "Configurable"),
    (ROLE_VIEW_CONFIG, "View Config"),
];

const META_TYPES: [(&str, &str); 3] = [
    (META_TYPE, "Meta Type"),
    (TOPIC_TYPE, "Topic Type"),
    (ASSOC_TYPE, "Association Type"),
];

const CORE_TOPIC_TYPES: [(&str, &str); 3] = [
    (DATA_TYPE, "Data Type"),
    (CARDINALITY, "Cardinality"),
    (ROLE_TYPE, "Role Type"),
];

const CORE_ASSOC_TYPES: [(&str, &str); 4] = [
    (COMPOSITION, "Composition"),
    (COMPOSITION_DEF, "Composition Definition"),
    (SEQUENCE, "Sequence"),
    (CONFIGURATION, "Configuration"),
];

/// Install the meta model if missing and load the type cache.
pub fn bootstrap(storage: &mut dyn Storage) -> Result<TypeCache, DmxError> {
    if storage.fetch_topic_by_uri(TOPIC_TYPE)?.is_none() {
        install_meta_model(storage)?;
        tracing::info!("meta model installed");
    }
    let mut types = TypeCache::load(storage)?;
    if !types.contains(ASSOCIATION) {
        install_defaults(storage, &mut types)?;
        tracing::info!("default types installed");
    }
    Ok(types)
}

// =============================================================================
// PHASE 1: RAW
// =============================================================================

fn install_meta_model(storage: &mut dyn Storage) -> Result<(), DmxError> {
    for (data_type, label) in DATA_TYPES {
        put_raw_topic(storage, data_type.uri(), DATA_TYPE, label)?;
    }
    for (uri, label) in CARDINALITIES {
        put_raw_topic(storage, uri, CARDINALITY, label)?;
    }
    for (uri, label) in ROLE_TYPES {
        put_raw_topic(storage, uri, ROLE_TYPE, label)?;
    }

    let mut no_config = |_: &mut dyn Storage, topic: &mut TopicModel| -> Result<(), DmxError> {
        Err(DmxError::InvalidState(format!(
            "meta model type has a view config topic of type \"{}\"",
            topic.type_uri()
        )))
    };
    for (uri, label) in META_TYPES {
        let mut model = TypeModel::unchecked(TypeKind::TopicType, uri.to_string(), label.to_string(), DataType::Value);
        model.topic_mut().set_type_uri_field(META_TYPE);
        type_storage::store_type(storage, &mut model, &mut no_config)?;
    }
    for (uri, label) in CORE_TOPIC_TYPES {
        let mut model = TypeModel::unchecked(TypeKind::TopicType, uri.to_string(), label.to_string(), DataType::Value);
        type_storage::store_type(storage, &mut model, &mut no_config)?;
    }
    for (uri, label) in CORE_ASSOC_TYPES {
        let mut model =
            TypeModel::unchecked(TypeKind::AssocType, uri.to_string(), label.to_string(), DataType::Composite);
        type_storage::store_type(storage, &mut model, &mut no_config)?;
    }
    Ok(())
}

fn put_raw_topic(storage: &mut dyn Storage, uri: &str, type_uri: &str, label: &str) -> Result<(), DmxError> {
    let id = storage.next_id()?;
    storage.put_topic(TopicRecord::new(id, Some(uri), type_uri, label))
}

// =============================================================================
// PHASE 2: VALIDATED
// =============================================================================

fn install_defaults(storage: &mut dyn Storage, types: &mut TypeCache) -> Result<(), DmxError> {
    let mut ctx = OpContext::new("bootstrap");
    if storage.fetch_topic_by_uri(ROLE_DEFAULT)?.is_none() {
        let mut role = TopicModel::new(ROLE_TYPE)
            .with_uri(ROLE_DEFAULT)
            .with_value("Default");
        ValueStorage::new(storage, types, &mut ctx).create_topic(&mut role)?;
    }

    let mut model = TypeModel::assoc_type(ASSOCIATION, "Association", DataType::Composite)?;
    {
        let types: &TypeCache = types;
        let ctx = &mut ctx;
        let mut write_config = |storage: &mut dyn Storage, topic: &mut TopicModel| {
            ValueStorage::new(storage, types, &mut *ctx).create_topic(topic)
        };
        type_storage::store_type(storage, &mut model, &mut write_config)?;
    }
    types.insert(model);
    Ok(())
}
