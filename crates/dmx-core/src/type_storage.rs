//! # Type Storage
//!
//! Types are ordinary graph data:
//! - the type is a topic of type `dmx.core.topic_type`/`dmx.core.assoc_type`
//!   (or `dmx.core.meta_type` for the meta types), linked to its data type
//!   topic by a `dmx.core.composition` association
//! - each CompDef is a `dmx.core.composition_def` association between the
//!   parent and child type topics
//! - cardinality and custom association type hang off the CompDef
//!   association itself, which plays the parent role
//! - CompDef order is a chain of `dmx.core.sequence` associations starting at
//!   the type topic
//! - `include_in_label` is a CompDef property, index modes a type property
//! - view config topics are attached with `dmx.core.configuration`
//!
//! [`TypeCache`] holds the canonical models, loaded eagerly.

use crate::constants::{
    ASSOC_TYPE, CARDINALITY, COMPOSITION, CONFIGURATION, DATA_TYPE, META_TYPE,
    PROP_INCLUDE_IN_LABEL, PROP_INDEX_MODES, ROLE_CHILD, ROLE_CHILD_TYPE, ROLE_CONFIGURABLE,
    ROLE_PARENT, ROLE_PARENT_TYPE, ROLE_PREDECESSOR, ROLE_SUCCESSOR, ROLE_VIEW_CONFIG, SEQUENCE,
    TOPIC_TYPE,
};
use crate::fetcher::ChildTopicsFetcher;
use crate::model::{
    AssocModel, CompDefModel, Configurable, DataType, HasCompDefs, Identifiable, IndexMode,
    PlayerModel, PlayerRef, TopicModel, TypeKind, TypeModel, ViewConfig,
};
use crate::storage::{AssocRecord, RelatedFilter, RoleRecord, Storage, TopicRecord};
use crate::types::ResultExt;
use crate::{DmxError, ObjectId, SimpleValue};
use std::collections::{BTreeMap, BTreeSet};

const INDEX_MODE_SEPARATOR: &str = ",";

// =============================================================================
// TYPE CACHE
// =============================================================================

/// The canonical type models, keyed by type URI.
#[derive(Debug, Clone, Default)]
pub struct TypeCache {
    types: BTreeMap<String, TypeModel>,
}

impl TypeCache {
    /// Load every stored type.
    ///
    /// Runs in two passes: first the schema, then the child topics of view
    /// config topics, which need the schema to be fetched.
    pub fn load(storage: &dyn Storage) -> Result<Self, DmxError> {
        let mut types = BTreeMap::new();
        for meta in [META_TYPE, TOPIC_TYPE, ASSOC_TYPE] {
            for record in storage.query_topics(meta)? {
                let uri = record.uri.clone().unwrap_or_default();
                let model = fetch_type(storage, record)
                    .with_context(|| format!("loading type \"{}\"", uri))?;
                types.insert(uri, model);
            }
        }

        let schema = Self { types };
        let fetcher = ChildTopicsFetcher::new(storage, &schema);
        let mut completed = BTreeMap::new();
        for (uri, model) in &schema.types {
            let mut model = model.clone();
            for topic in model.view_config_mut().config_topics_mut() {
                fetcher.fetch_all(topic, true)?;
            }
            for comp_def in model.comp_defs_mut() {
                for topic in comp_def.view_config_mut().config_topics_mut() {
                    fetcher.fetch_all(topic, true)?;
                }
            }
            completed.insert(uri.clone(), model);
        }
        tracing::debug!(types = completed.len(), "type cache loaded");
        Ok(Self { types: completed })
    }

    /// Any type, topic or association.
    pub fn get(&self, uri: &str) -> Result<&TypeModel, DmxError> {
        self.types
            .get(uri)
            .ok_or_else(|| DmxError::TypeNotFound(uri.to_string()))
    }

    pub fn get_topic_type(&self, uri: &str) -> Result<&TypeModel, DmxError> {
        self.get_kind(uri, TypeKind::TopicType)
    }

    pub fn get_assoc_type(&self, uri: &str) -> Result<&TypeModel, DmxError> {
        self.get_kind(uri, TypeKind::AssocType)
    }

    fn get_kind(&self, uri: &str, kind: TypeKind) -> Result<&TypeModel, DmxError> {
        let model = self.get(uri)?;
        if model.type_kind() != kind {
            return Err(DmxError::SchemaViolation(format!(
                "\"{}\" is a {}, not a {}",
                uri,
                model.type_kind().name(),
                kind.name()
            )));
        }
        Ok(model)
    }

    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.types.contains_key(uri)
    }

    pub(crate) fn insert(&mut self, model: TypeModel) {
        let uri = model.owner_uri().to_string();
        self.types.insert(uri, model);
    }

    pub(crate) fn remove(&mut self, uri: &str) -> Option<TypeModel> {
        self.types.remove(uri)
    }

    /// All types of one kind, in URI order.
    pub fn of_kind(&self, kind: TypeKind) -> impl Iterator<Item = &TypeModel> {
        self.types.values().filter(move |t| t.type_kind() == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// =============================================================================
// WRITING
// =============================================================================

/// Stores one view config topic, assigning its id.
pub(crate) type ConfigTopicWriter<'w> =
    dyn FnMut(&mut dyn Storage, &mut TopicModel) -> Result<(), DmxError> + 'w;

/// Store a new type with all its parts. Assigns ids on the model.
pub(crate) fn store_type(
    storage: &mut dyn Storage,
    model: &mut TypeModel,
    write_config: &mut ConfigTopicWriter<'_>,
) -> Result<(), DmxError> {
    let uri = model.owner_uri().to_string();
    if storage.fetch_topic_by_uri(&uri)?.is_some() {
        return Err(DmxError::SchemaViolation(format!(
            "type URI \"{}\" is already taken",
            uri
        )));
    }
    let id = storage.next_id()?;
    model.set_id(id);
    storage.put_topic(model.topic().to_record()?)?;
    store_type_parts(storage, model, &BTreeSet::new(), write_config)
        .with_context(|| format!("storing type \"{}\"", uri))
}

/// Rewrite the stored schema of an existing type: label, data type, index
/// modes, CompDefs and view config. The type topic keeps its id and URI.
/// CompDefs that are still stored keep their association id, removed ones
/// are deleted and new ones get a fresh id. View config topics are recreated.
pub(crate) fn rewrite_type(
    storage: &mut dyn Storage,
    model: &mut TypeModel,
    write_config: &mut ConfigTopicWriter<'_>,
) -> Result<(), DmxError> {
    let id = model.id()?;
    let uri = model.owner_uri().to_string();
    let stored = storage
        .fetch_topic(id)?
        .ok_or(DmxError::TopicNotFound(id))?;
    if stored.uri.as_deref() != Some(uri.as_str()) {
        return Err(DmxError::InvalidState(format!(
            "type {} has URI {:?}, can't change it to \"{}\"",
            id, stored.uri, uri
        )));
    }
    let wanted: BTreeSet<ObjectId> = model.comp_defs().iter().filter_map(|c| c.id_opt()).collect();
    let kept: BTreeSet<ObjectId> = fetch_comp_def_records(storage, PlayerRef::Topic(id))?
        .into_iter()
        .map(|record| record.id)
        .filter(|comp_def_id| wanted.contains(comp_def_id))
        .collect();
    delete_type_parts(storage, id, &kept)?;
    storage.put_topic(model.topic().to_record()?)?;
    store_type_parts(storage, model, &kept, write_config)
        .with_context(|| format!("rewriting type \"{}\"", uri))
}

/// Store everything but the type topic. CompDefs whose id is in `kept` are
/// written over their existing association.
fn store_type_parts(
    storage: &mut dyn Storage,
    model: &mut TypeModel,
    kept: &BTreeSet<ObjectId>,
    write_config: &mut ConfigTopicWriter<'_>,
) -> Result<(), DmxError> {
    let type_ref = model.player_ref()?;
    let data_type_id = topic_id_by_uri(storage, model.data_type().uri())?;
    put_link(storage, COMPOSITION, (type_ref, ROLE_PARENT), (PlayerRef::Topic(data_type_id), ROLE_CHILD))?;

    if !model.index_modes().is_empty() {
        let modes: Vec<&str> = model.index_modes().iter().map(|m| m.uri()).collect();
        storage.store_property(
            type_ref.id(),
            PROP_INDEX_MODES,
            SimpleValue::from(modes.join(INDEX_MODE_SEPARATOR)),
            false,
        )?;
    }

    let mut predecessor = type_ref;
    for comp_def in model.comp_defs_mut() {
        store_comp_def(storage, comp_def, kept, write_config)?;
        let comp_def_ref = comp_def.player_ref()?;
        put_link(
            storage,
            SEQUENCE,
            (predecessor, ROLE_PREDECESSOR),
            (comp_def_ref, ROLE_SUCCESSOR),
        )?;
        predecessor = comp_def_ref;
    }

    let player = model.configurable_player()?;
    store_view_config(storage, &player, model.view_config_mut(), write_config)
}

fn store_comp_def(
    storage: &mut dyn Storage,
    comp_def: &mut CompDefModel,
    kept: &BTreeSet<ObjectId>,
    write_config: &mut ConfigTopicWriter<'_>,
) -> Result<(), DmxError> {
    let context = format!(
        "storing comp def \"{}\" of type \"{}\"",
        comp_def.comp_def_uri(),
        comp_def.parent_type_uri()
    );
    store_comp_def_parts(storage, comp_def, kept, write_config).with_context(|| context)
}

fn store_comp_def_parts(
    storage: &mut dyn Storage,
    comp_def: &mut CompDefModel,
    kept: &BTreeSet<ObjectId>,
    write_config: &mut ConfigTopicWriter<'_>,
) -> Result<(), DmxError> {
    let cardinality = comp_def.cardinality()?;
    for role in comp_def.assoc_mut().roles_mut() {
        role.resolve(&*storage)?;
    }
    let id = match comp_def.id_opt() {
        Some(id) if kept.contains(&id) => id,
        _ => storage.next_id()?,
    };
    comp_def.set_id(id);
    storage.put_assoc(comp_def.assoc().to_record()?)?;

    let comp_def_ref = PlayerRef::Assoc(id);
    let cardinality_id = topic_id_by_uri(storage, cardinality.uri())?;
    put_link(
        storage,
        COMPOSITION,
        (comp_def_ref, ROLE_PARENT),
        (PlayerRef::Topic(cardinality_id), ROLE_CHILD),
    )?;
    if let Some(custom) = comp_def.custom_assoc_type_uri() {
        let custom_id = topic_id_by_uri(storage, custom)?;
        put_link(
            storage,
            COMPOSITION,
            (comp_def_ref, ROLE_PARENT),
            (PlayerRef::Topic(custom_id), ROLE_CHILD),
        )?;
    }
    storage.store_property(
        id,
        PROP_INCLUDE_IN_LABEL,
        SimpleValue::from(comp_def.include_in_label()),
        false,
    )?;
    let player = comp_def.configurable_player()?;
    store_view_config(storage, &player, comp_def.view_config_mut(), write_config)
}

fn store_view_config(
    storage: &mut dyn Storage,
    configurable: &PlayerModel,
    view_config: &mut ViewConfig,
    write_config: &mut ConfigTopicWriter<'_>,
) -> Result<(), DmxError> {
    let configurable = configurable.player_ref()?;
    for topic in view_config.config_topics_mut() {
        write_config(storage, topic)?;
        put_link(
            storage,
            CONFIGURATION,
            (configurable, ROLE_CONFIGURABLE),
            (topic.player_ref()?, ROLE_VIEW_CONFIG),
        )?;
    }
    Ok(())
}

/// Delete a type topic and everything its schema consists of.
pub(crate) fn delete_type(storage: &mut dyn Storage, type_id: ObjectId) -> Result<(), DmxError> {
    delete_type_parts(storage, type_id, &BTreeSet::new())?;
    delete_cascading(storage, PlayerRef::Topic(type_id))?;
    storage.delete_topic(type_id)
}

/// Delete the data type link, index modes, CompDefs and view config of a type.
/// CompDefs in `kept` lose their links, view config and sequence position
/// but the association itself stays.
fn delete_type_parts(
    storage: &mut dyn Storage,
    type_id: ObjectId,
    kept: &BTreeSet<ObjectId>,
) -> Result<(), DmxError> {
    let type_ref = PlayerRef::Topic(type_id);
    for comp_def in fetch_comp_def_records(storage, type_ref)? {
        delete_view_config(storage, PlayerRef::Assoc(comp_def.id))?;
        delete_cascading(storage, PlayerRef::Assoc(comp_def.id))?;
        if !kept.contains(&comp_def.id) {
            storage.delete_assoc(comp_def.id)?;
        }
    }
    delete_view_config(storage, type_ref)?;
    let data_type_filter = RelatedFilter::new()
        .assoc_type(COMPOSITION)
        .my_role(ROLE_PARENT)
        .others_role(ROLE_CHILD)
        .others_type(DATA_TYPE);
    for related in storage.fetch_related_topics(type_ref, &data_type_filter)? {
        storage.delete_assoc(related.assoc.id)?;
    }
    if storage.has_property(type_id, PROP_INDEX_MODES)? {
        storage.remove_property(type_id, PROP_INDEX_MODES)?;
    }
    Ok(())
}

fn delete_view_config(storage: &mut dyn Storage, configurable: PlayerRef) -> Result<(), DmxError> {
    for related in storage.fetch_related_topics(configurable, &view_config_filter())? {
        delete_cascading(storage, PlayerRef::Topic(related.object.id))?;
        storage.delete_topic(related.object.id)?;
    }
    Ok(())
}

/// Delete every association `player` plays a role in, recursively.
fn delete_cascading(storage: &mut dyn Storage, player: PlayerRef) -> Result<(), DmxError> {
    for assoc in storage.fetch_assocs_of(player)? {
        if storage.fetch_assoc(assoc.id)?.is_none() {
            continue;
        }
        delete_cascading(storage, PlayerRef::Assoc(assoc.id))?;
        storage.delete_assoc(assoc.id)?;
    }
    Ok(())
}

fn topic_id_by_uri(storage: &dyn Storage, uri: &str) -> Result<ObjectId, DmxError> {
    storage
        .fetch_topic_by_uri(uri)?
        .map(|t| t.id)
        .ok_or_else(|| DmxError::UnresolvedReference(format!("no topic with URI \"{}\"", uri)))
}

fn put_link(
    storage: &mut dyn Storage,
    assoc_type_uri: &str,
    (player1, role1): (PlayerRef, &str),
    (player2, role2): (PlayerRef, &str),
) -> Result<ObjectId, DmxError> {
    let id = storage.next_id()?;
    storage.put_assoc(AssocRecord {
        id,
        uri: None,
        type_uri: assoc_type_uri.to_string(),
        value: SimpleValue::default(),
        role1: RoleRecord::new(role1, player1),
        role2: RoleRecord::new(role2, player2),
    })?;
    Ok(id)
}

// =============================================================================
// READING
// =============================================================================

/// Read one type from its topic record. View config topics come back
/// without child topics; [`TypeCache::load`] fills those in.
pub(crate) fn fetch_type(storage: &dyn Storage, record: TopicRecord) -> Result<TypeModel, DmxError> {
    let kind = match record.type_uri.as_str() {
        ASSOC_TYPE => TypeKind::AssocType,
        _ => TypeKind::TopicType,
    };
    let type_id = record.id;
    let type_ref = PlayerRef::Topic(type_id);
    let uri = record.uri.clone().ok_or_else(|| {
        DmxError::InvalidState(format!("type topic {} has no URI", type_id))
    })?;

    let data_type_filter = RelatedFilter::new()
        .assoc_type(COMPOSITION)
        .my_role(ROLE_PARENT)
        .others_role(ROLE_CHILD)
        .others_type(DATA_TYPE);
    let data_type_uri = storage
        .fetch_related_topic(type_ref, &data_type_filter)?
        .and_then(|related| related.object.uri)
        .ok_or_else(|| DmxError::SchemaViolation(format!("type \"{}\" has no data type", uri)))?;
    let data_type = DataType::from_uri(&data_type_uri)?;

    let mut model = TypeModel::unchecked(kind, uri, record.value.to_string(), data_type);
    model.set_id(type_id);
    model.topic_mut().set_type_uri_field(record.type_uri);

    if storage.has_property(type_id, PROP_INDEX_MODES)? {
        let modes = storage.fetch_property(type_id, PROP_INDEX_MODES)?.to_string();
        model.set_index_modes(
            modes
                .split(INDEX_MODE_SEPARATOR)
                .filter(|m| !m.is_empty())
                .map(IndexMode::from_uri)
                .collect::<Result<_, _>>()?,
        );
    }

    for record in fetch_comp_def_records(storage, type_ref)? {
        let comp_def = fetch_comp_def(storage, record)?;
        model.add_comp_def(comp_def)?;
    }
    *model.view_config_mut() = fetch_view_config(storage, type_ref)?;
    Ok(model)
}

/// The CompDef associations of a type, in sequence order.
fn fetch_comp_def_records(storage: &dyn Storage, type_ref: PlayerRef) -> Result<Vec<AssocRecord>, DmxError> {
    let filter = RelatedFilter::new()
        .assoc_type(SEQUENCE)
        .my_role(ROLE_PREDECESSOR)
        .others_role(ROLE_SUCCESSOR);
    let mut records = Vec::new();
    let mut visited = BTreeSet::new();
    let mut current = type_ref;
    loop {
        let mut successors = storage.fetch_related_assocs(current, &filter)?;
        if successors.len() > 1 {
            return Err(DmxError::InvalidState(format!(
                "comp def sequence forks at {} {}",
                current.kind().name(),
                current.id()
            )));
        }
        let Some(next) = successors.pop() else {
            break;
        };
        if !visited.insert(next.object.id) {
            return Err(DmxError::InvalidState(format!(
                "comp def sequence of type topic {} has a cycle",
                type_ref.id()
            )));
        }
        current = PlayerRef::Assoc(next.object.id);
        records.push(next.object);
    }
    Ok(records)
}

fn fetch_comp_def(storage: &dyn Storage, record: AssocRecord) -> Result<CompDefModel, DmxError> {
    let id = record.id;
    let comp_def_ref = PlayerRef::Assoc(id);
    let type_uri_of = |role_type_uri: &str| -> Result<String, DmxError> {
        let role = [&record.role1, &record.role2]
            .into_iter()
            .find(|r| r.role_type_uri == role_type_uri)
            .ok_or_else(|| {
                DmxError::SchemaViolation(format!(
                    "comp def {} has no \"{}\" role",
                    id, role_type_uri
                ))
            })?;
        storage
            .fetch_topic(role.player.id())?
            .and_then(|t| t.uri)
            .ok_or(DmxError::TopicNotFound(role.player.id()))
    };
    let parent_type_uri = type_uri_of(ROLE_PARENT_TYPE)?;
    let child_type_uri = type_uri_of(ROLE_CHILD_TYPE)?;

    let part = |type_uri: &str| -> Result<Option<String>, DmxError> {
        let filter = RelatedFilter::new()
            .assoc_type(COMPOSITION)
            .my_role(ROLE_PARENT)
            .others_role(ROLE_CHILD)
            .others_type(type_uri);
        Ok(storage
            .fetch_related_topic(comp_def_ref, &filter)?
            .and_then(|related| related.object.uri))
    };
    let cardinality_uri = part(CARDINALITY)?.ok_or_else(|| {
        DmxError::SchemaViolation(format!(
            "comp def \"{}\" of type \"{}\" has no cardinality",
            child_type_uri, parent_type_uri
        ))
    })?;
    let custom_assoc_type_uri = part(ASSOC_TYPE)?;
    let include_in_label = if storage.has_property(id, PROP_INCLUDE_IN_LABEL)? {
        storage
            .fetch_property(id, PROP_INCLUDE_IN_LABEL)?
            .as_bool()
            .unwrap_or(false)
    } else {
        false
    };

    let mut comp_def = CompDefModel::from_parts(parent_type_uri, child_type_uri, cardinality_uri)
        .with_include_in_label(include_in_label)
        .with_view_config(fetch_view_config(storage, comp_def_ref)?)
        .with_assoc(AssocModel::from_record(record));
    if let Some(custom) = custom_assoc_type_uri {
        comp_def = comp_def.with_custom_assoc_type(custom);
    }
    Ok(comp_def)
}

fn view_config_filter() -> RelatedFilter {
    RelatedFilter::new()
        .assoc_type(CONFIGURATION)
        .my_role(ROLE_CONFIGURABLE)
        .others_role(ROLE_VIEW_CONFIG)
}

fn fetch_view_config(storage: &dyn Storage, configurable: PlayerRef) -> Result<ViewConfig, DmxError> {
    let mut config = ViewConfig::new();
    for related in storage.fetch_related_topics(configurable, &view_config_filter())? {
        config.add_config_topic(TopicModel::from_record(related.object))?;
    }
    Ok(config)
}
