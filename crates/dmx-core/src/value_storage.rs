//! # Value Storage
//!
//! Writes topics and associations together with their composite value trees.
//!
//! Creating stores the object, then each ChildTopics entry in CompDef order,
//! then the label. Updating replaces the entries present in the update and
//! propagates the new label up to the composite parents. Deleting removes
//! every association the object plays a role in, recursively.
//!
//! Every change except a create emits a directive into the operation context.

use crate::constants::{
    MAX_COMPOSITE_DEPTH, MAX_LABEL_PROPAGATION_DEPTH, ROLE_CHILD, ROLE_PARENT, ROLE_TYPE,
};
use crate::context::OpContext;
use crate::directives::DirectiveKind;
use crate::fetcher::{ChildTopicsFetcher, child_filter};
use crate::labels;
use crate::model::{
    AssocModel, Cardinality, ChildValue, CompDefModel, DataType, HasChildTopics, HasCompDefs,
    HasSimpleValue, Identifiable, PlayerModel, PlayerRef, RelatedAssocModel, RelatedTopicModel,
    TopicModel, TypeKind, TypeModel,
};
use crate::storage::Storage;
use crate::type_storage::TypeCache;
use crate::types::ResultExt;
use crate::{DmxError, ObjectId, SimpleValue};
use std::collections::BTreeSet;

// =============================================================================
// STORED OBJECT KINDS
// =============================================================================

/// What value storage needs to know about topics and associations.
pub(crate) trait StoredObject: HasChildTopics + Sized {
    const TYPE_KIND: TypeKind;
    const UPDATE: DirectiveKind;

    fn load(storage: &dyn Storage, id: ObjectId) -> Result<Self, DmxError>;

    fn put(&self, storage: &mut dyn Storage) -> Result<(), DmxError>;

    fn assign_id(&mut self, id: ObjectId);

    fn replace_uri(&mut self, uri: String);

    fn to_json(&self) -> serde_json::Value;
}

impl StoredObject for TopicModel {
    const TYPE_KIND: TypeKind = TypeKind::TopicType;
    const UPDATE: DirectiveKind = DirectiveKind::UpdateTopic;

    fn load(storage: &dyn Storage, id: ObjectId) -> Result<Self, DmxError> {
        storage
            .fetch_topic(id)?
            .map(TopicModel::from_record)
            .ok_or(DmxError::TopicNotFound(id))
    }

    fn put(&self, storage: &mut dyn Storage) -> Result<(), DmxError> {
        storage.put_topic(self.to_record()?)
    }

    fn assign_id(&mut self, id: ObjectId) {
        self.set_id(id);
    }

    fn replace_uri(&mut self, uri: String) {
        self.set_uri_field(Some(uri));
    }

    fn to_json(&self) -> serde_json::Value {
        TopicModel::to_json(self)
    }
}

impl StoredObject for AssocModel {
    const TYPE_KIND: TypeKind = TypeKind::AssocType;
    const UPDATE: DirectiveKind = DirectiveKind::UpdateAssoc;

    fn load(storage: &dyn Storage, id: ObjectId) -> Result<Self, DmxError> {
        storage
            .fetch_assoc(id)?
            .map(AssocModel::from_record)
            .ok_or(DmxError::AssocNotFound(id))
    }

    fn put(&self, storage: &mut dyn Storage) -> Result<(), DmxError> {
        storage.put_assoc(self.to_record()?)
    }

    fn assign_id(&mut self, id: ObjectId) {
        self.set_id(id);
    }

    fn replace_uri(&mut self, uri: String) {
        self.set_uri_field(Some(uri));
    }

    fn to_json(&self) -> serde_json::Value {
        AssocModel::to_json(self)
    }
}

// =============================================================================
// VALUE STORAGE
// =============================================================================

pub(crate) struct ValueStorage<'a> {
    storage: &'a mut dyn Storage,
    types: &'a TypeCache,
    ctx: &'a mut OpContext,
}

impl<'a> ValueStorage<'a> {
    pub(crate) fn new(storage: &'a mut dyn Storage, types: &'a TypeCache, ctx: &'a mut OpContext) -> Self {
        Self { storage, types, ctx }
    }

    fn fetcher(&self) -> ChildTopicsFetcher<'_> {
        ChildTopicsFetcher::new(&*self.storage, self.types)
    }

    fn type_of<O: StoredObject>(&self, object: &O) -> Result<&'a TypeModel, DmxError> {
        let types: &'a TypeCache = self.types;
        match O::TYPE_KIND {
            TypeKind::TopicType => types.get_topic_type(object.type_uri()),
            TypeKind::AssocType => types.get_assoc_type(object.type_uri()),
        }
    }

    // -------------------------------------------------------------------------
    // create
    // -------------------------------------------------------------------------

    /// Store a new topic with its child topics. Assigns ids throughout the
    /// tree. A simple topic of a `value` type reuses an equal stored topic.
    pub(crate) fn create_topic(&mut self, topic: &mut TopicModel) -> Result<(), DmxError> {
        self.create_topic_at(topic, 0)
    }

    fn create_topic_at(&mut self, topic: &mut TopicModel, depth: usize) -> Result<(), DmxError> {
        ensure_transient(topic)?;
        let model = self.type_of(topic)?;
        if model.is_simple() && model.data_type() == DataType::Value {
            reject_childs(topic, model)?;
            if let Some(existing) = self
                .storage
                .fetch_topic_by_value(model.owner_uri(), topic.simple_value())?
            {
                tracing::trace!(id = %existing.id, "reusing value topic");
                *topic = TopicModel::from_record(existing);
                return Ok(());
            }
        }
        self.create_object(topic, model, depth)
    }

    /// Store a new association. Players referenced by URI are resolved first;
    /// role types must exist.
    pub(crate) fn create_assoc(&mut self, assoc: &mut AssocModel) -> Result<(), DmxError> {
        ensure_transient(assoc)?;
        let model = self.type_of(assoc)?;
        for role in assoc.roles_mut() {
            role.resolve(&*self.storage)?;
            self.check_role_type(role)?;
        }
        self.create_object(assoc, model, 0)
    }

    fn create_object<O: StoredObject>(
        &mut self,
        object: &mut O,
        model: &TypeModel,
        depth: usize,
    ) -> Result<(), DmxError> {
        if depth >= MAX_COMPOSITE_DEPTH {
            return Err(DmxError::SchemaViolation(format!(
                "composite nesting exceeds {} levels",
                MAX_COMPOSITE_DEPTH
            )));
        }
        reject_childs(object, model)?;
        let id = self.storage.next_id()?;
        object.assign_id(id);
        object.put(self.storage)?;
        if model.is_simple() {
            return Ok(());
        }
        let parent = object.player_ref()?;
        for comp_def in model.comp_defs() {
            if let Some(value) = object.child_topics_mut().remove(&comp_def.comp_def_uri()) {
                let stored = self
                    .store_entry(parent, comp_def, value, depth)
                    .with_context(|| {
                        format!("storing comp def \"{}\" of {}", comp_def.comp_def_uri(), describe(parent, model))
                    })?;
                object.child_topics_mut().put(comp_def.comp_def_uri(), stored);
            }
        }
        self.store_label(object)?;
        Ok(())
    }

    /// Store the children of one ChildTopics entry and relate them to `parent`.
    fn store_entry(
        &mut self,
        parent: PlayerRef,
        comp_def: &CompDefModel,
        value: ChildValue,
        depth: usize,
    ) -> Result<ChildValue, DmxError> {
        let mut value = match (comp_def.cardinality()?, value) {
            (Cardinality::One, ChildValue::Many(list)) if list.len() > 1 => {
                return Err(DmxError::SchemaViolation(format!(
                    "comp def \"{}\" has cardinality one, got {} children",
                    comp_def.comp_def_uri(),
                    list.len()
                )));
            }
            (Cardinality::One, ChildValue::Many(mut list)) => ChildValue::One(list.pop()),
            (Cardinality::Many, ChildValue::One(child)) => ChildValue::Many(child.into_iter().collect()),
            (_, value) => value,
        };
        for child in value.topics_mut() {
            self.store_child(parent, comp_def, child, depth)?;
        }
        Ok(value)
    }

    fn store_child(
        &mut self,
        parent: PlayerRef,
        comp_def: &CompDefModel,
        child: &mut RelatedTopicModel,
        depth: usize,
    ) -> Result<(), DmxError> {
        if let Some(reference) = child.reference.take() {
            child.topic = reference.resolve(&*self.storage)?;
        } else if let Some(id) = child.topic.id_opt() {
            child.topic = TopicModel::load(&*self.storage, id)?;
        } else {
            if child.topic.type_uri().is_empty() {
                child.topic.set_type_uri_field(comp_def.child_type_uri());
            }
            check_child_type(comp_def, &child.topic)?;
            self.create_topic_at(&mut child.topic, depth.saturating_add(1))?;
        }
        check_child_type(comp_def, &child.topic)?;

        let mut assoc = AssocModel::new(
            comp_def.instance_level_assoc_type_uri(),
            PlayerModel::from_ref(parent, ROLE_PARENT),
            PlayerModel::from_ref(child.topic.player_ref()?, ROLE_CHILD),
        );
        let id = self.storage.next_id()?;
        assoc.set_id(id);
        self.storage.put_assoc(assoc.to_record()?)?;
        child.relating_assoc = Some(RelatedAssocModel::new(assoc));
        Ok(())
    }

    /// Recompute and store the label of a composite. Returns whether it changed.
    fn store_label<O: StoredObject>(&mut self, object: &mut O) -> Result<bool, DmxError> {
        let Some(label) = labels::calculate(&self.fetcher(), object)? else {
            return Ok(false);
        };
        if object.simple_value().to_string() == label {
            return Ok(false);
        }
        object.set_simple_value(label.into());
        object.put(self.storage)?;
        Ok(true)
    }

    fn check_role_type(&self, role: &PlayerModel) -> Result<(), DmxError> {
        let known = self
            .storage
            .fetch_topic_by_uri(role.role_type_uri())?
            .is_some_and(|t| t.type_uri == ROLE_TYPE);
        if !known {
            return Err(DmxError::SchemaViolation(format!(
                "\"{}\" is not a role type",
                role.role_type_uri()
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // update
    // -------------------------------------------------------------------------

    /// Apply `update` to the stored object with the same id.
    ///
    /// The URI is replaced when the update carries one. A simple object takes
    /// the new value when the update carries one; a composite gets every
    /// ChildTopics entry present in the update replaced and its label
    /// recomputed. Returns the updated object.
    ///
    /// A simple topic of a `value` type can't take a value that another topic
    /// of its type already holds. Re-point the composite parent instead.
    pub(crate) fn update<O: StoredObject>(&mut self, update: O) -> Result<O, DmxError> {
        let id = update.id()?;
        let mut object = O::load(&*self.storage, id)?;
        if !update.type_uri().is_empty() && update.type_uri() != object.type_uri() {
            return Err(DmxError::SchemaViolation(format!(
                "can't change the type of {} to \"{}\"",
                object.describe(),
                update.type_uri()
            )));
        }
        let model = self.type_of(&object)?;
        reject_childs(&update, model)?;
        let uri = update.uri().map(str::to_string);

        if model.is_simple() {
            if update.has_simple_value() && update.simple_value() != object.simple_value() {
                if O::TYPE_KIND == TypeKind::TopicType && model.data_type() == DataType::Value {
                    self.reject_taken_value(model, update.simple_value(), &object)?;
                }
                object.set_simple_value(update.simple_value().clone());
            }
            set_uri(&mut object, uri);
            object.put(self.storage)?;
        } else {
            set_uri(&mut object, uri);
            object.put(self.storage)?;
            let parent = object.player_ref()?;
            let mut update = update;
            for comp_def in model.comp_defs() {
                let comp_def_uri = comp_def.comp_def_uri();
                let Some(value) = update.child_topics_mut().remove(&comp_def_uri) else {
                    continue;
                };
                self.remove_children(parent, comp_def)?;
                let stored = self
                    .store_entry(parent, comp_def, value, 0)
                    .with_context(|| format!("updating comp def \"{}\" of {}", comp_def_uri, object.describe()))?;
                object.child_topics_mut().put(comp_def_uri, stored);
            }
            self.store_label(&mut object)?;
        }
        self.ctx.add_directive(O::UPDATE, object.to_json());
        self.propagate_label(object.player_ref()?)?;
        Ok(object)
    }

    fn reject_taken_value<O: StoredObject>(
        &self,
        model: &TypeModel,
        value: &SimpleValue,
        object: &O,
    ) -> Result<(), DmxError> {
        match self.storage.fetch_topic_by_value(model.owner_uri(), value)? {
            Some(existing) => Err(DmxError::SchemaViolation(format!(
                "can't set {} to \"{}\": topic {} already holds that value",
                object.describe(),
                value,
                existing.id
            ))),
            None => Ok(()),
        }
    }

    /// Delete the relating associations of the current children. The child
    /// topics themselves are kept.
    fn remove_children(&mut self, parent: PlayerRef, comp_def: &CompDefModel) -> Result<(), DmxError> {
        let filter = child_filter(comp_def);
        let related = self.storage.fetch_related_topics(parent, &filter)?;
        let mut visited = BTreeSet::new();
        for child in related {
            self.delete_assoc_cascading(child.assoc.id, &mut visited)?;
        }
        Ok(())
    }

    /// Recompute the labels of the composite parents of `child`, recursively.
    fn propagate_label(&mut self, child: PlayerRef) -> Result<(), DmxError> {
        let mut visited = BTreeSet::from([child.id()]);
        let mut frontier = vec![child];
        let mut depth = 0usize;
        while !frontier.is_empty() {
            if depth >= MAX_LABEL_PROPAGATION_DEPTH {
                tracing::warn!(
                    depth,
                    "label propagation stopped after {} levels",
                    MAX_LABEL_PROPAGATION_DEPTH
                );
                break;
            }
            let mut next = Vec::new();
            for current in frontier {
                for parent in self.composite_parents(current)? {
                    if visited.insert(parent.id()) && self.relabel(parent)? {
                        next.push(parent);
                    }
                }
            }
            frontier = next;
            depth = depth.saturating_add(1);
        }
        Ok(())
    }

    fn composite_parents(&self, child: PlayerRef) -> Result<Vec<PlayerRef>, DmxError> {
        let mut parents = Vec::new();
        for assoc in self.storage.fetch_assocs_of(child)? {
            let (mine, other) = if assoc.role1.player == child {
                (&assoc.role1, &assoc.role2)
            } else {
                (&assoc.role2, &assoc.role1)
            };
            if mine.role_type_uri == ROLE_CHILD && other.role_type_uri == ROLE_PARENT {
                parents.push(other.player);
            }
        }
        Ok(parents)
    }

    /// Recompute the label of a stored object. Returns whether it changed.
    fn relabel(&mut self, player: PlayerRef) -> Result<bool, DmxError> {
        match player {
            PlayerRef::Topic(id) => self.relabel_object(TopicModel::load(&*self.storage, id)?),
            PlayerRef::Assoc(id) => self.relabel_object(AssocModel::load(&*self.storage, id)?),
        }
    }

    fn relabel_object<O: StoredObject>(&mut self, mut object: O) -> Result<bool, DmxError> {
        if !self.types.contains(object.type_uri()) || self.type_of(&object)?.is_simple() {
            return Ok(false);
        }
        let changed = self.store_label(&mut object)?;
        if changed {
            self.ctx.add_directive(O::UPDATE, object.to_json());
        }
        Ok(changed)
    }

    // -------------------------------------------------------------------------
    // delete
    // -------------------------------------------------------------------------

    /// Delete a topic and every association it plays a role in. Returns the
    /// deleted topic.
    pub(crate) fn delete_topic(&mut self, id: ObjectId) -> Result<TopicModel, DmxError> {
        let topic = TopicModel::load(&*self.storage, id)?;
        let mut visited = BTreeSet::from([id]);
        self.delete_assocs_of(PlayerRef::Topic(id), &mut visited)?;
        self.storage.delete_topic(id)?;
        self.ctx.add_directive(DirectiveKind::DeleteTopic, topic.to_json());
        Ok(topic)
    }

    /// Delete an association and every association it plays a role in.
    pub(crate) fn delete_assoc(&mut self, id: ObjectId) -> Result<AssocModel, DmxError> {
        let assoc = AssocModel::load(&*self.storage, id)?;
        let mut visited = BTreeSet::new();
        self.delete_assoc_cascading(id, &mut visited)?;
        Ok(assoc)
    }

    fn delete_assoc_cascading(&mut self, id: ObjectId, visited: &mut BTreeSet<ObjectId>) -> Result<(), DmxError> {
        if !visited.insert(id) {
            return Ok(());
        }
        let Some(record) = self.storage.fetch_assoc(id)? else {
            return Ok(());
        };
        self.delete_assocs_of(PlayerRef::Assoc(id), visited)?;
        self.storage.delete_assoc(id)?;
        self.ctx
            .add_directive(DirectiveKind::DeleteAssoc, AssocModel::from_record(record).to_json());
        Ok(())
    }

    fn delete_assocs_of(&mut self, player: PlayerRef, visited: &mut BTreeSet<ObjectId>) -> Result<(), DmxError> {
        for assoc in self.storage.fetch_assocs_of(player)? {
            self.delete_assoc_cascading(assoc.id, visited)?;
        }
        Ok(())
    }
}

// =============================================================================
// CHECKS
// =============================================================================

fn ensure_transient(object: &dyn Identifiable) -> Result<(), DmxError> {
    match object.id_opt() {
        Some(id) => Err(DmxError::InvalidState(format!(
            "{} is already stored as {}",
            object.describe(),
            id
        ))),
        None => Ok(()),
    }
}

/// Every ChildTopics key must name a CompDef of the object's type.
fn reject_childs<O: HasChildTopics + ?Sized>(object: &O, model: &TypeModel) -> Result<(), DmxError> {
    match object
        .child_topics()
        .iter()
        .find(|(uri, _)| !model.has_comp_def(uri))
    {
        Some((uri, _)) => Err(DmxError::CompDefNotFound {
            type_uri: model.owner_uri().to_string(),
            comp_def_uri: uri.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_child_type(comp_def: &CompDefModel, child: &TopicModel) -> Result<(), DmxError> {
    if child.type_uri() != comp_def.child_type_uri() {
        return Err(DmxError::SchemaViolation(format!(
            "comp def \"{}\" expects a \"{}\" child, got {}",
            comp_def.comp_def_uri(),
            comp_def.child_type_uri(),
            child.describe()
        )));
    }
    Ok(())
}

fn set_uri<O: StoredObject>(object: &mut O, uri: Option<String>) {
    if let Some(uri) = uri {
        object.replace_uri(uri);
    }
}

fn describe(player: PlayerRef, model: &TypeModel) -> String {
    format!("{} {} (type \"{}\")", player.kind().name(), player.id(), model.owner_uri())
}
