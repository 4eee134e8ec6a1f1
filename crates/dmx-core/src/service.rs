//! # Core Service
//!
//! The entry point of the core: owns the storage collaborator, the canonical
//! type cache and the read-permission predicate.
//!
//! Reads are filtered by the predicate; an unreadable object looks exactly
//! like a missing one. Writes take the [`OpContext`] of the running
//! operation and are normally wrapped in [`CoreService::transact`], which
//! runs one operation inside one storage transaction.
//!
//! Schema mutations always work on a clone of the canonical type, persist
//! it, then replace the cached type. Callers only ever see [`TypeView`]s.

use crate::access::{AccessControl, AllowAll, Readable, ReadableIter};
use crate::bootstrap::bootstrap;
use crate::constants::{ASSOC_TYPE, COMPOSITION_DEF, CORE_NAMESPACE, META_TYPE, TOPIC_TYPE};
use crate::context::OpContext;
use crate::directives::{Directive, DirectiveKind};
use crate::fetcher::ChildTopicsFetcher;
use crate::model::{
    AssocModel, CompDefModel, DataType, DmxObject, HasCompDefs, Identifiable, IndexMode, PlayerRef,
    RelatedAssocModel, RelatedTopicModel, TopicModel, TypeKind, TypeModel, TypeView,
};
use crate::storage::{RelatedFilter, Storage};
use crate::type_storage::{self, TypeCache};
use crate::types::ResultExt;
use crate::value_storage::{StoredObject, ValueStorage};
use crate::{DmxError, ObjectId, SimpleValue};
use std::collections::BTreeMap;

/// Read-permission predicate shared across threads.
pub type SharedAccessControl = Box<dyn AccessControl + Send + Sync>;

pub struct CoreService<S: Storage> {
    storage: S,
    types: TypeCache,
    acl: SharedAccessControl,
}

impl<S: Storage> std::fmt::Debug for CoreService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}

impl<S: Storage> CoreService<S> {
    /// Bootstrap the meta model if needed and load the types. Everything is
    /// readable until [`CoreService::with_access_control`] says otherwise.
    pub fn new(mut storage: S) -> Result<Self, DmxError> {
        storage.begin()?;
        let types = match bootstrap(&mut storage) {
            Ok(types) => {
                storage.commit()?;
                types
            }
            Err(e) => {
                tracing::warn!(error = %e, "bootstrap failed, rolling back");
                storage.rollback()?;
                return Err(e.context("bootstrapping the meta model"));
            }
        };
        tracing::debug!(types = types.len(), "core service ready");
        Ok(Self {
            storage,
            types,
            acl: Box::new(AllowAll),
        })
    }

    #[must_use]
    pub fn with_access_control<A>(mut self, acl: A) -> Self
    where
        A: AccessControl + Send + Sync + 'static,
    {
        self.acl = Box::new(acl);
        self
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn acl(&self) -> &dyn AccessControl {
        &*self.acl
    }

    fn fetcher(&self) -> ChildTopicsFetcher<'_> {
        ChildTopicsFetcher::new(&self.storage, &self.types)
    }

    fn values<'a>(&'a mut self, ctx: &'a mut OpContext) -> ValueStorage<'a> {
        ValueStorage::new(&mut self.storage, &self.types, ctx)
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Run one operation inside one storage transaction.
    ///
    /// Commits on success and returns the result with the directives the
    /// operation emitted. On failure the transaction is rolled back, the type
    /// cache is reloaded and no directive escapes.
    pub fn transact<T, F>(&mut self, operation: &str, f: F) -> Result<(T, Vec<Directive>), DmxError>
    where
        F: FnOnce(&mut Self, &mut OpContext) -> Result<T, DmxError>,
    {
        self.storage.begin()?;
        tracing::debug!(operation, "transaction begun");
        let mut ctx = OpContext::new(operation);
        let result = f(self, &mut ctx).and_then(|value| {
            self.storage.commit()?;
            Ok(value)
        });
        match result {
            Ok(value) => {
                tracing::debug!(operation, directives = ctx.directives().len(), "transaction committed");
                Ok((value, ctx.into_directives()))
            }
            Err(e) => {
                tracing::warn!(operation, error = %e, "operation failed, rolling back");
                if self.storage.in_transaction() {
                    self.storage.rollback()?;
                }
                self.types = TypeCache::load(&self.storage)?;
                Err(e)
            }
        }
    }

    // =========================================================================
    // TOPICS
    // =========================================================================

    /// A topic by id. With `children` the composite tree is fetched deep.
    pub fn get_topic(&self, id: ObjectId, children: bool) -> Result<TopicModel, DmxError> {
        self.get_stored(id, children, DmxError::TopicNotFound(id))
    }

    pub fn get_topic_by_uri(&self, uri: &str, children: bool) -> Result<TopicModel, DmxError> {
        let record = self
            .storage
            .fetch_topic_by_uri(uri)?
            .ok_or_else(|| DmxError::UriNotFound(uri.to_string()))?;
        match self.get_topic(record.id, children) {
            Err(DmxError::TopicNotFound(id)) if id == record.id => Err(DmxError::UriNotFound(uri.to_string())),
            result => result.with_context(|| format!("fetching topic \"{}\"", uri)),
        }
    }

    /// The topic of `type_uri` carrying `value`, if any.
    pub fn get_topic_by_value(&self, type_uri: &str, value: &SimpleValue) -> Result<Option<TopicModel>, DmxError> {
        Ok(self
            .storage
            .fetch_topic_by_value(type_uri, value)?
            .map(TopicModel::from_record)
            .filter(|topic| topic.is_readable(self.acl())))
    }

    pub fn get_topics_by_type(&self, type_uri: &str) -> Result<Vec<TopicModel>, DmxError> {
        let records = self.storage.query_topics(type_uri)?;
        Ok(ReadableIter::new(records.into_iter().map(TopicModel::from_record), self.acl()).collect())
    }

    /// Every readable topic, pulled lazily from storage.
    pub fn all_topics(&self) -> impl Iterator<Item = Result<TopicModel, DmxError>> + '_ {
        let topics = self.storage.topics().map(|r| r.map(TopicModel::from_record));
        ReadableIter::new(topics, self.acl())
    }

    pub fn create_topic(&mut self, ctx: &mut OpContext, mut topic: TopicModel) -> Result<TopicModel, DmxError> {
        reject_type_topic(topic.type_uri())?;
        self.values(ctx).create_topic(&mut topic)?;
        Ok(topic)
    }

    pub fn update_topic(&mut self, ctx: &mut OpContext, update: TopicModel) -> Result<TopicModel, DmxError> {
        let id = update.id()?;
        let stored = self.get_topic(id, false)?;
        reject_type_topic(stored.type_uri())?;
        self.values(ctx).update(update)
    }

    pub fn delete_topic(&mut self, ctx: &mut OpContext, id: ObjectId) -> Result<TopicModel, DmxError> {
        let stored = self.get_topic(id, false)?;
        reject_type_topic(stored.type_uri())?;
        self.values(ctx).delete_topic(id)
    }

    // =========================================================================
    // ASSOCIATIONS
    // =========================================================================

    pub fn get_assoc(&self, id: ObjectId, children: bool) -> Result<AssocModel, DmxError> {
        self.get_stored(id, children, DmxError::AssocNotFound(id))
    }

    pub fn get_assocs_by_type(&self, type_uri: &str) -> Result<Vec<AssocModel>, DmxError> {
        let records = self.storage.query_assocs(type_uri)?;
        Ok(ReadableIter::new(records.into_iter().map(AssocModel::from_record), self.acl()).collect())
    }

    /// Every readable association, pulled lazily from storage.
    pub fn all_assocs(&self) -> impl Iterator<Item = Result<AssocModel, DmxError>> + '_ {
        let assocs = self.storage.assocs().map(|r| r.map(AssocModel::from_record));
        ReadableIter::new(assocs, self.acl())
    }

    /// Resolve either kind of object.
    pub fn get_object(&self, player: PlayerRef) -> Result<DmxObject, DmxError> {
        let object = player.fetch(&self.storage)?;
        let not_found = match player {
            PlayerRef::Topic(id) => DmxError::TopicNotFound(id),
            PlayerRef::Assoc(id) => DmxError::AssocNotFound(id),
        };
        self.readable(object, not_found)
    }

    pub fn create_assoc(&mut self, ctx: &mut OpContext, mut assoc: AssocModel) -> Result<AssocModel, DmxError> {
        reject_schema_assoc(assoc.type_uri())?;
        self.values(ctx).create_assoc(&mut assoc)?;
        Ok(assoc)
    }

    pub fn update_assoc(&mut self, ctx: &mut OpContext, update: AssocModel) -> Result<AssocModel, DmxError> {
        let id = update.id()?;
        let stored = self.get_assoc(id, false)?;
        reject_schema_assoc(stored.type_uri())?;
        self.values(ctx).update(update)
    }

    pub fn delete_assoc(&mut self, ctx: &mut OpContext, id: ObjectId) -> Result<AssocModel, DmxError> {
        let stored = self.get_assoc(id, false)?;
        reject_schema_assoc(stored.type_uri())?;
        self.values(ctx).delete_assoc(id)
    }

    // =========================================================================
    // TRAVERSAL
    // =========================================================================

    /// Topics related to `player`, each with the association it was reached
    /// through. A topic behind an unreadable association is left out.
    pub fn get_related_topics(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Result<Vec<RelatedTopicModel>, DmxError> {
        let related = self.storage.fetch_related_topics(player, filter)?;
        let models = related.into_iter().map(|r| {
            RelatedTopicModel::related(TopicModel::from_record(r.object), AssocModel::from_record(r.assoc))
        });
        Ok(ReadableIter::new(models, self.acl()).collect())
    }

    /// Associations related to `player`, each chained to the association it
    /// was reached through.
    pub fn get_related_assocs(
        &self,
        player: PlayerRef,
        filter: &RelatedFilter,
    ) -> Result<Vec<RelatedAssocModel>, DmxError> {
        let related = self.storage.fetch_related_assocs(player, filter)?;
        let models = related.into_iter().map(|r| {
            RelatedAssocModel::new(AssocModel::from_record(r.object))
                .via(RelatedAssocModel::new(AssocModel::from_record(r.assoc)))
        });
        Ok(ReadableIter::new(models, self.acl()).collect())
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    pub fn get_property(&self, id: ObjectId, key: &str) -> Result<SimpleValue, DmxError> {
        self.get_object(self.player_of(id)?)?;
        self.storage.fetch_property(id, key)
    }

    pub fn has_property(&self, id: ObjectId, key: &str) -> Result<bool, DmxError> {
        self.get_object(self.player_of(id)?)?;
        self.storage.has_property(id, key)
    }

    pub fn get_properties(&self, id: ObjectId) -> Result<BTreeMap<String, SimpleValue>, DmxError> {
        self.get_object(self.player_of(id)?)?;
        self.storage.fetch_properties(id)
    }

    /// Readable objects whose indexed property `key` equals `value`.
    pub fn find_by_property(&self, key: &str, value: &SimpleValue) -> Result<Vec<DmxObject>, DmxError> {
        let ids = self.storage.query_by_property(key, value)?;
        let objects = ids
            .into_iter()
            .map(|id| self.player_of(id).and_then(|p| p.fetch(&self.storage)));
        ReadableIter::new(objects, self.acl()).collect()
    }

    pub fn set_property(
        &mut self,
        _ctx: &mut OpContext,
        id: ObjectId,
        key: &str,
        value: SimpleValue,
        indexed: bool,
    ) -> Result<(), DmxError> {
        self.get_object(self.player_of(id)?)?;
        self.storage.store_property(id, key, value, indexed)
    }

    pub fn remove_property(&mut self, _ctx: &mut OpContext, id: ObjectId, key: &str) -> Result<(), DmxError> {
        self.get_object(self.player_of(id)?)?;
        self.storage.remove_property(id, key)
    }

    fn player_of(&self, id: ObjectId) -> Result<PlayerRef, DmxError> {
        if self.storage.fetch_topic(id)?.is_some() {
            return Ok(PlayerRef::Topic(id));
        }
        if self.storage.fetch_assoc(id)?.is_some() {
            return Ok(PlayerRef::Assoc(id));
        }
        Err(DmxError::ObjectNotFound(id))
    }

    // =========================================================================
    // TYPES
    // =========================================================================

    pub fn get_topic_type(&self, uri: &str) -> Result<TypeView, DmxError> {
        self.type_view(self.types.get_topic_type(uri)?)
    }

    pub fn get_assoc_type(&self, uri: &str) -> Result<TypeView, DmxError> {
        self.type_view(self.types.get_assoc_type(uri)?)
    }

    pub fn get_topic_types(&self) -> Vec<TypeView> {
        self.type_views(TypeKind::TopicType)
    }

    pub fn get_assoc_types(&self) -> Vec<TypeView> {
        self.type_views(TypeKind::AssocType)
    }

    fn type_view(&self, model: &TypeModel) -> Result<TypeView, DmxError> {
        if !model.is_readable(self.acl()) {
            return Err(DmxError::TypeNotFound(model.owner_uri().to_string()));
        }
        Ok(model.view(self.acl()))
    }

    fn type_views(&self, kind: TypeKind) -> Vec<TypeView> {
        ReadableIter::new(self.types.of_kind(kind), self.acl())
            .map(|model| model.view(self.acl()))
            .collect()
    }

    pub fn create_topic_type(&mut self, ctx: &mut OpContext, model: TypeModel) -> Result<TypeView, DmxError> {
        self.create_type(ctx, model, TypeKind::TopicType)
    }

    pub fn create_assoc_type(&mut self, ctx: &mut OpContext, model: TypeModel) -> Result<TypeView, DmxError> {
        self.create_type(ctx, model, TypeKind::AssocType)
    }

    fn create_type(&mut self, ctx: &mut OpContext, mut model: TypeModel, kind: TypeKind) -> Result<TypeView, DmxError> {
        expect_kind(&model, kind)?;
        if self.types.contains(model.owner_uri()) {
            return Err(DmxError::SchemaViolation(format!(
                "type \"{}\" already exists",
                model.owner_uri()
            )));
        }
        self.check_type(&model)?;
        let types = &self.types;
        let mut write_config = |storage: &mut dyn Storage, topic: &mut TopicModel| {
            ValueStorage::new(storage, types, &mut *ctx).create_topic(topic)
        };
        type_storage::store_type(&mut self.storage, &mut model, &mut write_config)?;
        tracing::debug!(uri = model.owner_uri(), kind = kind.name(), "type created");
        let view = model.view(self.acl());
        self.types.insert(model);
        Ok(view)
    }

    /// Replace the schema of an existing type. The URI identifies the type.
    /// A CompDef that is still present keeps its association.
    pub fn update_type(&mut self, ctx: &mut OpContext, model: TypeModel) -> Result<TypeView, DmxError> {
        let uri = model.owner_uri().to_string();
        self.mutate_type(ctx, &uri, |canonical| {
            expect_kind(&model, canonical.type_kind())?;
            let mut model = model;
            model.set_id(canonical.id()?);
            for comp_def in model.comp_defs_mut().iter_mut() {
                if comp_def.id_opt().is_none()
                    && let Ok(current) = canonical.comp_def(&comp_def.comp_def_uri())
                    && let Some(id) = current.id_opt()
                {
                    comp_def.set_id(id);
                }
            }
            *canonical = model;
            Ok(())
        })
    }

    pub fn add_comp_def(
        &mut self,
        ctx: &mut OpContext,
        type_uri: &str,
        comp_def: CompDefModel,
    ) -> Result<TypeView, DmxError> {
        self.mutate_type(ctx, type_uri, |model| model.add_comp_def(comp_def))
    }

    pub fn add_comp_def_before(
        &mut self,
        ctx: &mut OpContext,
        type_uri: &str,
        comp_def: CompDefModel,
        before_comp_def_uri: &str,
    ) -> Result<TypeView, DmxError> {
        self.mutate_type(ctx, type_uri, |model| {
            model.add_comp_def_before(comp_def, before_comp_def_uri)
        })
    }

    pub fn remove_comp_def(&mut self, ctx: &mut OpContext, type_uri: &str, comp_def_uri: &str) -> Result<TypeView, DmxError> {
        self.mutate_type(ctx, type_uri, |model| model.remove_comp_def(comp_def_uri).map(|_| ()))
    }

    pub fn set_data_type(&mut self, ctx: &mut OpContext, type_uri: &str, data_type: DataType) -> Result<TypeView, DmxError> {
        self.mutate_type(ctx, type_uri, |model| model.set_data_type(data_type))
    }

    pub fn set_label_config(
        &mut self,
        ctx: &mut OpContext,
        type_uri: &str,
        comp_def_uris: &[&str],
    ) -> Result<TypeView, DmxError> {
        self.mutate_type(ctx, type_uri, |model| model.set_label_config(comp_def_uris))
    }

    pub fn set_index_modes(
        &mut self,
        ctx: &mut OpContext,
        type_uri: &str,
        index_modes: Vec<IndexMode>,
    ) -> Result<TypeView, DmxError> {
        self.mutate_type(ctx, type_uri, |model| {
            model.set_index_modes(index_modes);
            Ok(())
        })
    }

    /// Apply `f` to a clone of the canonical type, persist it and swap it
    /// into the cache.
    fn mutate_type<F>(&mut self, ctx: &mut OpContext, uri: &str, f: F) -> Result<TypeView, DmxError>
    where
        F: FnOnce(&mut TypeModel) -> Result<(), DmxError>,
    {
        let mut model = self.types.get(uri)?.clone();
        if !model.is_readable(self.acl()) {
            return Err(DmxError::TypeNotFound(uri.to_string()));
        }
        reject_core_type(uri)?;
        f(&mut model).with_context(|| format!("changing type \"{}\"", uri))?;
        self.check_type(&model)?;

        let types = &self.types;
        let mut write_config = |storage: &mut dyn Storage, topic: &mut TopicModel| {
            ValueStorage::new(storage, types, &mut *ctx).create_topic(topic)
        };
        type_storage::rewrite_type(&mut self.storage, &mut model, &mut write_config)?;

        let kind = match model.type_kind() {
            TypeKind::TopicType => DirectiveKind::UpdateTopicType,
            TypeKind::AssocType => DirectiveKind::UpdateAssocType,
        };
        ctx.add_directive(kind, model.to_json());
        let view = model.view(self.acl());
        self.types.insert(model);
        Ok(view)
    }

    pub fn delete_topic_type(&mut self, ctx: &mut OpContext, uri: &str) -> Result<(), DmxError> {
        self.delete_type(ctx, uri, TypeKind::TopicType)
    }

    pub fn delete_assoc_type(&mut self, ctx: &mut OpContext, uri: &str) -> Result<(), DmxError> {
        self.delete_type(ctx, uri, TypeKind::AssocType)
    }

    fn delete_type(&mut self, ctx: &mut OpContext, uri: &str, kind: TypeKind) -> Result<(), DmxError> {
        let model = match kind {
            TypeKind::TopicType => self.types.get_topic_type(uri)?,
            TypeKind::AssocType => self.types.get_assoc_type(uri)?,
        };
        if !model.is_readable(self.acl()) {
            return Err(DmxError::TypeNotFound(uri.to_string()));
        }
        reject_core_type(uri)?;
        let instances = match kind {
            TypeKind::TopicType => self.storage.query_topics(uri)?.len(),
            TypeKind::AssocType => self.storage.query_assocs(uri)?.len(),
        };
        if instances > 0 {
            return Err(DmxError::InvalidState(format!(
                "{} \"{}\" still has {} instances",
                kind.name(),
                uri,
                instances
            )));
        }
        if let Some(user) = self.types.of_kind(TypeKind::TopicType).chain(self.types.of_kind(TypeKind::AssocType)).find(|t| {
            t.owner_uri() != uri
                && t.comp_defs().iter().any(|cd| {
                    cd.child_type_uri() == uri || cd.custom_assoc_type_uri() == Some(uri)
                })
        }) {
            return Err(DmxError::InvalidState(format!(
                "{} \"{}\" is used by a comp def of type \"{}\"",
                kind.name(),
                uri,
                user.owner_uri()
            )));
        }

        let id = model.id()?;
        let json = model.to_json();
        type_storage::delete_type(&mut self.storage, id)?;
        self.types.remove(uri);
        let directive = match kind {
            TypeKind::TopicType => DirectiveKind::DeleteTopicType,
            TypeKind::AssocType => DirectiveKind::DeleteAssocType,
        };
        ctx.add_directive(directive, json);
        tracing::debug!(uri, kind = kind.name(), "type deleted");
        Ok(())
    }

    /// Every CompDef must reference existing types of the right kind.
    fn check_type(&self, model: &TypeModel) -> Result<(), DmxError> {
        for comp_def in model.comp_defs() {
            comp_def.cardinality()?;
            let child = comp_def.child_type_uri();
            if child != model.owner_uri() || model.type_kind() != TypeKind::TopicType {
                self.types
                    .get_topic_type(child)
                    .with_context(|| format!("comp def \"{}\" of type \"{}\"", comp_def.comp_def_uri(), model.owner_uri()))?;
            }
            if let Some(custom) = comp_def.custom_assoc_type_uri() {
                self.types
                    .get_assoc_type(custom)
                    .with_context(|| format!("comp def \"{}\" of type \"{}\"", comp_def.comp_def_uri(), model.owner_uri()))?;
            }
        }
        Ok(())
    }

    fn get_stored<O>(&self, id: ObjectId, children: bool, not_found: DmxError) -> Result<O, DmxError>
    where
        O: StoredObject + Readable,
    {
        let mut object = self.readable(O::load(&self.storage, id)?, not_found)?;
        if children {
            self.fetcher().fetch_all(&mut object, true)?;
        }
        Ok(object)
    }

    fn readable<T: Readable>(&self, object: T, not_found: DmxError) -> Result<T, DmxError> {
        if object.is_readable(self.acl()) {
            Ok(object)
        } else {
            Err(not_found)
        }
    }
}

fn expect_kind(model: &TypeModel, kind: TypeKind) -> Result<(), DmxError> {
    if model.type_kind() != kind {
        return Err(DmxError::SchemaViolation(format!(
            "\"{}\" is a {}, expected a {}",
            model.owner_uri(),
            model.type_kind().name(),
            kind.name()
        )));
    }
    Ok(())
}

fn reject_type_topic(type_uri: &str) -> Result<(), DmxError> {
    if matches!(type_uri, TOPIC_TYPE | ASSOC_TYPE | META_TYPE) {
        return Err(DmxError::InvalidState(format!(
            "topics of type \"{}\" are types, use the type operations",
            type_uri
        )));
    }
    Ok(())
}

fn reject_schema_assoc(type_uri: &str) -> Result<(), DmxError> {
    if type_uri == COMPOSITION_DEF {
        return Err(DmxError::InvalidState(
            "comp def associations are changed through their type".to_string(),
        ));
    }
    Ok(())
}

fn reject_core_type(uri: &str) -> Result<(), DmxError> {
    if uri.starts_with(CORE_NAMESPACE) {
        return Err(DmxError::InvalidState(format!(
            "\"{}\" belongs to the meta model",
            uri
        )));
    }
    Ok(())
}
