//! # Child Topics Fetcher
//!
//! (Re)materializes the composite value tree of an object from storage,
//! driven by the CompDefs of the object's type.

use crate::constants::{MAX_COMPOSITE_DEPTH, ROLE_CHILD, ROLE_PARENT};
use crate::model::{
    AssocModel, Cardinality, ChildValue, CompDefModel, HasChildTopics, HasCompDefs,
    RelatedAssocModel, RelatedTopicModel, TopicModel,
};
use crate::storage::{RelatedFilter, RelatedRecord, Storage, TopicRecord};
use crate::type_storage::TypeCache;
use crate::types::ResultExt;
use crate::DmxError;

/// Reads child topics from storage.
pub struct ChildTopicsFetcher<'a> {
    storage: &'a dyn Storage,
    types: &'a TypeCache,
}

impl<'a> ChildTopicsFetcher<'a> {
    pub fn new(storage: &'a dyn Storage, types: &'a TypeCache) -> Self {
        Self { storage, types }
    }

    #[must_use]
    pub fn types(&self) -> &'a TypeCache {
        self.types
    }

    /// Replace the ChildTopics entry of `comp_def` on `object`.
    ///
    /// Cardinality `one` yields at most one child, `many` a list in storage
    /// order. With `deep` every fetched child gets its own tree fetched too.
    pub fn fetch<O>(&self, object: &mut O, comp_def: &CompDefModel, deep: bool) -> Result<(), DmxError>
    where
        O: HasChildTopics + ?Sized,
    {
        self.fetch_comp_def(object, comp_def, deep, 0)
    }

    /// Fetch the entries of every CompDef of the object's type.
    pub fn fetch_all<O>(&self, object: &mut O, deep: bool) -> Result<(), DmxError>
    where
        O: HasChildTopics + ?Sized,
    {
        self.fetch_all_at(object, deep, 0)
    }

    fn fetch_all_at<O>(&self, object: &mut O, deep: bool, depth: usize) -> Result<(), DmxError>
    where
        O: HasChildTopics + ?Sized,
    {
        let model = self.types.get(object.type_uri())?;
        for comp_def in model.comp_defs() {
            self.fetch_comp_def(object, comp_def, deep, depth)?;
        }
        Ok(())
    }

    fn fetch_comp_def<O>(
        &self,
        object: &mut O,
        comp_def: &CompDefModel,
        deep: bool,
        depth: usize,
    ) -> Result<(), DmxError>
    where
        O: HasChildTopics + ?Sized,
    {
        let result = self.load_entry(object, comp_def, deep, depth);
        let value = result.with_context(|| {
            format!(
                "fetching comp def \"{}\" of {}",
                comp_def.comp_def_uri(),
                object.describe()
            )
        })?;
        object
            .child_topics_mut()
            .put(comp_def.comp_def_uri(), value);
        Ok(())
    }

    fn load_entry<O>(
        &self,
        object: &O,
        comp_def: &CompDefModel,
        deep: bool,
        depth: usize,
    ) -> Result<ChildValue, DmxError>
    where
        O: HasChildTopics + ?Sized,
    {
        if depth >= MAX_COMPOSITE_DEPTH {
            return Err(DmxError::SchemaViolation(format!(
                "composite nesting exceeds {} levels",
                MAX_COMPOSITE_DEPTH
            )));
        }
        let cardinality = comp_def.cardinality()?;
        let player = object.player_ref()?;
        let filter = child_filter(comp_def);

        Ok(match cardinality {
            Cardinality::One => ChildValue::One(
                self.storage
                    .fetch_related_topic(player, &filter)?
                    .map(|related| self.materialize(related, deep, depth))
                    .transpose()?,
            ),
            Cardinality::Many => ChildValue::Many(
                self.storage
                    .fetch_related_topics(player, &filter)?
                    .into_iter()
                    .map(|related| self.materialize(related, deep, depth))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    fn materialize(
        &self,
        related: RelatedRecord<TopicRecord>,
        deep: bool,
        depth: usize,
    ) -> Result<RelatedTopicModel, DmxError> {
        let mut topic = TopicModel::from_record(related.object);
        let mut assoc = AssocModel::from_record(related.assoc);
        if deep {
            let next = depth.saturating_add(1);
            self.fetch_all_at(&mut topic, true, next)?;
            self.fetch_all_at(&mut assoc, true, next)?;
        }
        Ok(RelatedTopicModel {
            topic,
            relating_assoc: Some(RelatedAssocModel::new(assoc)),
            reference: None,
        })
    }
}

/// Filter selecting the children of a parent through `comp_def`.
pub(crate) fn child_filter(comp_def: &CompDefModel) -> RelatedFilter {
    RelatedFilter::new()
        .assoc_type(comp_def.instance_level_assoc_type_uri())
        .my_role(ROLE_PARENT)
        .others_role(ROLE_CHILD)
        .others_type(comp_def.child_type_uri())
}
