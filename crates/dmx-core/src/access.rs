//! # Access-Filtered Traversal
//!
//! Read permission is decided by an external collaborator, the
//! [`AccessControl`] predicate. Traversals wrap their results in
//! [`ReadableIter`], which pulls the next readable element on demand.
//!
//! An object reached through a relating association is readable only if the
//! object itself and the whole chain of relating associations are readable.

use crate::constants::MAX_RELATING_DEPTH;
use crate::model::{
    AssocModel, DmxObject, Identifiable, RelatedAssocModel, RelatedTopicModel, TopicModel,
    TypeModel,
};
use crate::DmxError;

/// The read-permission predicate.
pub trait AccessControl {
    fn has_read_permission(&self, object: &dyn Identifiable) -> bool;
}

/// Grants read access to everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn has_read_permission(&self, _object: &dyn Identifiable) -> bool {
        true
    }
}

impl<F> AccessControl for F
where
    F: Fn(&dyn Identifiable) -> bool,
{
    fn has_read_permission(&self, object: &dyn Identifiable) -> bool {
        self(object)
    }
}

// =============================================================================
// READABILITY
// =============================================================================

/// Something whose readability can be decided under an [`AccessControl`].
pub trait Readable {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool;
}

impl Readable for TopicModel {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool {
        acl.has_read_permission(self)
    }
}

impl Readable for AssocModel {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool {
        acl.has_read_permission(self)
    }
}

impl Readable for TypeModel {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool {
        acl.has_read_permission(self)
    }
}

impl Readable for DmxObject {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool {
        acl.has_read_permission(self)
    }
}

impl Readable for RelatedAssocModel {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool {
        relating_chain_readable(self, acl)
    }
}

impl Readable for RelatedTopicModel {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool {
        acl.has_read_permission(&self.topic)
            && self
                .relating_assoc
                .as_ref()
                .is_none_or(|relating| relating_chain_readable(relating, acl))
    }
}

impl<T: Readable + ?Sized> Readable for &T {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool {
        (**self).is_readable(acl)
    }
}

/// Errors are always yielded so the caller sees them.
impl<T: Readable> Readable for Result<T, DmxError> {
    fn is_readable(&self, acl: &dyn AccessControl) -> bool {
        self.as_ref().map_or(true, |item| item.is_readable(acl))
    }
}

/// Walk a chain of relating associations. A chain longer than
/// `MAX_RELATING_DEPTH` is treated as unreadable.
fn relating_chain_readable(start: &RelatedAssocModel, acl: &dyn AccessControl) -> bool {
    let mut current = Some(start);
    let mut depth = 0usize;
    while let Some(related) = current {
        if depth >= MAX_RELATING_DEPTH {
            tracing::warn!(
                assoc = %related.assoc.describe(),
                "relating association chain exceeds {} levels, treating as unreadable",
                MAX_RELATING_DEPTH
            );
            return false;
        }
        if !acl.has_read_permission(&related.assoc) {
            return false;
        }
        current = related.relating_assoc.as_deref();
        depth = depth.saturating_add(1);
    }
    true
}

// =============================================================================
// LAZY FILTER
// =============================================================================

/// Lazily skips the elements of `inner` that are not readable.
pub struct ReadableIter<'a, I> {
    inner: I,
    acl: &'a dyn AccessControl,
}

impl<'a, I> ReadableIter<'a, I> {
    pub fn new(inner: I, acl: &'a dyn AccessControl) -> Self {
        Self { inner, acl }
    }
}

impl<I> Iterator for ReadableIter<'_, I>
where
    I: Iterator,
    I::Item: Readable,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let acl = self.acl;
        self.inner.find(|item| item.is_readable(acl))
    }
}

impl<I> std::fmt::Debug for ReadableIter<'_, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableIter").finish_non_exhaustive()
    }
}
