//! # Core Type Definitions
//!
//! This module contains the leaf types every other module builds on:
//! - Object identifiers (`ObjectId`, `ObjectKind`)
//! - The scalar value of a topic or association (`SimpleValue`)
//! - Error types (`DmxError`, `ErrorKind`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` so they can key `BTreeMap`/`BTreeSet`

mod value;

pub use value::SimpleValue;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a stored topic or association.
///
/// Topics and associations share one id space, so an id alone is enough to
/// address a role player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Wire representation of an id that was never assigned.
    pub const UNASSIGNED: i64 = -1;

    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Wire form of an optional id: the raw value, or `-1` when unassigned.
    #[must_use]
    pub fn to_wire(id: Option<Self>) -> i64 {
        id.map_or(Self::UNASSIGNED, |id| id.0 as i64)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two kinds of stored objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Topic,
    Assoc,
}

impl ObjectKind {
    /// Human readable name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Assoc => "association",
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Abstract error classification shared by every `DmxError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced topic, association, property, type or CompDef does not exist.
    NotFound,
    /// An id or URI was read before being assigned, or an operation was used
    /// in a state that does not permit it.
    InvalidState,
    /// Illegal data type, cardinality or configuration in the schema.
    SchemaViolation,
    /// A queried player does not belong to the association.
    RoleMismatch,
    /// A topic reference by id or URI cannot be resolved, or is empty.
    UnresolvedReference,
    /// A value cannot be rendered to (or parsed from) the wire format.
    SerializationFailure,
    /// The storage collaborator itself failed.
    Storage,
}

/// Errors that can occur in the DMX core.
///
/// - No silent failures
/// - Use `Result<T, DmxError>` for fallible operations
/// - Schema and state violations are fatal to the current operation
#[derive(Debug, Error)]
pub enum DmxError {
    /// No topic with this id.
    #[error("Topic {0} not found")]
    TopicNotFound(ObjectId),

    /// No association with this id.
    #[error("Association {0} not found")]
    AssocNotFound(ObjectId),

    /// No object with this id, of either kind.
    #[error("Object {0} not found")]
    ObjectNotFound(ObjectId),

    /// No topic with this URI.
    #[error("Topic \"{0}\" not found")]
    UriNotFound(String),

    /// No topic type or association type with this URI.
    #[error("Type \"{0}\" not found")]
    TypeNotFound(String),

    /// The type has no CompDef with this URI.
    #[error("Type \"{type_uri}\" has no comp def \"{comp_def_uri}\"")]
    CompDefNotFound {
        type_uri: String,
        comp_def_uri: String,
    },

    /// The object has no property with this key.
    #[error("Property \"{key}\" of object {id} not found")]
    PropertyNotFound { id: ObjectId, key: String },

    /// An id or URI was read before being assigned, or a state invariant failed.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The schema forbids what was attempted.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// The player is neither role of the association.
    /// `assoc_id` is the wire id, -1 while the association is transient.
    #[error("{player_id} is not a player of association {assoc_id}")]
    RoleMismatch {
        assoc_id: i64,
        player_id: ObjectId,
    },

    /// A topic reference could not be resolved.
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The storage collaborator failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A failure annotated with what was being evaluated when it happened.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<DmxError>,
    },
}

impl DmxError {
    /// Classify this error. Context wrappers report the kind of their cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TopicNotFound(_)
            | Self::AssocNotFound(_)
            | Self::ObjectNotFound(_)
            | Self::UriNotFound(_)
            | Self::TypeNotFound(_)
            | Self::CompDefNotFound { .. }
            | Self::PropertyNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::SchemaViolation(_) => ErrorKind::SchemaViolation,
            Self::RoleMismatch { .. } => ErrorKind::RoleMismatch,
            Self::UnresolvedReference(_) => ErrorKind::UnresolvedReference,
            Self::SerializationError(_) => ErrorKind::SerializationFailure,
            Self::StorageError(_) => ErrorKind::Storage,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Wrap this error with a description of what was being evaluated.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error of a context chain.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Attach context to the error of a `Result`, lazily.
pub trait ResultExt<T> {
    fn with_context<F, C>(self, f: F) -> Result<T, DmxError>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> ResultExt<T> for Result<T, DmxError> {
    fn with_context<F, C>(self, f: F) -> Result<T, DmxError>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_id_serializes_as_minus_one() {
        assert_eq!(ObjectId::to_wire(None), -1);
        assert_eq!(ObjectId::to_wire(Some(ObjectId(7))), 7);
    }

    #[test]
    fn context_chain_keeps_root_kind() {
        let err = DmxError::SchemaViolation("bad cardinality".to_string())
            .context("fetching \"dmx.contacts.phone\"")
            .context("fetching \"dmx.contacts.person\"");

        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert!(matches!(err.root_cause(), DmxError::SchemaViolation(_)));

        let message = err.to_string();
        assert!(message.contains("dmx.contacts.person"));
        assert!(message.contains("dmx.contacts.phone"));
        assert!(message.contains("bad cardinality"));
    }

    #[test]
    fn not_found_variants_share_kind() {
        let errors = [
            DmxError::TopicNotFound(ObjectId(1)),
            DmxError::AssocNotFound(ObjectId(1)),
            DmxError::UriNotFound("x".to_string()),
            DmxError::CompDefNotFound {
                type_uri: "a".to_string(),
                comp_def_uri: "b".to_string(),
            },
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
    }
}
