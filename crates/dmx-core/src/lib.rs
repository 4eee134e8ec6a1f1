//! # dmx-core
//!
//! A typed hypergraph of topics and associations.
//!
//! Topics are typed nodes carrying a simple value or a composite value tree.
//! Associations are typed binary relations whose two role players may be
//! topics or other associations. The type system is reflective: topic types,
//! association types and their composition definitions are themselves stored
//! as topics and associations, and are cached in canonical form.
//!
//! ## Layers
//!
//! - `model`: in-memory projections of stored objects and types
//! - `storage`: the record-level collaborator (memory or redb)
//! - `fetcher`, `labels`: composite tree loading and label calculation
//! - `type_storage`, `value_storage`: schema and value persistence
//! - `access`: read-permission filtering
//! - `service`: the operation-scoped entry point
//! - `registry`, `directives`: push notifications to connected clients
//!
//! The core is synchronous and has no network dependencies.

// =============================================================================
// MODULES
// =============================================================================

pub mod access;
pub mod bootstrap;
pub mod constants;
pub mod context;
pub mod directives;
pub mod fetcher;
pub mod labels;
pub mod model;
pub mod registry;
pub mod service;
pub mod storage;
pub mod type_storage;
pub mod types;
mod value_storage;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use types::{DmxError, ErrorKind, ObjectId, ObjectKind, ResultExt, SimpleValue};

pub use access::{AccessControl, AllowAll, Readable, ReadableIter};
pub use context::OpContext;
pub use directives::{Directive, DirectiveKind, Directives};
pub use fetcher::ChildTopicsFetcher;
pub use model::{
    AssocModel, Cardinality, ChildTopics, ChildValue, CompDefModel, DataType, DmxObject,
    HasChildTopics, HasCompDefs, HasSimpleValue, Identifiable, IndexMode, PlayerModel, PlayerRef,
    RelatedAssocModel, RelatedTopicModel, TopicModel, TopicReference, TypeKind, TypeModel,
    TypeView, ViewConfig,
};
pub use registry::{Connection, ConnectionRegistry};
pub use service::CoreService;
pub use storage::{MemoryStore, RedbStore, RelatedFilter, Storage, StorageBackend};
pub use type_storage::TypeCache;
