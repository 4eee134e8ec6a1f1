//! # Well-Known URIs and Limits
//!
//! The meta model is stored as ordinary graph data, but a handful of URIs
//! are part of the wire contract and are hardcoded here. These are
//! immutable at runtime.

/// URI prefix of the built-in meta model. Types in it can't be deleted.
pub const CORE_NAMESPACE: &str = "dmx.core.";

// =============================================================================
// META TYPES
// =============================================================================

/// Type of every topic type.
pub const TOPIC_TYPE: &str = "dmx.core.topic_type";

/// Type of every association type.
pub const ASSOC_TYPE: &str = "dmx.core.assoc_type";

/// Type of the topic types `TOPIC_TYPE` and `ASSOC_TYPE` themselves.
pub const META_TYPE: &str = "dmx.core.meta_type";

/// Type of the data type topics.
pub const DATA_TYPE: &str = "dmx.core.data_type";

/// Type of the cardinality topics.
pub const CARDINALITY: &str = "dmx.core.cardinality";

/// Type of the role type topics.
pub const ROLE_TYPE: &str = "dmx.core.role_type";

// =============================================================================
// DATA TYPES
// =============================================================================

/// Simple value, deduplicated by value.
pub const DATA_TYPE_VALUE: &str = "dmx.core.value";

/// Simple value plus identity: every instance is distinct.
pub const DATA_TYPE_IDENTITY: &str = "dmx.core.identity";

/// Composite value. Association types only.
pub const DATA_TYPE_COMPOSITE: &str = "dmx.core.composite";

/// Reference-only placeholder.
pub const DATA_TYPE_ENTITY: &str = "dmx.core.entity";

// =============================================================================
// CARDINALITIES
// =============================================================================

/// At most one child.
pub const CARDINALITY_ONE: &str = "dmx.core.one";

/// An ordered list of children.
pub const CARDINALITY_MANY: &str = "dmx.core.many";

// =============================================================================
// ROLE TYPES
// =============================================================================

/// The composite end of a parent/child association.
pub const ROLE_PARENT: &str = "dmx.core.parent";

/// The component end of a parent/child association.
pub const ROLE_CHILD: &str = "dmx.core.child";

/// Parent type end of a CompDef association.
pub const ROLE_PARENT_TYPE: &str = "dmx.core.parent_type";

/// Child type end of a CompDef association.
pub const ROLE_CHILD_TYPE: &str = "dmx.core.child_type";

/// Earlier end of a sequence link.
pub const ROLE_PREDECESSOR: &str = "dmx.core.predecessor";

/// Later end of a sequence link.
pub const ROLE_SUCCESSOR: &str = "dmx.core.successor";

/// Generic role for symmetric associations.
pub const ROLE_DEFAULT: &str = "dmx.core.default";

/// The object a view config topic is attached to.
pub const ROLE_CONFIGURABLE: &str = "dmx.core.configurable";

/// The view config topic end of a configuration association.
pub const ROLE_VIEW_CONFIG: &str = "dmx.core.view_config";

// =============================================================================
// ASSOCIATION TYPES
// =============================================================================

/// Generic parent/child association, the default instance-level type of a CompDef.
pub const COMPOSITION: &str = "dmx.core.composition";

/// The association type of CompDefs themselves.
pub const COMPOSITION_DEF: &str = "dmx.core.composition_def";

/// Links the CompDefs of a type into an ordered chain.
pub const SEQUENCE: &str = "dmx.core.sequence";

/// Attaches a view config topic to a type or CompDef.
pub const CONFIGURATION: &str = "dmx.core.configuration";

/// Generic association without further meaning.
pub const ASSOCIATION: &str = "dmx.core.association";

// =============================================================================
// PROPERTIES
// =============================================================================

/// CompDef property: whether the child contributes to the parent's label.
pub const PROP_INCLUDE_IN_LABEL: &str = "dmx.core.include_in_label";

/// Type property: comma separated index mode URIs.
pub const PROP_INDEX_MODES: &str = "dmx.core.index_modes";

// =============================================================================
// LABELS
// =============================================================================

/// Joins the values of a `many` child inside one label contribution.
pub const LABEL_LIST_SEPARATOR: &str = ", ";

/// Joins the contributions of successive label CompDefs.
pub const LABEL_COMP_DEF_SEPARATOR: &str = " ";

// =============================================================================
// TRAVERSAL LIMITS
// =============================================================================

/// Maximum nesting depth of a deep child topic fetch.
///
/// A schema whose composition rules form a cycle would otherwise recurse
/// without bound.
pub const MAX_COMPOSITE_DEPTH: usize = 32;

/// Maximum length of a chain of relating associations checked for readability.
pub const MAX_RELATING_DEPTH: usize = 64;

/// Maximum number of parent levels visited when a label change propagates upward.
pub const MAX_LABEL_PROPAGATION_DEPTH: usize = 32;
