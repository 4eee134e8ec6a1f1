//! References to existing topics, used in place of a child topic value.

use super::TopicModel;
use crate::storage::Storage;
use crate::{DmxError, ObjectId};
use std::fmt;

const REF_ID_PREFIX: &str = "ref_id:";
const REF_URI_PREFIX: &str = "ref_uri:";

/// A reference to a stored topic by id or by URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicReference {
    ById(ObjectId),
    ByUri(String),
}

impl TopicReference {
    /// Parse the wire form `ref_id:<id>` or `ref_uri:<uri>`.
    ///
    /// Returns `Ok(None)` for a string without either prefix (a plain value).
    /// A `ref_id:` prefix followed by anything but an id is a serialization error.
    pub fn parse(text: &str) -> Result<Option<Self>, DmxError> {
        if let Some(id) = text.strip_prefix(REF_ID_PREFIX) {
            let id = id.trim().parse::<u64>().map_err(|e| {
                DmxError::SerializationError(format!("invalid topic reference \"{}\": {}", text, e))
            })?;
            return Ok(Some(Self::ById(ObjectId(id))));
        }
        if let Some(uri) = text.strip_prefix(REF_URI_PREFIX) {
            return Ok(Some(Self::ByUri(uri.trim().to_string())));
        }
        Ok(None)
    }

    /// Load the referenced topic.
    ///
    /// An empty URI or a reference naming no topic is an `UnresolvedReference`.
    pub fn resolve(&self, storage: &dyn Storage) -> Result<TopicModel, DmxError> {
        let record = match self {
            Self::ById(id) => storage.fetch_topic(*id)?,
            Self::ByUri(uri) if uri.is_empty() => {
                return Err(DmxError::UnresolvedReference(
                    "topic reference is empty".to_string(),
                ));
            }
            Self::ByUri(uri) => storage.fetch_topic_by_uri(uri)?,
        };
        record
            .map(TopicModel::from_record)
            .ok_or_else(|| DmxError::UnresolvedReference(format!("no topic for \"{}\"", self)))
    }
}

impl fmt::Display for TopicReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "{}{}", REF_ID_PREFIX, id),
            Self::ByUri(uri) => write!(f, "{}{}", REF_URI_PREFIX, uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::storage::{MemoryStore, TopicRecord};

    #[test]
    fn parse_wire_forms() {
        assert_eq!(
            TopicReference::parse("ref_id:42").expect("parse"),
            Some(TopicReference::ById(ObjectId(42)))
        );
        assert_eq!(
            TopicReference::parse("ref_uri:dmx.core.one").expect("parse"),
            Some(TopicReference::ByUri("dmx.core.one".to_string()))
        );
        assert_eq!(TopicReference::parse("Alice").expect("parse"), None);
        assert!(TopicReference::parse("ref_id:abc").is_err());
    }

    #[test]
    fn resolve_by_id_and_uri() {
        let mut store = MemoryStore::new();
        let id = store.next_id().expect("id");
        store
            .put_topic(TopicRecord::new(id, Some("city.berlin"), "dmx.contacts.city", "Berlin"))
            .expect("put");

        let by_id = TopicReference::ById(id).resolve(&store).expect("by id");
        let by_uri = TopicReference::ByUri("city.berlin".to_string())
            .resolve(&store)
            .expect("by uri");
        assert_eq!(by_id, by_uri);
    }

    #[test]
    fn missing_or_empty_is_unresolved() {
        let store = MemoryStore::new();
        for reference in [
            TopicReference::ById(ObjectId(99)),
            TopicReference::ByUri(String::new()),
            TopicReference::ByUri("nowhere".to_string()),
        ] {
            let err = reference.resolve(&store).expect_err("unresolved");
            assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
        }
    }
}
