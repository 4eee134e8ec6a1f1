//! In-memory storage. Transactions snapshot the whole state on `begin` and
//! restore it on `rollback`.

use super::state::GraphState;
use super::{
    AssocRecord, Cursor, RelatedFilter, RelatedRecord, Storage, TopicRecord, delegate_reads,
};
use crate::model::PlayerRef;
use crate::{DmxError, ObjectId, SimpleValue};

/// Volatile storage backed by ordered maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: GraphState,
    snapshot: Option<GraphState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.state.topics.len()
    }

    #[must_use]
    pub fn assoc_count(&self) -> usize {
        self.state.assocs.len()
    }
}

impl Storage for MemoryStore {
    delegate_reads!();

    fn next_id(&mut self) -> Result<ObjectId, DmxError> {
        Ok(self.state.allocate_id())
    }

    fn put_topic(&mut self, record: TopicRecord) -> Result<(), DmxError> {
        self.state.put_topic(record)
    }

    fn put_assoc(&mut self, record: AssocRecord) -> Result<(), DmxError> {
        self.state.put_assoc(record)
    }

    fn delete_topic(&mut self, id: ObjectId) -> Result<(), DmxError> {
        self.state.delete_topic(id).map(|_| ())
    }

    fn delete_assoc(&mut self, id: ObjectId) -> Result<(), DmxError> {
        self.state.delete_assoc(id).map(|_| ())
    }

    fn store_property(
        &mut self,
        id: ObjectId,
        key: &str,
        value: SimpleValue,
        indexed: bool,
    ) -> Result<(), DmxError> {
        self.state.store_property(id, key, value, indexed)
    }

    fn remove_property(&mut self, id: ObjectId, key: &str) -> Result<(), DmxError> {
        self.state
            .remove_property(id, key)
            .map(|_| ())
            .ok_or_else(|| DmxError::PropertyNotFound {
                id,
                key: key.to_string(),
            })
    }

    fn begin(&mut self) -> Result<(), DmxError> {
        if self.snapshot.is_some() {
            return Err(DmxError::InvalidState(
                "a transaction is already active".to_string(),
            ));
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DmxError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| DmxError::InvalidState("no active transaction to commit".to_string()))
    }

    fn rollback(&mut self) -> Result<(), DmxError> {
        let snapshot = self.snapshot.take().ok_or_else(|| {
            DmxError::InvalidState("no active transaction to roll back".to_string())
        })?;
        // Ids handed out inside the failed transaction are not reused.
        let next_id = self.state.next_id;
        self.state = snapshot;
        self.state.next_id = self.state.next_id.max(next_id);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }
}
