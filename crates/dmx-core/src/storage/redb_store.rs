//! # redb-backed Storage
//!
//! A disk-backed store using the redb embedded database.
//!
//! The whole graph is loaded into the in-memory indexes on open, so reads
//! never touch the database. Writes update the indexes and are journaled;
//! the journal is flushed in a single redb write transaction on `commit`
//! (or right away when no transaction is active). `rollback` drops the
//! journal and reloads the indexes from disk.

use super::state::GraphState;
use super::{
    AssocRecord, Cursor, PropertyEntry, RelatedFilter, RelatedRecord, Storage, TopicRecord,
    delegate_reads,
};
use crate::model::PlayerRef;
use crate::{DmxError, ObjectId, SimpleValue};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Table for topics: id -> postcard `TopicRecord`
const TOPICS: TableDefinition<u64, &[u8]> = TableDefinition::new("topics");

/// Table for associations: id -> postcard `AssocRecord`
const ASSOCS: TableDefinition<u64, &[u8]> = TableDefinition::new("assocs");

/// Table for properties: object id -> postcard map of key -> `PropertyEntry`
const PROPERTIES: TableDefinition<u64, &[u8]> = TableDefinition::new("properties");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_ID_KEY: &str = "next_id";

/// A record touched since the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Change {
    Topic(ObjectId),
    Assoc(ObjectId),
    Properties(ObjectId),
}

fn io_err(e: impl std::fmt::Display) -> DmxError {
    DmxError::StorageError(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> DmxError {
    DmxError::SerializationError(e.to_string())
}

/// A disk-backed store using redb.
pub struct RedbStore {
    db: Database,
    state: GraphState,
    journal: BTreeSet<Change>,
    in_transaction: bool,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("topics", &self.state.topics.len())
            .field("assocs", &self.state.assocs.len())
            .field("journal", &self.journal.len())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DmxError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(TOPICS).map_err(io_err)?;
            let _ = write_txn.open_table(ASSOCS).map_err(io_err)?;
            let _ = write_txn.open_table(PROPERTIES).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        let state = Self::load(&db)?;
        tracing::debug!(
            topics = state.topics.len(),
            assocs = state.assocs.len(),
            "opened redb store"
        );
        Ok(Self {
            db,
            state,
            journal: BTreeSet::new(),
            in_transaction: false,
        })
    }

    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.state.topics.len()
    }

    #[must_use]
    pub fn assoc_count(&self) -> usize {
        self.state.assocs.len()
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), DmxError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    fn load(db: &Database) -> Result<GraphState, DmxError> {
        let read_txn = db.begin_read().map_err(io_err)?;
        let mut state = GraphState::default();

        let topics = read_txn.open_table(TOPICS).map_err(io_err)?;
        for entry in topics.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let record: TopicRecord = postcard::from_bytes(value.value()).map_err(ser_err)?;
            state.put_topic(record)?;
        }

        let assocs = read_txn.open_table(ASSOCS).map_err(io_err)?;
        for entry in assocs.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let record: AssocRecord = postcard::from_bytes(value.value()).map_err(ser_err)?;
            state.insert_assoc(record);
        }

        let properties = read_txn.open_table(PROPERTIES).map_err(io_err)?;
        for entry in properties.iter().map_err(io_err)? {
            let (key, value) = entry.map_err(io_err)?;
            let id = ObjectId(key.value());
            let props: BTreeMap<String, PropertyEntry> =
                postcard::from_bytes(value.value()).map_err(ser_err)?;
            for (key, entry) in props {
                state.store_property(id, &key, entry.value, entry.indexed)?;
            }
        }

        let metadata = read_txn.open_table(METADATA).map_err(io_err)?;
        let stored_next_id = metadata
            .get(NEXT_ID_KEY)
            .map_err(io_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        state.next_id = state.next_id.max(stored_next_id);
        Ok(state)
    }

    /// Write every journaled change in one redb transaction.
    fn flush(&mut self) -> Result<(), DmxError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut topics = write_txn.open_table(TOPICS).map_err(io_err)?;
            let mut assocs = write_txn.open_table(ASSOCS).map_err(io_err)?;
            let mut properties = write_txn.open_table(PROPERTIES).map_err(io_err)?;
            let mut metadata = write_txn.open_table(METADATA).map_err(io_err)?;

            for change in &self.journal {
                match *change {
                    Change::Topic(id) => match self.state.topics.get(&id) {
                        Some(record) => {
                            let bytes = postcard::to_allocvec(record).map_err(ser_err)?;
                            topics.insert(id.0, bytes.as_slice()).map_err(io_err)?;
                        }
                        None => {
                            topics.remove(id.0).map_err(io_err)?;
                        }
                    },
                    Change::Assoc(id) => match self.state.assocs.get(&id) {
                        Some(record) => {
                            let bytes = postcard::to_allocvec(record).map_err(ser_err)?;
                            assocs.insert(id.0, bytes.as_slice()).map_err(io_err)?;
                        }
                        None => {
                            assocs.remove(id.0).map_err(io_err)?;
                        }
                    },
                    Change::Properties(id) => match self.state.properties.get(&id) {
                        Some(props) => {
                            let bytes = postcard::to_allocvec(props).map_err(ser_err)?;
                            properties.insert(id.0, bytes.as_slice()).map_err(io_err)?;
                        }
                        None => {
                            properties.remove(id.0).map_err(io_err)?;
                        }
                    },
                }
            }
            metadata
                .insert(NEXT_ID_KEY, self.state.next_id)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        self.journal.clear();
        Ok(())
    }

    /// Discard unflushed changes by reloading from disk. Ids already handed
    /// out are not reused.
    fn reload(&mut self) -> Result<(), DmxError> {
        let next_id = self.state.next_id;
        self.journal.clear();
        self.state = Self::load(&self.db)?;
        self.state.next_id = self.state.next_id.max(next_id);
        Ok(())
    }

    /// Journal a change and flush it unless a transaction is active.
    fn record(&mut self, changes: &[Change]) -> Result<(), DmxError> {
        self.journal.extend(changes.iter().copied());
        if self.in_transaction {
            return Ok(());
        }
        self.flush().or_else(|e| {
            tracing::warn!(error = %e, "autocommit failed, reloading from disk");
            self.reload()?;
            Err(e)
        })
    }
}

impl Storage for RedbStore {
    delegate_reads!();

    fn next_id(&mut self) -> Result<ObjectId, DmxError> {
        Ok(self.state.allocate_id())
    }

    fn put_topic(&mut self, record: TopicRecord) -> Result<(), DmxError> {
        let id = record.id;
        self.state.put_topic(record)?;
        self.record(&[Change::Topic(id)])
    }

    fn put_assoc(&mut self, record: AssocRecord) -> Result<(), DmxError> {
        let id = record.id;
        self.state.put_assoc(record)?;
        self.record(&[Change::Assoc(id)])
    }

    fn delete_topic(&mut self, id: ObjectId) -> Result<(), DmxError> {
        self.state.delete_topic(id)?;
        self.record(&[Change::Topic(id), Change::Properties(id)])
    }

    fn delete_assoc(&mut self, id: ObjectId) -> Result<(), DmxError> {
        self.state.delete_assoc(id)?;
        self.record(&[Change::Assoc(id), Change::Properties(id)])
    }

    fn store_property(
        &mut self,
        id: ObjectId,
        key: &str,
        value: SimpleValue,
        indexed: bool,
    ) -> Result<(), DmxError> {
        self.state.store_property(id, key, value, indexed)?;
        self.record(&[Change::Properties(id)])
    }

    fn remove_property(&mut self, id: ObjectId, key: &str) -> Result<(), DmxError> {
        self.state
            .remove_property(id, key)
            .ok_or_else(|| DmxError::PropertyNotFound {
                id,
                key: key.to_string(),
            })?;
        self.record(&[Change::Properties(id)])
    }

    fn begin(&mut self) -> Result<(), DmxError> {
        if self.in_transaction {
            return Err(DmxError::InvalidState(
                "a transaction is already active".to_string(),
            ));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DmxError> {
        if !self.in_transaction {
            return Err(DmxError::InvalidState(
                "no active transaction to commit".to_string(),
            ));
        }
        self.in_transaction = false;
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "commit failed, reloading from disk");
            self.reload()?;
            return Err(e);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DmxError> {
        if !self.in_transaction {
            return Err(DmxError::InvalidState(
                "no active transaction to roll back".to_string(),
            ));
        }
        self.in_transaction = false;
        self.reload()
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::RoleRecord;
    use tempfile::tempdir;

    fn composition(id: ObjectId, parent: ObjectId, child: ObjectId) -> AssocRecord {
        AssocRecord {
            id,
            uri: None,
            type_uri: "dmx.core.composition".to_string(),
            value: SimpleValue::default(),
            role1: RoleRecord::new("dmx.core.parent", PlayerRef::Topic(parent)),
            role2: RoleRecord::new("dmx.core.child", PlayerRef::Topic(child)),
        }
    }

    #[test]
    fn persistence() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let (parent, child, assoc) = {
            let mut store = RedbStore::open(&db_path).expect("open db");
            let parent = store.next_id().unwrap();
            store
                .put_topic(TopicRecord::new(parent, Some("people.alice"), "dmx.contacts.person", "Alice"))
                .unwrap();
            let child = store.next_id().unwrap();
            store
                .put_topic(TopicRecord::new(child, None, "dmx.contacts.name", "Alice"))
                .unwrap();
            let assoc = store.next_id().unwrap();
            store.put_assoc(composition(assoc, parent, child)).unwrap();
            store
                .store_property(child, "note", SimpleValue::from(7i64), true)
                .unwrap();
            (parent, child, assoc)
        };

        let mut store = RedbStore::open(&db_path).expect("reopen db");
        assert_eq!(
            store.fetch_topic_by_uri("people.alice").unwrap().map(|t| t.id),
            Some(parent)
        );
        assert_eq!(store.fetch_assocs_of(PlayerRef::Topic(child)).unwrap().len(), 1);
        assert_eq!(
            store.query_by_property("note", &SimpleValue::from(7i64)).unwrap(),
            [child]
        );
        assert!(store.next_id().unwrap() > assoc);

        store.compact().expect("compact");
        assert_eq!(store.topic_count(), 2);
        assert!(store.fetch_assoc(assoc).unwrap().is_some());
    }

    #[test]
    fn transaction_commit_and_rollback() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let mut store = RedbStore::open(&db_path).expect("open db");
        store.begin().unwrap();
        let kept = store.next_id().unwrap();
        store
            .put_topic(TopicRecord::new(kept, None, "t", "kept"))
            .unwrap();
        store.commit().unwrap();

        store.begin().unwrap();
        let dropped = store.next_id().unwrap();
        store
            .put_topic(TopicRecord::new(dropped, None, "t", "dropped"))
            .unwrap();
        store.delete_topic(kept).unwrap();
        store.rollback().unwrap();

        assert!(store.fetch_topic(kept).unwrap().is_some());
        assert!(store.fetch_topic(dropped).unwrap().is_none());
        drop(store);

        let store = RedbStore::open(&db_path).expect("reopen db");
        assert_eq!(store.topic_count(), 1);
    }

    #[test]
    fn nested_begin_is_invalid_state() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store.begin().unwrap();
        let err = store.begin().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidState);
        assert!(store.commit().is_ok());
        assert!(store.commit().is_err());
    }
}
