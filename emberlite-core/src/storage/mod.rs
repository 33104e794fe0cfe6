// storage/mod.rs
// Document catalog: databases -> collections -> documents in insertion order

mod journal;

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::document::Document;
use crate::error::{EngineError, Result};
use crate::options::ServerOptions;
use crate::query::Query;

pub use journal::{Journal, JournalRecord};

/// One collection's documents, kept in the order they were stored.
#[derive(Debug, Default)]
pub struct CollectionData {
    documents: Vec<Document>,
    ids: HashSet<String>,
}

impl CollectionData {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

type Collections = BTreeMap<String, CollectionData>;

pub struct StorageEngine {
    databases: BTreeMap<String, Collections>,
    journal: Option<Journal>,
}

impl StorageEngine {
    /// In-memory storage with no journal.
    pub fn in_memory() -> Self {
        StorageEngine { databases: BTreeMap::new(), journal: None }
    }

    /// Open storage per the startup options, replaying the journal if one is configured.
    pub fn open(options: &ServerOptions) -> Result<Self> {
        let Some(path) = options.journal_path() else {
            return Ok(Self::in_memory());
        };

        let mut journal = Journal::open(&path)?;
        let records = journal.replay()?;
        let replayed = records.len();

        let mut storage = Self::in_memory();
        for record in records {
            storage.apply(record)?;
        }
        storage.journal = Some(journal);

        tracing::info!(path = %path.display(), replayed, "journal replayed");
        Ok(storage)
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    fn apply(&mut self, record: JournalRecord) -> Result<usize> {
        match record {
            JournalRecord::Insert { db, coll, documents } => {
                let documents = documents
                    .into_iter()
                    .map(Document::from_value)
                    .collect::<Result<Vec<_>>>()?;
                self.apply_insert(&db, &coll, documents)
            }
            JournalRecord::DropCollection { db, coll } => Ok(usize::from(self.apply_drop_collection(&db, &coll))),
            JournalRecord::DropDatabase { db } => Ok(usize::from(self.databases.remove(&db).is_some())),
        }
    }

    fn apply_insert(&mut self, db: &str, coll: &str, documents: Vec<Document>) -> Result<usize> {
        let collection = self
            .databases
            .entry(db.to_string())
            .or_default()
            .entry(coll.to_string())
            .or_default();

        let count = documents.len();
        for doc in documents {
            if let Some(key) = doc.id_key() {
                collection.ids.insert(key);
            }
            collection.documents.push(doc);
        }
        Ok(count)
    }

    fn apply_drop_collection(&mut self, db: &str, coll: &str) -> bool {
        let Some(collections) = self.databases.get_mut(db) else {
            return false;
        };
        let removed = collections.remove(coll).is_some();
        if collections.is_empty() {
            self.databases.remove(db);
        }
        removed
    }

    fn log(&mut self, record: &JournalRecord) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(record)?;
        }
        Ok(())
    }

    /// Insert documents, all or nothing: every `_id` is checked before any is stored.
    pub fn insert(&mut self, db: &str, coll: &str, mut documents: Vec<Document>) -> Result<usize> {
        let namespace = format!("{}.{}", db, coll);
        let existing = self.databases.get(db).and_then(|c| c.get(coll)).map(|c| &c.ids);
        let mut batch_ids = HashSet::with_capacity(documents.len());

        for doc in documents.iter_mut() {
            let key = doc.ensure_id().to_string();
            if existing.map_or(false, |ids| ids.contains(&key)) || !batch_ids.insert(key.clone()) {
                return Err(EngineError::DuplicateKey { namespace, key });
            }
        }

        self.log(&JournalRecord::Insert {
            db: db.to_string(),
            coll: coll.to_string(),
            documents: documents.iter().cloned().map(Document::into_value).collect(),
        })?;
        self.apply_insert(db, coll, documents)
    }

    /// Missing databases and collections count as empty.
    pub fn count(&self, db: &str, coll: &str, filter: &Query) -> u64 {
        match self.collection(db, coll) {
            Some(data) if filter.is_empty() => data.len() as u64,
            Some(data) => data.documents.iter().filter(|doc| filter.matches(doc)).count() as u64,
            None => 0,
        }
    }

    /// Snapshot of a collection's documents in storage order.
    pub fn scan(&self, db: &str, coll: &str) -> Vec<Document> {
        self.collection(db, coll).map(|c| c.documents.clone()).unwrap_or_default()
    }

    pub fn collection(&self, db: &str, coll: &str) -> Option<&CollectionData> {
        self.databases.get(db).and_then(|c| c.get(coll))
    }

    pub fn drop_collection(&mut self, db: &str, coll: &str) -> Result<bool> {
        if self.collection(db, coll).is_none() {
            return Ok(false);
        }
        self.log(&JournalRecord::DropCollection { db: db.to_string(), coll: coll.to_string() })?;
        Ok(self.apply_drop_collection(db, coll))
    }

    pub fn drop_database(&mut self, db: &str) -> Result<bool> {
        if !self.databases.contains_key(db) {
            return Ok(false);
        }
        self.log(&JournalRecord::DropDatabase { db: db.to_string() })?;
        Ok(self.databases.remove(db).is_some())
    }

    pub fn list_databases(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    pub fn list_collections(&self, db: &str) -> Vec<String> {
        self.databases
            .get(db)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Sync the journal; returns whether anything was written.
    pub fn flush(&mut self) -> Result<bool> {
        match self.journal.as_mut() {
            Some(journal) => journal.sync(),
            None => Ok(false),
        }
    }

    pub fn stats(&self) -> Value {
        serde_json::json!({
            "durable": self.is_durable(),
            "journal": self.journal.as_ref().map(|j| j.path().display().to_string()),
            "databases": self.databases.iter().map(|(name, collections)| {
                serde_json::json!({
                    "name": name,
                    "collections": collections.len(),
                    "objects": collections.values().map(CollectionData::len).sum::<usize>(),
                })
            }).collect::<Vec<_>>(),
        })
    }
}
