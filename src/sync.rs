use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde_json::{Map, Value};

use crate::aggregate::AggregateRow;
use crate::error::{AnalysisError, Result, StoreError};

pub type Document = Map<String, Value>;
type Collections = BTreeMap<String, BTreeMap<String, Document>>;

pub trait DocumentStore {
    fn list_keys(&self, collection: &str) -> std::result::Result<Vec<String>, StoreError>;
    fn delete(&mut self, collection: &str, key: &str) -> std::result::Result<(), StoreError>;
    fn set(
        &mut self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> std::result::Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub deleted: usize,
    pub written: usize,
}

pub fn to_document(row: &AggregateRow) -> Result<Document> {
    match serde_json::to_value(row)? {
        Value::Object(map) => Ok(map),
        other => Err(AnalysisError::InvalidField {
            field: "document".to_string(),
            value: other.to_string(),
        }),
    }
}

/// Deletes every stored document, then writes one per row under `client_code_route_mode`.
/// Not atomic: a store failure reports how many deletes and writes went through.
pub fn replace_collection(
    store: &mut dyn DocumentStore,
    collection: &str,
    rows: &[AggregateRow],
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let sync_error = |report: &SyncReport, cause: StoreError| AnalysisError::Sync {
        deleted: report.deleted,
        written: report.written,
        cause: cause.to_string(),
    };

    // documents are built up front so nothing is deleted for a view that cannot be written
    let mut documents = Vec::with_capacity(rows.len());
    let mut seen = BTreeSet::new();
    for row in rows {
        let id = row.key().document_id();
        if !seen.insert(id.clone()) {
            warn!("document '{}' appears twice in the view, last row wins", id);
        }
        documents.push((id, to_document(row)?));
    }

    let existing = store
        .list_keys(collection)
        .map_err(|e| sync_error(&report, e))?;
    for key in existing {
        store
            .delete(collection, &key)
            .map_err(|e| sync_error(&report, e))?;
        report.deleted += 1;
    }

    for (id, document) in documents {
        store
            .set(collection, &id, document)
            .map_err(|e| sync_error(&report, e))?;
        report.written += 1;
    }

    info!(
        "synced collection '{}': {} deleted, {} written",
        collection, report.deleted, report.written
    );
    Ok(report)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Collections,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn collection(&self, name: &str) -> Option<&BTreeMap<String, Document>> {
        self.collections.get(name)
    }
}

impl DocumentStore for MemoryStore {
    fn list_keys(&self, collection: &str) -> std::result::Result<Vec<String>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&mut self, collection: &str, key: &str) -> std::result::Result<(), StoreError> {
        if let Some(docs) = self.collections.get_mut(collection) {
            docs.remove(key);
        }
        Ok(())
    }

    fn set(
        &mut self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> std::result::Result<(), StoreError> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
        Ok(())
    }
}

/// One pretty-printed JSON file, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    fn read(&self) -> std::result::Result<Collections, StoreError> {
        if !self.path.exists() {
            return Ok(Collections::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| StoreError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| StoreError(e.to_string()))
    }

    fn write(&self, collections: &Collections) -> std::result::Result<(), StoreError> {
        let content =
            serde_json::to_string_pretty(collections).map_err(|e| StoreError(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| StoreError(e.to_string()))
    }
}

impl DocumentStore for JsonFileStore {
    fn list_keys(&self, collection: &str) -> std::result::Result<Vec<String>, StoreError> {
        Ok(self
            .read()?
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&mut self, collection: &str, key: &str) -> std::result::Result<(), StoreError> {
        let mut collections = self.read()?;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(key);
        }
        self.write(&collections)
    }

    fn set(
        &mut self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> std::result::Result<(), StoreError> {
        let mut collections = self.read()?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
        self.write(&collections)
    }
}

#[cfg(test)]
use crate::aggregate::RowKey;

#[cfg(test)]
fn row(code: &str, route: &str, success: u64, failed: u64) -> AggregateRow {
    AggregateRow::new(
        RowKey {
            client_name: "Acme".to_string(),
            client_code: code.to_string(),
            route: route.to_string(),
            payment_mode: "UPI".to_string(),
        },
        success,
        failed,
    )
}

/// Accepts a fixed number of writes, then refuses.
#[cfg(test)]
struct FlakyStore {
    inner: MemoryStore,
    writes_left: usize,
}

#[cfg(test)]
impl DocumentStore for FlakyStore {
    fn list_keys(&self, collection: &str) -> std::result::Result<Vec<String>, StoreError> {
        self.inner.list_keys(collection)
    }

    fn delete(&mut self, collection: &str, key: &str) -> std::result::Result<(), StoreError> {
        self.inner.delete(collection, key)
    }

    fn set(
        &mut self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> std::result::Result<(), StoreError> {
        if self.writes_left == 0 {
            return Err(StoreError("quota exceeded".to_string()));
        }
        self.writes_left -= 1;
        self.inner.set(collection, key, document)
    }
}

#[test]
fn replaces_previous_documents() {
    let mut store = MemoryStore::new();
    replace_collection(&mut store, "pipe_summary", &[row("OLD", "BOB", 1, 0)]).unwrap();
    let report = replace_collection(
        &mut store,
        "pipe_summary",
        &[row("C1", "BOB", 1, 1), row("C2", "HDFC", 3, 0)],
    )
    .unwrap();
    assert_eq!(report, SyncReport { deleted: 1, written: 2 });

    let docs = store.collection("pipe_summary").unwrap();
    let keys: Vec<&str> = docs.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["C1_BOB_UPI", "C2_HDFC_UPI"]);
    let doc = &docs["C1_BOB_UPI"];
    assert_eq!(doc["client_name"], "Acme");
    assert_eq!(doc["success_count"], 1);
    assert_eq!(doc["total"], 2);
    assert_eq!(doc["success_rate"], "50.00");
}

#[test]
fn partial_failure_is_reported() {
    let mut store = FlakyStore {
        inner: MemoryStore::new(),
        writes_left: 1,
    };
    let err = replace_collection(
        &mut store,
        "pipe_summary",
        &[row("C1", "BOB", 1, 0), row("C2", "BOB", 1, 0)],
    )
    .unwrap_err();
    match err {
        AnalysisError::Sync { deleted, written, cause } => {
            assert_eq!((deleted, written), (0, 1));
            assert_eq!(cause, "quota exceeded");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(store.inner.collection("pipe_summary").unwrap().len(), 1);
}

#[test]
fn json_file_store_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mut store = JsonFileStore::new(&path);
    replace_collection(&mut store, "pipe_summary", &[row("C1", "BOB", 4, 1)]).unwrap();

    let reopened = JsonFileStore::new(&path);
    assert_eq!(
        reopened.list_keys("pipe_summary").unwrap(),
        vec!["C1_BOB_UPI".to_string()]
    );
    assert!(reopened.list_keys("elsewhere").unwrap().is_empty());
}
