use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use csv::{ReaderBuilder, Trim};
use log::{error, info};
use serde::Deserialize;

use crate::error::{AnalysisError, EmptyReason, Result, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    pub client_code: Option<String>,
    pub client_name: Option<String>,
    #[serde(rename = "pg_pay_mode")]
    pub route: Option<String>,
    pub payment_mode: Option<String>,
    pub status: Option<String>,
    #[serde(skip)]
    pub batch: String,
}

impl RawRecord {
    pub fn new(client_code: &str, route: &str, payment_mode: &str, status: &str) -> Self {
        RawRecord {
            client_code: Some(client_code.to_string()),
            client_name: None,
            route: Some(route.to_string()),
            payment_mode: Some(payment_mode.to_string()),
            status: Some(status.to_string()),
            batch: String::new(),
        }
    }

    pub fn with_client_name(mut self, name: &str) -> Self {
        self.client_name = Some(name.to_string());
        self
    }

    pub fn in_batch(mut self, batch: &str) -> Self {
        self.batch = batch.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: String,
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl Batch {
    pub fn new(id: &str, columns: &[&str], records: Vec<RawRecord>) -> Self {
        Batch {
            id: id.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            records: records.into_iter().map(|r| r.in_batch(id)).collect(),
        }
    }

    pub fn parse<R: io::Read>(id: &str, source: R) -> std::result::Result<Self, csv::Error> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::Headers)
            .flexible(true)
            .from_reader(source);
        let columns = reader.headers()?.iter().map(str::to_string).collect();
        let records = reader
            .deserialize::<RawRecord>()
            .map(|row| row.map(|record| record.in_batch(id)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Batch {
            id: id.to_string(),
            columns,
            records,
        })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

pub trait BatchSource {
    /// Available batch ids, sorted ascending.
    fn list_batches(&self) -> Result<Vec<String>>;
    fn fetch(&self, id: &str) -> Result<Vec<u8>>;
}

pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectorySource { dir: dir.into() }
    }
}

impl BatchSource for DirectorySource {
    fn list_batches(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(format!("{}.csv", id));
        fs::read(&path).map_err(|e| AnalysisError::BatchLoad {
            batch: id.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

/// Minimal object storage surface: list keys by prefix, download by key.
pub trait ObjectStore {
    fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError>;
    fn download(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError>;
}

impl ObjectStore for BTreeMap<String, Vec<u8>> {
    fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
        Ok(self
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn download(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
        self.get(key)
            .cloned()
            .ok_or_else(|| StoreError(format!("no such object '{}'", key)))
    }
}

pub struct ObjectStoreSource<S> {
    store: S,
    prefix: String,
}

impl<S: ObjectStore> ObjectStoreSource<S> {
    pub fn new(store: S, prefix: &str) -> Self {
        ObjectStoreSource {
            store,
            prefix: prefix.to_string(),
        }
    }
}

impl<S: ObjectStore> BatchSource for ObjectStoreSource<S> {
    fn list_batches(&self) -> Result<Vec<String>> {
        let keys = self
            .store
            .list(&self.prefix)
            .map_err(|e| AnalysisError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        let mut ids: Vec<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(self.prefix.as_str()))
            .filter_map(|name| name.strip_suffix(".csv"))
            .filter(|id| !id.contains('/'))
            .map(str::to_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let key = format!("{}{}.csv", self.prefix, id);
        self.store
            .download(&key)
            .map_err(|e| AnalysisError::BatchLoad {
                batch: id.to_string(),
                reason: e.to_string(),
            })
    }
}

pub fn latest_batch(source: &dyn BatchSource) -> Result<Option<String>> {
    Ok(source.list_batches()?.pop())
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub batches: Vec<Batch>,
    /// Per-batch `BatchLoad` errors; those batches are left out of `batches`.
    pub failures: Vec<AnalysisError>,
    pub durations: Vec<(String, Duration)>,
}

impl LoadOutcome {
    pub fn summary(&self) -> String {
        self.durations
            .iter()
            .map(|(id, took)| format!("{} ({:.2}s)", id, took.as_secs_f64()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn load_batches(source: &dyn BatchSource, ids: &[String]) -> Result<LoadOutcome> {
    if ids.is_empty() {
        return Err(AnalysisError::EmptyResult(EmptyReason::NoBatchesSelected));
    }

    let mut outcome = LoadOutcome::default();
    for id in ids {
        let started = Instant::now();
        let loaded = source.fetch(id).and_then(|bytes| {
            Batch::parse(id, bytes.as_slice()).map_err(|e| AnalysisError::BatchLoad {
                batch: id.clone(),
                reason: e.to_string(),
            })
        });
        match loaded {
            Ok(batch) => {
                let took = started.elapsed();
                info!("loaded batch {} ({} rows) in {:?}", id, batch.records.len(), took);
                outcome.durations.push((id.clone(), took));
                outcome.batches.push(batch);
            }
            Err(e) => {
                error!("{}", e);
                outcome.failures.push(e);
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
fn object_store() -> BTreeMap<String, Vec<u8>> {
    let mut store = BTreeMap::new();
    store.insert(
        "pipe_data/2024-01-02.csv".to_string(),
        b"client_code,pg_pay_mode,payment_mode,status\nC1,BOB,UPI,success\n".to_vec(),
    );
    store.insert(
        "pipe_data/2024-01-01.csv".to_string(),
        b"client_code,client_name,pg_pay_mode,payment_mode,status\nC2,Acme,HDFC,CARD,failed\n"
            .to_vec(),
    );
    store.insert("pipe_data/readme.txt".to_string(), b"ignored".to_vec());
    store.insert("other/2024-01-03.csv".to_string(), b"ignored".to_vec());
    store
}

#[test]
fn parse_tags_records_with_batch() {
    let data = " client_code , pg_pay_mode,payment_mode,status,extra\nC1, BOB ,UPI,SUCCESS,x\n";
    let batch = Batch::parse("2024-01-01", data.as_bytes()).unwrap();
    assert!(batch.has_column("client_code"));
    assert!(!batch.has_column("client_name"));
    assert_eq!(batch.records.len(), 1);
    let record = &batch.records[0];
    assert_eq!(record.batch, "2024-01-01");
    assert_eq!(record.route.as_deref(), Some(" BOB "));
    assert_eq!(record.client_name, None);
}

#[test]
fn short_row_keeps_the_rest_of_the_batch() {
    let data = "client_code,pg_pay_mode,payment_mode,status\nC1,BOB,UPI,success\nC1,BOB,UPI\n";
    let batch = Batch::parse("2024-01-01", data.as_bytes()).unwrap();
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.records[0].status.as_deref(), Some("success"));
    assert_eq!(batch.records[1].payment_mode.as_deref(), Some("UPI"));
    assert_eq!(batch.records[1].status, None);
}

#[test]
fn object_store_lists_csv_under_prefix() {
    let source = ObjectStoreSource::new(object_store(), "pipe_data/");
    assert_eq!(
        source.list_batches().unwrap(),
        vec!["2024-01-01".to_string(), "2024-01-02".to_string()]
    );
    assert_eq!(latest_batch(&source).unwrap().as_deref(), Some("2024-01-02"));
}

#[test]
fn failed_batch_is_skipped() {
    let source = ObjectStoreSource::new(object_store(), "pipe_data/");
    let ids = vec!["2024-01-01".to_string(), "missing".to_string(), "2024-01-02".to_string()];
    let outcome = load_batches(&source, &ids).unwrap();
    let loaded: Vec<&str> = outcome.batches.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(loaded, vec!["2024-01-01", "2024-01-02"]);
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(
        &outcome.failures[0],
        AnalysisError::BatchLoad { batch, .. } if batch == "missing"
    ));
    assert_eq!(outcome.durations.len(), 2);
}

#[test]
fn no_selection_is_empty_result() {
    let source = ObjectStoreSource::new(object_store(), "pipe_data/");
    let err = load_batches(&source, &[]).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::EmptyResult(EmptyReason::NoBatchesSelected)
    ));
}

#[test]
fn directory_source_reads_csv_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("2024-02-01.csv"),
        "client_code,pg_pay_mode,payment_mode,status\nC1,BOB,UPI,success\n",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
    let source = DirectorySource::new(dir.path());
    assert_eq!(source.list_batches().unwrap(), vec!["2024-02-01".to_string()]);
    let outcome = load_batches(&source, &["2024-02-01".to_string()]).unwrap();
    assert_eq!(outcome.batches[0].records.len(), 1);
    assert!(matches!(
        source.fetch("2024-02-02"),
        Err(AnalysisError::BatchLoad { .. })
    ));
}
