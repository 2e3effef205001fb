use std::fs;

use pipe_analysis::batch::{load_batches, DirectorySource};
use pipe_analysis::export::{read_summary, to_csv_bytes};
use pipe_analysis::error::StoreError;
use pipe_analysis::sync::{replace_collection, Document, DocumentStore, MemoryStore};
use pipe_analysis::{
    run, AnalysisConfig, AnalysisError, EmptyReason, HealthTier, Session, SortOrder,
};
use rust_decimal_macros::dec;
use tempfile::TempDir;

fn data_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(format!("{}.csv", name)), content).unwrap();
    }
    dir
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

const DAY_ONE: &str = "\
client_code,client_name,pg_pay_mode,payment_mode,status
C1,Acme,BOB,UPI,SUCCESS
C1,Acme,BOB,UPI,Failed - timeout
C1,Acme,BOB,UPI,pending
C2,Globex,HDFC,CARD,success
C2,Globex,HDFC,CARD,success
C3,Initech,BOB,UPI,success
C3,Initech,BOB,UPI,success
C3,Initech,BOB,UPI,success
C3,Initech,BOB,UPI,failed
";

const DAY_TWO: &str = "\
client_code,client_name,pg_pay_mode,payment_mode,status
 C1 , Acme ,BOB,UPI,success
C2,Globex,HDFC,CARD,transaction failed
";

#[test]
fn batches_are_additive() {
    let dir = data_dir(&[("2024-01-01", DAY_ONE), ("2024-01-02", DAY_TWO)]);
    let source = DirectorySource::new(dir.path());
    let outcome = load_batches(&source, &ids(&["2024-01-01", "2024-01-02"])).unwrap();
    let report = run(&outcome.batches, &AnalysisConfig::default(), &Session::default()).unwrap();

    assert_eq!(report.totals.total, 10);
    assert_eq!(report.totals.success, 7);
    assert_eq!(report.totals.failed, 3);
    assert_eq!(report.rows.len(), 3);

    let acme = &report.rows[0];
    assert_eq!(acme.client_name, "Acme");
    assert_eq!((acme.success_count, acme.failed_count), (2, 1));
    assert_eq!(acme.success_rate, dec!(66.67));
    assert_eq!(acme.health_tier, Some(HealthTier::Critical));

    let globex = &report.rows[1];
    assert_eq!((globex.success_count, globex.failed_count), (2, 1));

    let initech = &report.rows[2];
    assert_eq!(initech.success_rate, dec!(75));
    assert_eq!(initech.health_tier, Some(HealthTier::Warning));

    assert_eq!(report.export_name(), "PIPE_Analysis_(2024-01-01-2024-01-02).csv");
}

#[test]
fn missing_status_in_one_batch_halts_everything() {
    let dir = data_dir(&[
        ("2024-01-01", DAY_ONE),
        ("2024-01-02", "client_code,pg_pay_mode,payment_mode\nC1,BOB,UPI\n"),
    ]);
    let source = DirectorySource::new(dir.path());
    let outcome = load_batches(&source, &ids(&["2024-01-01", "2024-01-02"])).unwrap();
    assert_eq!(outcome.batches.len(), 2);

    let err = run(&outcome.batches, &AnalysisConfig::default(), &Session::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::MissingColumn(ref cols) if cols == &["status".to_string()]));
    assert!(!err.is_informational());
}

#[test]
fn unreadable_batch_is_dropped_and_run_continues() {
    let dir = data_dir(&[("2024-01-01", DAY_ONE)]);
    fs::write(
        dir.path().join("2024-01-02.csv"),
        b"client_code,pg_pay_mode,payment_mode,status\nC1,BOB,UPI,\xffok\n",
    )
    .unwrap();
    let source = DirectorySource::new(dir.path());
    let outcome = load_batches(&source, &ids(&["2024-01-02", "2024-01-03", "2024-01-01"])).unwrap();
    assert_eq!(outcome.failures.len(), 2);
    assert_eq!(outcome.batches.len(), 1);

    let report = run(&outcome.batches, &AnalysisConfig::default(), &Session::default()).unwrap();
    assert_eq!(report.batch_ids, ids(&["2024-01-01"]));
}

#[test]
fn nothing_loaded_is_informational() {
    let dir = data_dir(&[]);
    let source = DirectorySource::new(dir.path());

    let err = load_batches(&source, &[]).unwrap_err();
    assert!(matches!(err, AnalysisError::EmptyResult(EmptyReason::NoBatchesSelected)));

    let outcome = load_batches(&source, &ids(&["2024-01-01"])).unwrap();
    let err = run(&outcome.batches, &AnalysisConfig::default(), &Session::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::EmptyResult(EmptyReason::NoBatchesLoaded)));
}

#[test]
fn client_name_column_is_optional() {
    let dir = data_dir(&[(
        "2024-01-01",
        "client_code,pg_pay_mode,payment_mode,status\nC9,BOB,NB,success\n",
    )]);
    let source = DirectorySource::new(dir.path());
    let outcome = load_batches(&source, &ids(&["2024-01-01"])).unwrap();
    let report = run(&outcome.batches, &AnalysisConfig::default(), &Session::default()).unwrap();
    assert_eq!(report.rows[0].client_name, "Unknown");
    assert_eq!(report.rows[0].health_tier, Some(HealthTier::Healthy));
}

#[test]
fn summary_is_stable_while_filtering() {
    let dir = data_dir(&[("2024-01-01", DAY_ONE)]);
    let source = DirectorySource::new(dir.path());
    let batches = load_batches(&source, &ids(&["2024-01-01"])).unwrap().batches;
    let config = AnalysisConfig::default();

    let session = Session::default().sort_by(SortOrder::Ascending);
    let full = run(&batches, &config, &session).unwrap();
    let codes: Vec<&str> = full.view.iter().map(|r| r.client_code.as_str()).collect();
    assert_eq!(codes, vec!["C1", "C3", "C2"]);

    let session = session.select_tier(HealthTier::Critical);
    let critical = run(&batches, &config, &session).unwrap();
    assert_eq!(critical.view.len(), 1);
    assert_eq!(critical.summary, full.summary);
    assert_eq!(critical.summary.critical, 1);
    assert_eq!(critical.summary.warning, 1);
    assert_eq!(critical.summary.healthy, 1);

    let refreshed = run(&batches, &config, &session.refresh()).unwrap();
    assert_eq!(refreshed.view, full.view);
}

#[test]
fn export_of_filtered_view_round_trips() {
    let dir = data_dir(&[("2024-01-01", DAY_ONE), ("2024-01-02", DAY_TWO)]);
    let source = DirectorySource::new(dir.path());
    let batches = load_batches(&source, &ids(&["2024-01-01", "2024-01-02"])).unwrap().batches;
    let session = Session::default()
        .sort_by(SortOrder::Descending)
        .select_tier(HealthTier::Critical);
    let report = run(&batches, &AnalysisConfig::default(), &session).unwrap();
    assert_eq!(report.view.len(), 2);

    let bytes = to_csv_bytes(&report.view).unwrap();
    assert_eq!(read_summary(bytes.as_slice()).unwrap(), report.view);
}

struct ReadOnlyStore;

impl DocumentStore for ReadOnlyStore {
    fn list_keys(&self, _collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(vec!["C1_OLD_UPI".to_string()])
    }

    fn delete(&mut self, _collection: &str, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn set(&mut self, _collection: &str, _key: &str, _document: Document) -> Result<(), StoreError> {
        Err(StoreError("permission denied".to_string()))
    }
}

#[test]
fn sync_writes_one_document_per_row() {
    let dir = data_dir(&[("2024-01-01", DAY_ONE)]);
    let source = DirectorySource::new(dir.path());
    let batches = load_batches(&source, &ids(&["2024-01-01"])).unwrap().batches;
    let report = run(&batches, &AnalysisConfig::default(), &Session::default()).unwrap();

    let mut store = MemoryStore::new();
    let done = replace_collection(&mut store, "pipe_summary", &report.view).unwrap();
    assert_eq!(done.written, 3);
    let docs = store.collection("pipe_summary").unwrap();
    assert!(docs.contains_key("C3_BOB_UPI"));
    assert_eq!(docs["C3_BOB_UPI"]["health_tier"], "Warning");
}

#[test]
fn sync_failure_leaves_view_usable() {
    let dir = data_dir(&[("2024-01-01", DAY_ONE)]);
    let source = DirectorySource::new(dir.path());
    let batches = load_batches(&source, &ids(&["2024-01-01"])).unwrap().batches;
    let report = run(&batches, &AnalysisConfig::default(), &Session::default()).unwrap();

    let err = replace_collection(&mut ReadOnlyStore, "pipe_summary", &report.view).unwrap_err();
    match err {
        AnalysisError::Sync { deleted, written, ref cause } => {
            assert_eq!((deleted, written), (1, 0));
            assert_eq!(cause, "permission denied");
        }
        ref other => panic!("unexpected error {:?}", other),
    }
    assert!(!err.is_informational());

    let bytes = to_csv_bytes(&report.view).unwrap();
    assert_eq!(read_summary(bytes.as_slice()).unwrap(), report.view);
}
