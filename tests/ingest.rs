use std::fs;
use std::path::Path;
use std::sync::Mutex;

use camino::Utf8PathBuf;

use medimeta_indexer::db::{RelationalStore, SqliteStore};
use medimeta_indexer::elements::{DecodedSet, ElementEntry, ElementSpec, TagValue};
use medimeta_indexer::error::IndexError;
use medimeta_indexer::extract::TagSource;
use medimeta_indexer::ingest::{IngestOptions, Ingestor, ensure_table};
use medimeta_indexer::record::ColumnValue;

struct MockSource;

impl TagSource for MockSource {
    fn file_extension(&self) -> &'static str {
        "dcm"
    }

    fn validate_spec(&self, _spec: &ElementSpec) -> Result<(), IndexError> {
        Ok(())
    }

    fn extract(&self, _path: &Path, spec: &ElementSpec) -> Result<DecodedSet, IndexError> {
        let mut decoded = spec.decoded_set();
        decoded.set("modality", TagValue::Text("MR".to_string()));
        Ok(decoded)
    }
}

#[derive(Default)]
struct RecordingStore {
    ddl: Mutex<Vec<String>>,
    inserts: Mutex<Vec<(String, usize)>>,
}

impl RelationalStore for RecordingStore {
    fn table_exists(&self, _table: &str) -> Result<bool, IndexError> {
        Ok(false)
    }

    fn execute_ddl(&self, statement: &str) -> Result<(), IndexError> {
        self.ddl.lock().unwrap().push(statement.to_string());
        Ok(())
    }

    fn execute(&self, statement: &str, values: &[ColumnValue]) -> Result<usize, IndexError> {
        self.inserts
            .lock()
            .unwrap()
            .push((statement.to_string(), values.len()));
        Ok(1)
    }

    fn drop_table(&self, _table: &str) -> Result<(), IndexError> {
        Ok(())
    }
}

fn spec() -> ElementSpec {
    ElementSpec::from_entries(vec![ElementEntry {
        name: "modality".to_string(),
        source_key: "0008,0060".to_string(),
        db_datatype: "VARCHAR(255)".to_string(),
        calculation_only: false,
    }])
    .unwrap()
}

fn seed_folder(root: &Path) {
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.dcm"), b"dcm").unwrap();
    fs::write(root.join("sub/b.dcm"), b"dcm").unwrap();
    fs::write(root.join("c.dcm"), b"dcm").unwrap();
    fs::write(root.join("notes.txt"), b"not an image").unwrap();
}

#[test]
fn ingests_only_matching_files() {
    let temp = tempfile::tempdir().unwrap();
    seed_folder(temp.path());
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let ingestor = Ingestor::new(
        MockSource,
        RecordingStore::default(),
        "image_metadata".to_string(),
        root,
        Vec::new(),
        spec(),
    );

    let report = ingestor.run(&IngestOptions::default()).unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.inserted, 3);
    assert!(report.skipped.is_empty());
}

#[test]
fn inserts_bind_identity_plus_persisted_values() {
    let temp = tempfile::tempdir().unwrap();
    seed_folder(temp.path());
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let store = RecordingStore::default();
    let ingestor = Ingestor::new(
        MockSource,
        &store,
        "image_metadata".to_string(),
        root,
        Vec::new(),
        spec(),
    );
    ingestor.run(&IngestOptions::default()).unwrap();

    let ddl = store.ddl.lock().unwrap();
    assert_eq!(ddl.len(), 1);
    assert!(ddl[0].starts_with("CREATE TABLE image_metadata"));

    let inserts = store.inserts.lock().unwrap();
    assert_eq!(inserts.len(), 3);
    for (sql, bound) in inserts.iter() {
        assert!(sql.starts_with("INSERT INTO image_metadata (file_name, file_path, modality)"));
        // two identity columns + one persisted entry
        assert_eq!(*bound, 3);
    }
}

#[test]
fn name_allow_list_filters_files() {
    let temp = tempfile::tempdir().unwrap();
    seed_folder(temp.path());
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let ingestor = Ingestor::new(
        MockSource,
        RecordingStore::default(),
        "image_metadata".to_string(),
        root,
        vec!["b".to_string()],
        spec(),
    );

    let report = ingestor.run(&IngestOptions::default()).unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.inserted, 1);
}

#[test]
fn dry_run_leaves_store_untouched() {
    let temp = tempfile::tempdir().unwrap();
    seed_folder(temp.path());
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let ingestor = Ingestor::new(
        MockSource,
        RecordingStore::default(),
        "image_metadata".to_string(),
        root,
        Vec::new(),
        spec(),
    );

    let report = ingestor
        .run(&IngestOptions { dry_run: true })
        .unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.inserted, 0);
}

#[test]
fn persistence_failure_skips_file_and_continues() {
    let temp = tempfile::tempdir().unwrap();
    seed_folder(temp.path());
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let db_path = Utf8PathBuf::from_path_buf(temp.path().join("meta.db")).unwrap();

    let store = SqliteStore::open(&db_path).unwrap();
    let spec = spec();
    ensure_table(&store, "image_metadata", &spec).unwrap();

    // occupy b.dcm's primary key so its insert violates the constraint
    store
        .execute(
            "INSERT INTO image_metadata (file_name, file_path, modality)\nVALUES (?1, ?2, ?3);",
            &[
                ColumnValue::Text("b.dcm".to_string()),
                ColumnValue::Text("elsewhere/b.dcm".to_string()),
                ColumnValue::Null,
            ],
        )
        .unwrap();

    let ingestor = Ingestor::new(
        MockSource,
        store,
        "image_metadata".to_string(),
        root,
        Vec::new(),
        spec,
    );
    let report = ingestor.run(&IngestOptions::default()).unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].file.ends_with("b.dcm"));

    // a and c landed next to the pre-existing row
    let conn = rusqlite::Connection::open(db_path.as_std_path()).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM image_metadata", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 3);
    let modality: String = conn
        .query_row(
            "SELECT modality FROM image_metadata WHERE file_name = ?1",
            ["a.dcm"],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(modality, "MR");
}

#[test]
fn stored_path_is_relative_to_root() {
    let temp = tempfile::tempdir().unwrap();
    seed_folder(temp.path());
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let db_path = Utf8PathBuf::from_path_buf(temp.path().join("meta.db")).unwrap();

    let store = SqliteStore::open(&db_path).unwrap();
    let ingestor = Ingestor::new(
        MockSource,
        store,
        "image_metadata".to_string(),
        root,
        Vec::new(),
        spec(),
    );
    ingestor.run(&IngestOptions::default()).unwrap();

    let conn = rusqlite::Connection::open(db_path.as_std_path()).unwrap();
    let path: String = conn
        .query_row(
            "SELECT file_path FROM image_metadata WHERE file_name = ?1",
            ["b.dcm"],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(path, "sub/b.dcm");
}
