use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::RelationalStore;
use crate::elements::ElementSpec;
use crate::error::IndexError;
use crate::extract::TagSource;
use crate::normalize::normalize;
use crate::record::build_insert;
use crate::schema::create_table_sql;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Scan and extract, but leave the store untouched.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub table: String,
    pub scanned: usize,
    pub inserted: usize,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableResult {
    pub table: String,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropResult {
    pub table: String,
    pub dropped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub database: String,
    pub reachable: bool,
    pub server_version: String,
}

/// Sequential batch ingestor: ensure the table, enumerate matching files
/// under the root, and for each file run extract, normalize and persist.
///
/// Collaborators are injected; there is no ambient configuration lookup. A
/// per-file failure (unreadable file, constraint violation, malformed
/// statement) is logged and counted, and the batch moves to the next file.
/// Only configuration, connection and DDL failures abort the run.
pub struct Ingestor<S, R> {
    source: S,
    store: R,
    table: String,
    root: Utf8PathBuf,
    name_contains: Vec<String>,
    spec: ElementSpec,
}

impl<S: TagSource, R: RelationalStore> Ingestor<S, R> {
    pub fn new(
        source: S,
        store: R,
        table: String,
        root: Utf8PathBuf,
        name_contains: Vec<String>,
        spec: ElementSpec,
    ) -> Self {
        Self {
            source,
            store,
            table,
            root,
            name_contains,
            spec,
        }
    }

    /// Create the metadata table unless it already exists. Returns whether a
    /// table was created. A DDL failure here is fatal and not retried.
    pub fn ensure_table(&self) -> Result<bool, IndexError> {
        ensure_table(&self.store, &self.table, &self.spec)
    }

    pub fn run(&self, options: &IngestOptions) -> Result<IngestReport, IndexError> {
        self.source.validate_spec(&self.spec)?;

        if !options.dry_run {
            self.ensure_table()?;
        }

        let files = self.scan()?;
        let mut report = IngestReport {
            table: self.table.clone(),
            scanned: files.len(),
            inserted: 0,
            skipped: Vec::new(),
        };

        for path in files {
            debug!(file = path.as_str(), "starting to read file");

            let mut decoded = match self.source.extract(path.as_std_path(), &self.spec) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(file = path.as_str(), error = %err, "skipping unreadable file");
                    report.skipped.push(SkippedFile {
                        file: path.to_string(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            normalize(&mut decoded);

            let file_name = path.file_name().unwrap_or(path.as_str());
            let file_path = path
                .strip_prefix(&self.root)
                .map(Utf8Path::as_str)
                .unwrap_or(path.as_str());
            let statement = build_insert(&self.table, &self.spec, &decoded, file_name, file_path);

            if options.dry_run {
                debug!(file = path.as_str(), "dry run, not persisting");
                continue;
            }

            match self.store.execute(&statement.sql, &statement.values) {
                Ok(_) => {
                    report.inserted += 1;
                    debug!(file = path.as_str(), "done reading file");
                }
                Err(err) => {
                    warn!(file = path.as_str(), error = %err, "failed to store metadata, continuing");
                    report.skipped.push(SkippedFile {
                        file: path.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.scanned,
            inserted = report.inserted,
            skipped = report.skipped.len(),
            "ingest finished"
        );
        Ok(report)
    }

    /// Enumerate files under the root whose extension matches the active
    /// format, honoring the optional name allow-list. Order follows the
    /// filesystem traversal; nothing beyond that is guaranteed.
    fn scan(&self) -> Result<Vec<Utf8PathBuf>, IndexError> {
        let extension = self.source.file_extension();
        let mut matched = Vec::new();
        for path in walk_files(self.root.as_std_path())? {
            let path = Utf8PathBuf::from_path_buf(path).map_err(|path| {
                IndexError::Filesystem(format!("non UTF-8 path: {}", path.display()))
            })?;
            if path.extension() != Some(extension) {
                continue;
            }
            if !self.name_matches(&path) {
                continue;
            }
            matched.push(path);
        }
        Ok(matched)
    }

    fn name_matches(&self, path: &Utf8Path) -> bool {
        if self.name_contains.is_empty() {
            return true;
        }
        let Some(name) = path.file_name() else {
            return false;
        };
        self.name_contains
            .iter()
            .any(|fragment| name.contains(fragment.as_str()))
    }
}

/// Derive the schema and create the table if it is not already there. The
/// existence check guards the DDL; creating an existing table is fatal.
pub fn ensure_table<R: RelationalStore>(
    store: &R,
    table: &str,
    spec: &ElementSpec,
) -> Result<bool, IndexError> {
    if store.table_exists(table)? {
        return Ok(false);
    }
    let ddl = create_table_sql(table, spec);
    store.execute_ddl(&ddl)?;
    info!(table, "metadata table created");
    Ok(true)
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| IndexError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| IndexError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    Ok(items)
}
