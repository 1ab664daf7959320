use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// One logical column of the metadata table: where to find its raw value in a
/// source file and how to store it.
///
/// `source_key` is format-specific: a `"GGGG,EEEE"` hexadecimal tag pair for
/// DICOM, a header field name for NIFTI. Entries flagged `calculation_only`
/// are never persisted; they only feed derivation rules (e.g. birth date and
/// study date feeding the computed age).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ElementEntry {
    pub name: String,
    pub source_key: String,
    pub db_datatype: String,
    #[serde(default)]
    pub calculation_only: bool,
}

/// Declarative list of elements to extract, in column order.
///
/// Immutable shared input for a whole batch. The order of the backing file is
/// the canonical column order that both the schema and every insert reproduce.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    entries: Vec<ElementEntry>,
}

impl ElementSpec {
    pub fn from_entries(entries: Vec<ElementEntry>) -> Result<Self, IndexError> {
        let mut seen = HashMap::new();
        for entry in &entries {
            if !is_valid_identifier(&entry.name) {
                return Err(IndexError::InvalidColumnName(entry.name.clone()));
            }
            if seen.insert(entry.name.clone(), ()).is_some() {
                return Err(IndexError::DuplicateColumnName(entry.name.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let content = fs::read_to_string(path)
            .map_err(|_| IndexError::ElementsRead(PathBuf::from(path)))?;
        let entries: Vec<ElementEntry> = serde_json::from_str(&content)
            .map_err(|err| IndexError::ElementsParse(err.to_string()))?;
        Self::from_entries(entries)
    }

    pub fn entries(&self) -> &[ElementEntry] {
        &self.entries
    }

    /// Entries that map to a stored column, in spec order.
    pub fn persisted(&self) -> impl Iterator<Item = &ElementEntry> {
        self.entries.iter().filter(|entry| !entry.calculation_only)
    }

    pub fn entry(&self, name: &str) -> Option<&ElementEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Fresh per-file working set, every value starting at the absence marker.
    /// Never aliases the specification's storage.
    pub fn decoded_set(&self) -> DecodedSet {
        DecodedSet {
            values: self
                .entries
                .iter()
                .map(|entry| (entry.name.clone(), None))
                .collect(),
        }
    }
}

/// A decoded tag value: scalar or ordered sequence of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Int(i64),
    Real(f64),
    Text(String),
    List(Vec<TagValue>),
}

impl TagValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Scalar rendering used when a sequence has to collapse into one column.
    pub fn render(&self, delimiter: &str) -> String {
        match self {
            TagValue::Int(value) => value.to_string(),
            TagValue::Real(value) => value.to_string(),
            TagValue::Text(value) => value.clone(),
            TagValue::List(items) => items
                .iter()
                .map(|item| item.render(delimiter))
                .collect::<Vec<_>>()
                .join(delimiter),
        }
    }
}

/// Per-file association of column names with decoded values.
///
/// `None` is the absence marker: the tag was requested but could not be read
/// from the file. Owned exclusively by the processing of one file, mutated in
/// place by normalization and dropped once the insert is built.
#[derive(Debug, Clone)]
pub struct DecodedSet {
    values: HashMap<String, Option<TagValue>>,
}

impl DecodedSet {
    /// Whether the specification requested this column at all.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.values.get(name).and_then(|value| value.as_ref())
    }

    pub fn set(&mut self, name: &str, value: TagValue) {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = Some(value);
        }
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

pub fn validate_table_name(name: &str) -> Result<(), IndexError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(IndexError::InvalidTableName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn entry(name: &str, calculation_only: bool) -> ElementEntry {
        ElementEntry {
            name: name.to_string(),
            source_key: "0010,0010".to_string(),
            db_datatype: "VARCHAR(255)".to_string(),
            calculation_only,
        }
    }

    #[test]
    fn spec_preserves_entry_order() {
        let spec = ElementSpec::from_entries(vec![
            entry("patient_name", false),
            entry("study_date", true),
            entry("modality", false),
        ])
        .unwrap();

        let persisted: Vec<_> = spec.persisted().map(|e| e.name.as_str()).collect();
        assert_eq!(persisted, vec!["patient_name", "modality"]);
    }

    #[test]
    fn spec_rejects_duplicate_names() {
        let err = ElementSpec::from_entries(vec![entry("modality", false), entry("modality", false)])
            .unwrap_err();
        assert_matches!(err, IndexError::DuplicateColumnName(_));
    }

    #[test]
    fn spec_rejects_invalid_identifiers() {
        let err = ElementSpec::from_entries(vec![entry("patient name", false)]).unwrap_err();
        assert_matches!(err, IndexError::InvalidColumnName(_));

        let err = ElementSpec::from_entries(vec![entry("1st_column", false)]).unwrap_err();
        assert_matches!(err, IndexError::InvalidColumnName(_));
    }

    #[test]
    fn decoded_sets_are_independent() {
        let spec = ElementSpec::from_entries(vec![entry("modality", false)]).unwrap();

        let mut first = spec.decoded_set();
        first.set("modality", TagValue::Text("MR".to_string()));

        let second = spec.decoded_set();
        assert_eq!(first.get("modality"), Some(&TagValue::Text("MR".to_string())));
        assert_eq!(second.get("modality"), None);
        assert!(second.contains("modality"));
    }

    #[test]
    fn set_ignores_unknown_columns() {
        let spec = ElementSpec::from_entries(vec![entry("modality", false)]).unwrap();
        let mut decoded = spec.decoded_set();
        decoded.set("unknown", TagValue::Int(1));
        assert!(!decoded.contains("unknown"));
    }

    #[test]
    fn render_joins_nested_values() {
        let value = TagValue::List(vec![
            TagValue::Text("L".to_string()),
            TagValue::Text("P".to_string()),
        ]);
        assert_eq!(value.render("\\"), "L\\P");
    }
}
