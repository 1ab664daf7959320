use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::elements::validate_table_name;
use crate::error::IndexError;
use crate::extract::SourceFormat;

/// Settings read from `medimeta.json`: connection parameters, per-format
/// folder roots and the table-name binding, grouped by section.
#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseSection,
    pub table: TableSection,
    #[serde(default)]
    pub dicom: Option<FolderSection>,
    #[serde(default)]
    pub nifti: Option<FolderSection>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseSection {
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TableSection {
    pub metadata_table_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FolderSection {
    pub folder_path: String,
    /// Optional allow-list: only files whose name contains one of these
    /// fragments are ingested. Empty means every matching file.
    #[serde(default)]
    pub name_contains: Vec<String>,
}

pub struct SettingsLoader;

impl SettingsLoader {
    pub fn resolve(path: Option<&str>) -> Result<Settings, IndexError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("medimeta.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(IndexError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IndexError::ConfigRead(config_path.clone()))?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|err| IndexError::ConfigParse(err.to_string()))?;
        validate_table_name(&settings.table.metadata_table_name)?;
        Ok(settings)
    }
}

impl Settings {
    pub fn database_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.database.path)
    }

    pub fn table_name(&self) -> &str {
        &self.table.metadata_table_name
    }

    /// The folder section for the active format; ingesting a format whose
    /// section is missing is a configuration error.
    pub fn folder(&self, format: SourceFormat) -> Result<&FolderSection, IndexError> {
        let (section, name) = match format {
            SourceFormat::Dicom => (&self.dicom, "dicom"),
            SourceFormat::Nifti => (&self.nifti, "nifti"),
        };
        section
            .as_ref()
            .ok_or_else(|| IndexError::SectionNotFound(name.to_string()))
    }

    pub fn has_section(&self, name: &str) -> bool {
        match name {
            "database" | "table" => true,
            "dicom" => self.dicom.is_some(),
            "nifti" => self.nifti.is_some(),
            _ => false,
        }
    }
}
