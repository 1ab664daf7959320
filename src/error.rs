use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    #[error("missing config file medimeta.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("section '{0}' not found in config file")]
    SectionNotFound(String),

    #[error("failed to read elements file at {0}")]
    ElementsRead(PathBuf),

    #[error("failed to parse elements file: {0}")]
    ElementsParse(String),

    #[error("invalid column name: {0}")]
    InvalidColumnName(String),

    #[error("duplicate column name: {0}")]
    DuplicateColumnName(String),

    #[error("invalid source key: {0}")]
    InvalidSourceKey(String),

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database statement failed: {0}")]
    Database(String),

    #[error("schema operation failed: {0}")]
    Schema(String),

    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
