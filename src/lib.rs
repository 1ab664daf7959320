pub mod config;
pub mod db;
pub mod elements;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod normalize;
pub mod output;
pub mod record;
pub mod schema;
