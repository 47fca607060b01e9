pub mod cli;
pub mod formatter;

pub use cli::Cli;

use rethinkline_common::config::AdapterConfig;
use rethinkline_common::RethinkError;
use rethinkline_core::AdapterError;
use rethinkline_query::QueryError;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub adapter: AdapterConfig,
    pub format: String,
    pub color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adapter: AdapterConfig::default(),
            format: "json-pretty".to_string(),
            color: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Store(#[from] RethinkError),

    #[error("{0}")]
    Other(String),
}

pub type CliResult<T> = Result<T, CliError>;
