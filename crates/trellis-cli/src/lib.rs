//! Trellis command line front end
//!
//! Loads a triples file, runs one query against it and renders the result.

pub mod config;

pub use config::{Args, CliConfig, QuerySource};

use std::sync::Arc;
use tracing::info;
use trellis_core::{Error, Result};
use trellis_query::QueryExecutor;
use trellis_store::{FactStore, load_path};

/// Load the triples, run the query and render the output
pub fn run(config: &CliConfig) -> Result<String> {
    let triples = load_path(&config.triples_path, config.format)?;
    let store = FactStore::build(triples);
    info!("Loaded {} triples from {}", store.len(), config.triples_path.display());

    let query = config.query.read()?;
    let executor = QueryExecutor::with_options(Arc::new(store), config.executor.clone());
    let result = executor.execute(&query)?;

    if config.json_output {
        Ok(serde_json::to_string_pretty(&result)?)
    } else {
        Ok(result.to_table())
    }
}

/// Describe an error, pointing at the offending character when the error
/// carries a byte offset into the query
pub fn describe_error(err: &Error, query: &str) -> String {
    match err.offset() {
        Some(offset) => format!("{err}\n{}", caret(query, offset)),
        None => err.to_string(),
    }
}

/// The query line containing `offset`, with a caret under that column
pub fn caret(query: &str, offset: usize) -> String {
    let offset = offset.min(query.len());
    let line_start = query[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line_end = query[offset..].find('\n').map_or(query.len(), |i| offset + i);
    let column = query[line_start..offset].chars().count();
    format!("{}\n{}^", &query[line_start..line_end], " ".repeat(column))
}
