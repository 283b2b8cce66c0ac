//! Trellis - declarative graph queries over in-memory triples
//!
//! This is the main library crate that re-exports all Trellis components.

pub use trellis_core as core;
pub use trellis_query as query;
pub use trellis_store as store;

// Re-export commonly used types
pub use trellis_core::{Binding, Error, FilterValue, Result, Triple};

pub use trellis_query::{
    ExecutionStats, ExecutorOptions, ParsedQuery, QueryExecutor, QueryResult, evaluate, parse,
    tokenize,
};
pub use trellis_store::{FactStore, TripleFormat, load_path};
