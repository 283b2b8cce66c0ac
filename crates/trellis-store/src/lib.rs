//! Trellis Fact Store
//!
//! An immutable collection of triples with subject, predicate, object and
//! subject+predicate indexes, plus loaders for triple files.

pub mod loader;
pub mod store;

pub use loader::{TripleFormat, load_json, load_path, load_tsv};
pub use store::{FactStore, IndexChoice, StoreStats};
