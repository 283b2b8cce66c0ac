//! Trellis Core Library
//!
//! This crate provides the fundamental types and error handling shared by
//! the Trellis fact store and query engine.
//!
//! # Modules
//!
//! - `term` - Triples and the encoded term representation
//! - `value` - Scalar values used by expression evaluation
//! - `error` - Error types and result aliases

pub mod error;
pub mod term;
pub mod value;

pub use error::{Error, Result};
pub use term::{Binding, LiteralParts, Triple};
pub use value::FilterValue;
