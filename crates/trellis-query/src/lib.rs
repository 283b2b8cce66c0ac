//! Trellis Query Engine
//!
//! Provides parsing and evaluation of SPARQL-style SELECT queries over a
//! [`trellis_store::FactStore`].
//!
//! # Overview
//!
//! The query engine implements:
//! - A logos-based lexer
//! - A recursive descent parser with precedence climbing for expressions
//! - Relational evaluation of graph patterns (join, optional, union, minus)
//! - Grouping, aggregation, ordering, DISTINCT and pagination

pub mod ast;
pub mod executor;
pub mod expression;
pub mod lexer;
pub mod options;
pub mod parser;

pub use ast::{FilterExpr, GraphPattern, ParsedQuery, Projection, Term, TriplePattern};
pub use executor::{ExecutionStats, QueryExecutor, QueryResult, evaluate};
pub use lexer::{Token, tokenize};
pub use options::ExecutorOptions;
pub use parser::parse;

// Type alias for the logos lexer over query tokens
pub type QueryLexer<'a> = logos::Lexer<'a, Token>;
