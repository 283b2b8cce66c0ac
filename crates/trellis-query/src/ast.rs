//! Abstract Syntax Tree for SELECT queries

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trellis_core::term::{
    XSD_DOUBLE, XSD_INTEGER, encode_lang_literal, encode_string_literal, encode_typed_literal,
};

/// A term in a triple pattern or expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Query variable (`?name`)
    Variable(String),
    /// Full IRI (`<http://...>`)
    Iri(String),
    /// Prefixed name (`ex:alice`), resolved against the prefix map
    PrefixedName { prefix: String, local: String },
    /// Plain string literal
    StringLiteral(String),
    /// Literal with a resolved datatype IRI
    TypedLiteral { value: String, datatype: String },
    /// Language-tagged literal
    LangLiteral { value: String, lang: String },
    IntegerLiteral(i64),
    DoubleLiteral(f64),
}

impl Term {
    /// Variable name, if this term is a variable
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// Encoded form of a constant term; `None` for variables
    pub fn encode(&self, prefixes: &HashMap<String, String>) -> Option<String> {
        match self {
            Term::Variable(_) => None,
            Term::Iri(iri) => Some(iri.clone()),
            Term::PrefixedName { prefix, local } => Some(resolve_prefixed(prefixes, prefix, local)),
            Term::StringLiteral(value) => Some(encode_string_literal(value)),
            Term::TypedLiteral { value, datatype } => Some(encode_typed_literal(value, datatype)),
            Term::LangLiteral { value, lang } => Some(encode_lang_literal(value, lang)),
            Term::IntegerLiteral(i) => Some(encode_typed_literal(&i.to_string(), XSD_INTEGER)),
            Term::DoubleLiteral(d) => Some(encode_typed_literal(&d.to_string(), XSD_DOUBLE)),
        }
    }
}

/// Expand a prefixed name.
///
/// Undeclared prefixes are kept verbatim (`ex:alice`), and an undeclared
/// default prefix leaves just the local name.
pub fn resolve_prefixed(prefixes: &HashMap<String, String>, prefix: &str, local: &str) -> String {
    match prefixes.get(prefix) {
        Some(namespace) => format!("{namespace}{local}"),
        None if prefix.is_empty() => local.to_string(),
        None => format!("{prefix}:{local}"),
    }
}

/// A single subject-predicate-object pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

/// Graph pattern tree, mirroring relational algebra
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphPattern {
    /// Basic graph pattern: triple patterns joined left to right
    Bgp(Vec<TriplePattern>),
    /// Inner join
    Join(Box<GraphPattern>, Box<GraphPattern>),
    /// Left outer join
    Optional(Box<GraphPattern>, Box<GraphPattern>),
    /// Concatenation of both sides
    Union(Box<GraphPattern>, Box<GraphPattern>),
    /// Anti-join
    Minus(Box<GraphPattern>, Box<GraphPattern>),
    /// Keep bindings where the expression is truthy
    Filter {
        inner: Box<GraphPattern>,
        expr: FilterExpr,
    },
    /// Extend bindings with a computed variable
    Bind {
        inner: Box<GraphPattern>,
        variable: String,
        expr: FilterExpr,
    },
}

impl GraphPattern {
    /// The empty pattern, producing exactly one empty binding
    pub fn empty() -> Self {
        GraphPattern::Bgp(Vec::new())
    }
}

/// Expression tree used by FILTER, BIND, projections, HAVING and ORDER BY
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Term reference
    Term(Term),
    /// Binary operation
    Binary {
        left: Box<FilterExpr>,
        op: BinaryOp,
        right: Box<FilterExpr>,
    },
    /// Unary operation
    Unary {
        op: UnaryOp,
        operand: Box<FilterExpr>,
    },
    /// Built-in function call
    Builtin {
        function: Builtin,
        args: Vec<FilterExpr>,
    },
    /// Aggregate call; `arg` is `None` for `COUNT(*)`
    Aggregate {
        function: AggregateFunction,
        distinct: bool,
        arg: Option<Box<FilterExpr>>,
    },
}

impl FilterExpr {
    /// Shorthand for a variable reference
    pub fn variable(name: impl Into<String>) -> Self {
        FilterExpr::Term(Term::Variable(name.into()))
    }

    /// Variable name, if this expression is a bare variable reference
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            FilterExpr::Term(term) => term.as_variable(),
            _ => None,
        }
    }

    /// Returns true if an aggregate appears anywhere in the expression
    pub fn contains_aggregate(&self) -> bool {
        match self {
            FilterExpr::Term(_) => false,
            FilterExpr::Aggregate { .. } => true,
            FilterExpr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            FilterExpr::Unary { operand, .. } => operand.contains_aggregate(),
            FilterExpr::Builtin { args, .. } => args.iter().any(FilterExpr::contains_aggregate),
        }
    }
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Logical
    Or,
    And,
    // Comparison
    Equals,
    NotEquals,
    LessThan,
    LessEquals,
    GreaterThan,
    GreaterEquals,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    Bound,
    IsIri,
    IsLiteral,
    Str,
    Lang,
    Regex,
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// A projected expression with its output name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionItem {
    pub expression: FilterExpr,
    pub alias: String,
}

/// SELECT projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// `SELECT *`
    All,
    /// Bare variables only
    Variables(Vec<String>),
    /// At least one `(expr AS ?alias)`; bare variables are normalized into
    /// `?v AS ?v` items
    Expressions(Vec<ProjectionItem>),
}

impl Projection {
    /// Returns true if any projected expression contains an aggregate
    pub fn has_aggregate(&self) -> bool {
        match self {
            Projection::Expressions(items) => {
                items.iter().any(|item| item.expression.contains_aggregate())
            }
            _ => false,
        }
    }
}

/// Item in ORDER BY clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCondition {
    pub expression: FilterExpr,
    pub ascending: bool,
}

/// A parsed SELECT query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Prefix name to namespace IRI
    pub prefixes: HashMap<String, String>,
    pub distinct: bool,
    pub projection: Projection,
    /// WHERE pattern
    pub pattern: GraphPattern,
    pub group_by: Option<Vec<String>>,
    pub having: Option<FilterExpr>,
    pub order_by: Option<Vec<OrderCondition>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ParsedQuery {
    /// Returns true if evaluation must group rows before projecting
    pub fn needs_grouping(&self) -> bool {
        self.group_by.is_some()
            || self.projection.has_aggregate()
            || self.having.as_ref().is_some_and(FilterExpr::contains_aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_encoding() {
        let mut prefixes = HashMap::new();
        prefixes.insert("ex".to_string(), "http://example.org/".to_string());

        let name = Term::PrefixedName { prefix: "ex".into(), local: "alice".into() };
        assert_eq!(name.encode(&prefixes).unwrap(), "http://example.org/alice");
        assert_eq!(name.encode(&HashMap::new()).unwrap(), "ex:alice");
        assert_eq!(Term::StringLiteral("Alice".into()).encode(&prefixes).unwrap(), "\"Alice\"");
        assert_eq!(
            Term::IntegerLiteral(5).encode(&prefixes).unwrap(),
            "\"5\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
        assert_eq!(Term::Variable("x".into()).encode(&prefixes), None);
    }

    #[test]
    fn test_default_prefix_resolution() {
        let mut prefixes = HashMap::new();
        assert_eq!(resolve_prefixed(&prefixes, "", "alice"), "alice");
        prefixes.insert(String::new(), "http://example.org/".to_string());
        assert_eq!(resolve_prefixed(&prefixes, "", "alice"), "http://example.org/alice");
    }

    #[test]
    fn test_contains_aggregate() {
        let count = FilterExpr::Aggregate {
            function: AggregateFunction::Count,
            distinct: false,
            arg: None,
        };
        let expr = FilterExpr::Binary {
            left: Box::new(count),
            op: BinaryOp::GreaterThan,
            right: Box::new(FilterExpr::Term(Term::IntegerLiteral(1))),
        };
        assert!(expr.contains_aggregate());
        assert!(!FilterExpr::variable("x").contains_aggregate());
    }

    #[test]
    fn test_expression_as_variable() {
        assert_eq!(FilterExpr::variable("x").as_variable(), Some("x"));
        assert_eq!(FilterExpr::Term(Term::IntegerLiteral(1)).as_variable(), None);
    }
}
