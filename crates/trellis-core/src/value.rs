//! Scalar values used during expression evaluation

use crate::term::{
    XSD_BOOLEAN, XSD_DOUBLE, XSD_INTEGER, datatype_local_name, encode_string_literal,
    encode_typed_literal, split_literal,
};
use std::cmp::Ordering;

/// The evaluator's scalar type
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Text value (also used for IRIs)
    String(String),

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Double(f64),

    /// Boolean value
    Boolean(bool),

    /// Variable without a value
    Unbound,
}

impl FilterValue {
    /// Convert an encoded term into a value.
    ///
    /// Numeric and boolean datatypes are honoured; other literals and bare
    /// values become numbers when their lexical form parses as one.
    pub fn from_term(term: &str) -> Self {
        match split_literal(term) {
            Some(parts) => match parts.datatype.map(datatype_local_name) {
                Some("boolean") => match parts.lexical {
                    "true" | "1" => FilterValue::Boolean(true),
                    "false" | "0" => FilterValue::Boolean(false),
                    other => FilterValue::String(other.to_string()),
                },
                Some("string") => FilterValue::String(parts.lexical.to_string()),
                _ => Self::from_lexical(parts.lexical),
            },
            None => Self::from_lexical(term),
        }
    }

    fn from_lexical(lexical: &str) -> Self {
        if let Ok(i) = lexical.parse::<i64>() {
            return FilterValue::Integer(i);
        }
        let looks_numeric = lexical
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
            && lexical.chars().any(|c| c.is_ascii_digit());
        if looks_numeric {
            if let Ok(d) = lexical.parse::<f64>() {
                return FilterValue::Double(d);
            }
        }
        FilterValue::String(lexical.to_string())
    }

    /// Encode the value back into a term; `None` for unbound
    pub fn to_term(&self) -> Option<String> {
        match self {
            FilterValue::String(s) => Some(encode_string_literal(s)),
            FilterValue::Integer(i) => Some(encode_typed_literal(&i.to_string(), XSD_INTEGER)),
            FilterValue::Double(d) => Some(encode_typed_literal(&d.to_string(), XSD_DOUBLE)),
            FilterValue::Boolean(b) => Some(encode_typed_literal(&b.to_string(), XSD_BOOLEAN)),
            FilterValue::Unbound => None,
        }
    }

    /// Returns true if the value is unbound
    pub fn is_unbound(&self) -> bool {
        matches!(self, FilterValue::Unbound)
    }

    /// Returns true if the value is an integer or a double
    pub fn is_numeric(&self) -> bool {
        matches!(self, FilterValue::Integer(_) | FilterValue::Double(_))
    }

    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Integer(i) => Some(*i as f64),
            FilterValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Effective boolean value
    pub fn is_truthy(&self) -> bool {
        match self {
            FilterValue::Boolean(b) => *b,
            FilterValue::Integer(i) => *i != 0,
            FilterValue::Double(d) => *d != 0.0 && !d.is_nan(),
            FilterValue::String(s) => !s.is_empty(),
            FilterValue::Unbound => false,
        }
    }

    /// String form used for string comparison, grouping and concatenation
    pub fn as_string(&self) -> String {
        match self {
            FilterValue::String(s) => s.clone(),
            FilterValue::Integer(i) => i.to_string(),
            FilterValue::Double(d) => d.to_string(),
            FilterValue::Boolean(b) => b.to_string(),
            FilterValue::Unbound => String::new(),
        }
    }

    /// Equality as used by `=` and `!=`.
    ///
    /// Unbound equals only another Unbound.
    pub fn loose_eq(&self, other: &FilterValue) -> bool {
        match (self, other) {
            (FilterValue::Unbound, FilterValue::Unbound) => true,
            (FilterValue::Unbound, _) | (_, FilterValue::Unbound) => false,
            (FilterValue::Integer(a), FilterValue::Integer(b)) => a == b,
            (FilterValue::Boolean(a), FilterValue::Boolean(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
            (a, b) => a.as_string() == b.as_string(),
        }
    }

    /// Typed comparison: numeric when both sides are numeric, else by string.
    ///
    /// Unbound sorts before everything else.
    pub fn compare(&self, other: &FilterValue) -> Ordering {
        match (self, other) {
            (FilterValue::Unbound, FilterValue::Unbound) => Ordering::Equal,
            (FilterValue::Unbound, _) => Ordering::Less,
            (_, FilterValue::Unbound) => Ordering::Greater,
            (FilterValue::Integer(a), FilterValue::Integer(b)) => a.cmp(b),
            (FilterValue::Boolean(a), FilterValue::Boolean(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (a, b) => a.as_string().cmp(&b.as_string()),
        }
    }
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}
