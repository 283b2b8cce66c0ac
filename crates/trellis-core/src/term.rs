//! Triples and the encoded term representation
//!
//! Every subject, predicate and object is a single string:
//! - IRIs and bare values are stored as-is (`ex:alice`, `http://x.org/a`)
//! - plain literals are wrapped in double quotes (`"Alice"`)
//! - typed literals carry a datatype suffix (`"25"^^<http://...#integer>`)
//! - language-tagged literals carry a language suffix (`"chat"@fr`)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// XML Schema namespace used by typed literals
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// `rdf:type` under the standard RDF namespace
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

/// A variable-name to encoded-term mapping for one result row
pub type Binding = HashMap<String, String>;

/// An immutable subject-predicate-object fact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    /// Create a new triple from encoded terms
    pub fn new<S, P, O>(subject: S, predicate: P, object: O) -> Self
    where
        S: Into<String>,
        P: Into<String>,
        O: Into<String>,
    {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Check the triple against a pattern where `None` is a wildcard
    pub fn matches(&self, subject: Option<&str>, predicate: Option<&str>, object: Option<&str>) -> bool {
        subject.is_none_or(|s| s == self.subject)
            && predicate.is_none_or(|p| p == self.predicate)
            && object.is_none_or(|o| o == self.object)
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// The parts of an encoded literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralParts<'a> {
    pub lexical: &'a str,
    pub datatype: Option<&'a str>,
    pub language: Option<&'a str>,
}

/// Encode a plain string literal
pub fn encode_string_literal(value: &str) -> String {
    format!("\"{value}\"")
}

/// Encode a typed literal
pub fn encode_typed_literal(value: &str, datatype: &str) -> String {
    format!("\"{value}\"^^<{datatype}>")
}

/// Encode a language-tagged literal
pub fn encode_lang_literal(value: &str, language: &str) -> String {
    format!("\"{value}\"@{language}")
}

/// Returns true if the encoded term is a literal
pub fn is_literal(term: &str) -> bool {
    split_literal(term).is_some()
}

/// Returns true if the encoded term is an IRI (or a bare value)
pub fn is_iri(term: &str) -> bool {
    !term.is_empty() && !is_literal(term)
}

/// Split an encoded literal into lexical form, datatype and language.
///
/// Suffixes never contain a quote, so the last quote closes the lexical form.
pub fn split_literal(term: &str) -> Option<LiteralParts<'_>> {
    if !term.starts_with('"') {
        return None;
    }
    let close = term.rfind('"').filter(|&i| i > 0)?;
    let lexical = &term[1..close];
    let rest = &term[close + 1..];

    if rest.is_empty() {
        return Some(LiteralParts { lexical, datatype: None, language: None });
    }
    if let Some(datatype) = rest.strip_prefix("^^") {
        let datatype = datatype
            .strip_prefix('<')
            .and_then(|d| d.strip_suffix('>'))
            .unwrap_or(datatype);
        return Some(LiteralParts { lexical, datatype: Some(datatype), language: None });
    }
    if let Some(language) = rest.strip_prefix('@') {
        return Some(LiteralParts { lexical, datatype: None, language: Some(language) });
    }
    None
}

/// Display form of an encoded term: quotes and suffixes are stripped
pub fn unquote(term: &str) -> &str {
    match split_literal(term) {
        Some(parts) => parts.lexical,
        None => term,
    }
}

/// Local name of a datatype IRI (`integer` for `xsd:integer` or `...#integer`)
pub fn datatype_local_name(datatype: &str) -> &str {
    datatype
        .rsplit(['#', ':', '/'])
        .next()
        .unwrap_or(datatype)
}
