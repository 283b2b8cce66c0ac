//! Triple loaders
//!
//! Two interchange shapes are accepted: tab-separated lines
//! (`subject<TAB>predicate<TAB>object`) and a JSON array of
//! `{"subject", "predicate", "object"}` objects.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use trellis_core::{Error, Result, Triple};

/// Input format for triple files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripleFormat {
    Tsv,
    Json,
}

impl TripleFormat {
    /// Infer the format from a file extension, defaulting to TSV
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => TripleFormat::Json,
            _ => TripleFormat::Tsv,
        }
    }
}

impl std::str::FromStr for TripleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tsv" => Ok(TripleFormat::Tsv),
            "json" => Ok(TripleFormat::Json),
            other => Err(Error::Configuration(format!("Unknown triple format: {other}"))),
        }
    }
}

/// Parse tab-separated triples; blank lines and `#` comments are skipped
pub fn load_tsv(text: &str) -> Result<Vec<Triple>> {
    let mut triples = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim_end_matches('\r');
        if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() != 3 {
            return Err(Error::InvalidTriple {
                line: index + 1,
                message: format!("expected 3 tab-separated fields, found {}", fields.len()),
            });
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(Error::InvalidTriple {
                line: index + 1,
                message: "empty field".to_string(),
            });
        }
        triples.push(Triple::new(fields[0], fields[1], fields[2]));
    }

    Ok(triples)
}

/// Parse a JSON array of triples
pub fn load_json(text: &str) -> Result<Vec<Triple>> {
    Ok(serde_json::from_str(text)?)
}

/// Load triples from a file
pub fn load_path(path: &Path, format: Option<TripleFormat>) -> Result<Vec<Triple>> {
    let format = format.unwrap_or_else(|| TripleFormat::from_path(path));
    let text = std::fs::read_to_string(path)?;
    let triples = match format {
        TripleFormat::Tsv => load_tsv(&text)?,
        TripleFormat::Json => load_json(&text)?,
    };
    debug!("Loaded {} triples from {}", triples.len(), path.display());
    Ok(triples)
}
