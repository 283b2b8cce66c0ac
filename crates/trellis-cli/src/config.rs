//! CLI configuration

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use trellis_core::{Error, Result};
use trellis_query::ExecutorOptions;
use trellis_store::TripleFormat;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Run SELECT queries over a file of triples")]
pub struct Args {
    /// Triples file (TSV or JSON)
    #[arg(short, long)]
    pub triples: PathBuf,

    /// Triples format: tsv or json (inferred from the extension when omitted)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Query text
    #[arg(short, long, conflicts_with = "query_file", required_unless_present = "query_file")]
    pub query: Option<String>,

    /// File containing the query
    #[arg(long)]
    pub query_file: Option<PathBuf>,

    /// Ceiling on intermediate bindings
    #[arg(long, default_value_t = trellis_query::options::DEFAULT_MAX_INTERMEDIATE_RESULTS)]
    pub max_results: usize,

    /// Print the result as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Where the query text comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuerySource {
    Inline(String),
    File(PathBuf),
}

impl QuerySource {
    /// Read the query text
    pub fn read(&self) -> Result<String> {
        match self {
            QuerySource::Inline(text) => Ok(text.clone()),
            QuerySource::File(path) => Ok(std::fs::read_to_string(path)?),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Triples file
    pub triples_path: PathBuf,

    /// Triples format; `None` infers it from the extension
    pub format: Option<TripleFormat>,

    /// Query text or file
    pub query: QuerySource,

    /// Print JSON instead of a table
    pub json_output: bool,

    /// Log level
    pub log_level: String,

    /// Executor options
    pub executor: ExecutorOptions,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            triples_path: PathBuf::from("triples.tsv"),
            format: None,
            query: QuerySource::Inline(String::new()),
            json_output: false,
            log_level: "warn".to_string(),
            executor: ExecutorOptions::default(),
        }
    }
}

impl CliConfig {
    /// Create a new configuration
    pub fn new<P: Into<PathBuf>>(triples_path: P, query: QuerySource) -> Self {
        Self {
            triples_path: triples_path.into(),
            query,
            ..Default::default()
        }
    }

    /// Build the configuration from parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let query = match (args.query, args.query_file) {
            (Some(text), None) => QuerySource::Inline(text),
            (None, Some(path)) => QuerySource::File(path),
            _ => {
                return Err(Error::Configuration(
                    "exactly one of --query or --query-file is required".to_string(),
                ));
            }
        };

        let format = args.format.as_deref().map(str::parse::<TripleFormat>).transpose()?;

        Ok(Self {
            triples_path: args.triples,
            format,
            query,
            json_output: args.json,
            log_level: args.log_level,
            executor: ExecutorOptions::default().max_intermediate_results(args.max_results),
        })
    }

    /// Builder: set the triples format
    pub fn format(mut self, format: TripleFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Builder: set the intermediate binding ceiling
    pub fn max_results(mut self, limit: usize) -> Self {
        self.executor = self.executor.max_intermediate_results(limit);
        self
    }

    /// Builder: set log level
    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }
}
