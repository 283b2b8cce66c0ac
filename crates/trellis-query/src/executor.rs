//! Query Execution Engine
//!
//! Evaluates a [`ParsedQuery`] against a [`FactStore`] in a fixed pipeline:
//! - Pattern evaluation (index-assisted nested loops)
//! - Grouping and aggregation
//! - Ordering
//! - Projection and DISTINCT
//! - Pagination

use crate::ast::*;
use crate::expression::{ExpressionEvaluator, Scope};
use crate::options::ExecutorOptions;
use crate::parser::parse;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use trellis_core::term::unquote;
use trellis_core::{Binding, Error, FilterValue, Result};
use trellis_store::{FactStore, IndexChoice};

/// Query execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,

    /// Result rows, values in display form
    pub rows: Vec<Binding>,

    /// Execution statistics
    pub stats: ExecutionStats,
}

impl QueryResult {
    /// Display value of a cell; empty when the variable is unbound
    pub fn cell(&self, row: usize, column: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|binding| binding.get(column))
            .map_or("", String::as_str)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the result as a plain-text table
    pub fn to_table(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in 0..self.rows.len() {
            for (i, column) in self.columns.iter().enumerate() {
                widths[i] = widths[i].max(self.cell(row, column).chars().count());
            }
        }

        let separator = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+");

        let format_line = |cells: Vec<&str>| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!(" {cell:<width$} "))
                .collect::<Vec<_>>()
                .join("|")
        };

        let mut out = String::new();
        out.push_str(&format_line(self.columns.iter().map(String::as_str).collect()));
        out.push('\n');
        out.push_str(&separator);
        out.push('\n');
        for row in 0..self.rows.len() {
            let cells = self.columns.iter().map(|c| self.cell(row, c)).collect();
            out.push_str(&format_line(cells));
            out.push('\n');
        }
        out.push_str(&format!("({} rows)", self.rows.len()));
        out
    }
}

impl std::fmt::Display for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_table())
    }
}

/// Execution statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Triples returned by store lookups
    pub triples_scanned: u64,
    /// Store lookups issued
    pub index_lookups: u64,
    /// Largest intermediate binding set
    pub intermediate_peak: u64,
    /// Groups formed by aggregation
    pub groups: u64,
    pub rows_returned: u64,
    pub execution_time_ms: u64,
}

/// Query executor over a shared fact store
pub struct QueryExecutor {
    store: Arc<FactStore>,
    options: ExecutorOptions,
}

impl QueryExecutor {
    /// Create a new query executor
    pub fn new(store: Arc<FactStore>) -> Self {
        Self::with_options(store, ExecutorOptions::default())
    }

    /// Create a query executor with custom options
    pub fn with_options(store: Arc<FactStore>, options: ExecutorOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn store(&self) -> &FactStore {
        &self.store
    }

    /// Parse and execute a query
    pub fn execute(&self, query: &str) -> Result<QueryResult> {
        let parsed = parse(query)?;
        self.execute_parsed(&parsed)
    }

    /// Execute an already parsed query
    pub fn execute_parsed(&self, query: &ParsedQuery) -> Result<QueryResult> {
        let start = Instant::now();

        let mut evaluation = Evaluation::new(query, &self.store, &self.options);
        let (columns, rows) = evaluation.run()?;

        let mut stats = if self.options.collect_stats {
            evaluation.stats
        } else {
            ExecutionStats::default()
        };
        stats.rows_returned = rows.len() as u64;
        if self.options.collect_stats {
            stats.execution_time_ms = start.elapsed().as_millis() as u64;
        }

        info!(
            "Query returned {} rows in {}ms",
            stats.rows_returned,
            start.elapsed().as_millis()
        );

        Ok(QueryResult { columns, rows, stats })
    }
}

/// Evaluate a parsed query against a store with default options
pub fn evaluate(query: &ParsedQuery, store: &FactStore) -> Result<(Vec<String>, Vec<Binding>)> {
    let options = ExecutorOptions::default();
    Evaluation::new(query, store, &options).run()
}

/// State for one evaluation
struct Evaluation<'a> {
    query: &'a ParsedQuery,
    store: &'a FactStore,
    options: &'a ExecutorOptions,
    expressions: ExpressionEvaluator<'a>,
    stats: ExecutionStats,
}

/// A row after grouping, with the members it was built from
struct Row {
    binding: Binding,
    members: Option<Vec<Binding>>,
}

impl Row {
    fn scope(&self) -> Scope<'_> {
        match &self.members {
            Some(members) => Scope::grouped(&self.binding, members),
            None => Scope::row(&self.binding),
        }
    }
}

impl<'a> Evaluation<'a> {
    fn new(query: &'a ParsedQuery, store: &'a FactStore, options: &'a ExecutorOptions) -> Self {
        Self {
            query,
            store,
            options,
            expressions: ExpressionEvaluator::new(&query.prefixes),
            stats: ExecutionStats::default(),
        }
    }

    fn run(&mut self) -> Result<(Vec<String>, Vec<Binding>)> {
        let query = self.query;
        let solutions = self.eval_pattern(&query.pattern)?;
        debug!("Pattern produced {} bindings", solutions.len());

        let rows = if query.needs_grouping() {
            self.group(solutions)?
        } else {
            self.extend(solutions)?
        };

        let rows = self.order(rows)?;

        let mut rows: Vec<Binding> = rows.into_iter().map(|row| self.project(row.binding)).collect();
        if query.distinct {
            rows = distinct(rows);
        }

        let limit = query.limit.or(self.options.default_limit);
        let rows = paginate(rows, query.offset.unwrap_or(0), limit);

        let columns = self.columns(&rows);
        let rows = rows.into_iter().map(display_row).collect();
        Ok((columns, rows))
    }

    // ========== Graph patterns ==========

    fn eval_pattern(&mut self, pattern: &GraphPattern) -> Result<Vec<Binding>> {
        match pattern {
            GraphPattern::Bgp(patterns) => self.eval_bgp(patterns),

            GraphPattern::Join(left, right) => {
                let left = self.eval_pattern(left)?;
                let right = self.eval_pattern(right)?;
                self.join(&left, &right)
            }

            GraphPattern::Optional(left, right) => {
                let left = self.eval_pattern(left)?;
                let right = self.eval_pattern(right)?;
                self.left_join(&left, &right)
            }

            GraphPattern::Union(left, right) => {
                let mut solutions = self.eval_pattern(left)?;
                solutions.extend(self.eval_pattern(right)?);
                self.check_size(solutions.len())?;
                Ok(solutions)
            }

            GraphPattern::Minus(left, right) => {
                let left = self.eval_pattern(left)?;
                let right = self.eval_pattern(right)?;
                Ok(minus(left, &right))
            }

            GraphPattern::Filter { inner, expr } => {
                let solutions = self.eval_pattern(inner)?;
                let mut kept = Vec::with_capacity(solutions.len());
                for binding in solutions {
                    if self.expressions.is_true(expr, Scope::row(&binding))? {
                        kept.push(binding);
                    }
                }
                Ok(kept)
            }

            GraphPattern::Bind { inner, variable, expr } => {
                let solutions = self.eval_pattern(inner)?;
                solutions
                    .into_iter()
                    .map(|mut binding| {
                        match self.expressions.evaluate_term(expr, Scope::row(&binding))? {
                            Some(value) => {
                                binding.insert(variable.clone(), value);
                            }
                            None => {
                                binding.remove(variable);
                            }
                        }
                        Ok(binding)
                    })
                    .collect()
            }
        }
    }

    /// Nested-loop join of triple patterns, left to right
    fn eval_bgp(&mut self, patterns: &[TriplePattern]) -> Result<Vec<Binding>> {
        let store = self.store;
        let mut solutions = vec![Binding::new()];

        for pattern in patterns {
            let mut next = Vec::new();

            for binding in &solutions {
                let subject = self.resolve(&pattern.subject, binding);
                let predicate = self.resolve(&pattern.predicate, binding);
                let object = self.resolve(&pattern.object, binding);

                let matches = store.match_pattern(subject.as_deref(), predicate.as_deref(), object.as_deref());
                self.stats.index_lookups += 1;
                self.stats.triples_scanned += matches.len() as u64;

                for triple in matches {
                    let mut extended = binding.clone();
                    if bind_term(&mut extended, &pattern.subject, &triple.subject)
                        && bind_term(&mut extended, &pattern.predicate, &triple.predicate)
                        && bind_term(&mut extended, &pattern.object, &triple.object)
                    {
                        next.push(extended);
                        self.check_size(next.len())?;
                    }
                }
            }

            if let Some(first) = solutions.first() {
                let choice = IndexChoice::for_pattern(
                    self.resolve(&pattern.subject, first).as_deref(),
                    self.resolve(&pattern.predicate, first).as_deref(),
                    self.resolve(&pattern.object, first).as_deref(),
                );
                debug!("Triple pattern via {:?} index: {} -> {} bindings", choice, solutions.len(), next.len());
            }

            solutions = next;
            if solutions.is_empty() {
                break;
            }
        }

        Ok(solutions)
    }

    /// Concrete lookup term for a pattern position, if bound
    fn resolve(&self, term: &Term, binding: &Binding) -> Option<String> {
        match term {
            Term::Variable(name) => binding.get(name).cloned(),
            other => other.encode(&self.query.prefixes),
        }
    }

    fn join(&mut self, left: &[Binding], right: &[Binding]) -> Result<Vec<Binding>> {
        let mut solutions = Vec::new();
        for l in left {
            for r in right {
                if compatible(l, r) {
                    solutions.push(merge(l, r));
                    self.check_size(solutions.len())?;
                }
            }
        }
        Ok(solutions)
    }

    fn left_join(&mut self, left: &[Binding], right: &[Binding]) -> Result<Vec<Binding>> {
        let mut solutions = Vec::new();
        for l in left {
            let before = solutions.len();
            for r in right {
                if compatible(l, r) {
                    solutions.push(merge(l, r));
                }
            }
            if solutions.len() == before {
                solutions.push(l.clone());
            }
            self.check_size(solutions.len())?;
        }
        Ok(solutions)
    }

    fn check_size(&mut self, size: usize) -> Result<()> {
        let limit = self.options.max_intermediate_results;
        if size > limit {
            return Err(Error::ResultTooLarge { limit });
        }
        self.stats.intermediate_peak = self.stats.intermediate_peak.max(size as u64);
        Ok(())
    }

    // ========== Grouping ==========

    fn group(&mut self, solutions: Vec<Binding>) -> Result<Vec<Row>> {
        let query = self.query;
        let keys = query.group_by.as_deref().unwrap_or_default();

        // Buckets keep first-seen order
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        let mut buckets: Vec<Vec<Binding>> = Vec::new();
        for binding in solutions {
            let key: Vec<String> = keys
                .iter()
                .map(|k| binding.get(k).cloned().unwrap_or_default())
                .collect();
            match index.get(&key) {
                Some(&i) => buckets[i].push(binding),
                None => {
                    index.insert(key, buckets.len());
                    buckets.push(vec![binding]);
                }
            }
        }

        // Aggregates without GROUP BY form one group, even over no rows
        if buckets.is_empty() && query.group_by.is_none() {
            buckets.push(Vec::new());
        }

        self.stats.groups = buckets.len() as u64;
        debug!("Grouped into {} groups", buckets.len());

        let mut rows = Vec::with_capacity(buckets.len());
        for members in buckets {
            let first = members.first().cloned().unwrap_or_default();

            let mut binding: Binding = keys
                .iter()
                .filter_map(|k| first.get(k).map(|v| (k.clone(), v.clone())))
                .collect();

            if let Projection::Expressions(items) = &query.projection {
                for item in items {
                    let scope = Scope::grouped(&first, &members);
                    match self.expressions.evaluate_term(&item.expression, scope)? {
                        Some(value) => {
                            binding.insert(item.alias.clone(), value);
                        }
                        None => {
                            binding.remove(&item.alias);
                        }
                    }
                }
            }

            let row = Row {
                binding,
                members: Some(members),
            };

            if let Some(having) = &query.having {
                if !self.expressions.is_true(having, row.scope())? {
                    continue;
                }
            }
            rows.push(row);
        }

        Ok(rows)
    }

    /// Ungrouped rows: add projected expressions under their aliases.
    ///
    /// A HAVING without aggregates filters the extended rows.
    fn extend(&self, solutions: Vec<Binding>) -> Result<Vec<Row>> {
        let query = self.query;
        let items = match &query.projection {
            Projection::Expressions(items) => items.as_slice(),
            _ => &[],
        };

        let mut rows = Vec::with_capacity(solutions.len());
        for mut binding in solutions {
            for item in items {
                if item.expression.as_variable() == Some(item.alias.as_str()) {
                    continue;
                }
                match self.expressions.evaluate_term(&item.expression, Scope::row(&binding))? {
                    Some(value) => {
                        binding.insert(item.alias.clone(), value);
                    }
                    None => {
                        binding.remove(&item.alias);
                    }
                }
            }

            if let Some(having) = &query.having {
                if !self.expressions.is_true(having, Scope::row(&binding))? {
                    continue;
                }
            }
            rows.push(Row { binding, members: None });
        }

        Ok(rows)
    }

    // ========== Solution modifiers ==========

    /// Stable multi-key sort
    fn order(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        let Some(conditions) = &self.query.order_by else {
            return Ok(rows);
        };

        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let keys = conditions
                .iter()
                .map(|c| self.expressions.evaluate(&c.expression, row.scope()))
                .collect::<Result<Vec<FilterValue>>>()?;
            keyed.push((keys, row));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for (condition, (x, y)) in conditions.iter().zip(a.iter().zip(b)) {
                let ordering = x.compare(y);
                let ordering = if condition.ascending { ordering } else { ordering.reverse() };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }

    fn project(&self, mut binding: Binding) -> Binding {
        match &self.query.projection {
            Projection::All => binding,
            Projection::Variables(names) => {
                binding.retain(|k, _| names.contains(k));
                binding
            }
            Projection::Expressions(items) => {
                binding.retain(|k, _| items.iter().any(|item| &item.alias == k));
                binding
            }
        }
    }

    fn columns(&self, rows: &[Binding]) -> Vec<String> {
        match &self.query.projection {
            Projection::All => rows
                .iter()
                .flat_map(|row| row.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            Projection::Variables(names) => names.clone(),
            Projection::Expressions(items) => items.iter().map(|item| item.alias.clone()).collect(),
        }
    }
}

/// Shared variables agree
fn compatible(left: &Binding, right: &Binding) -> bool {
    left.iter()
        .all(|(k, v)| right.get(k).is_none_or(|other| other == v))
}

fn shares_variables(left: &Binding, right: &Binding) -> bool {
    left.keys().any(|k| right.contains_key(k))
}

fn merge(left: &Binding, right: &Binding) -> Binding {
    let mut merged = left.clone();
    for (k, v) in right {
        merged.entry(k.clone()).or_insert_with(|| v.clone());
    }
    merged
}

/// Keep left rows that no right row shares a variable with and agrees on
fn minus(left: Vec<Binding>, right: &[Binding]) -> Vec<Binding> {
    left.into_iter()
        .filter(|l| !right.iter().any(|r| shares_variables(l, r) && compatible(l, r)))
        .collect()
}

/// Bind a pattern position to a triple field, rejecting conflicting values
fn bind_term(binding: &mut Binding, term: &Term, value: &str) -> bool {
    let Term::Variable(name) = term else {
        return true;
    };
    match binding.get(name) {
        Some(existing) => existing == value,
        None => {
            binding.insert(name.clone(), value.to_string());
            true
        }
    }
}

/// Deduplicate rows, independent of key order, keeping the first occurrence
fn distinct(rows: Vec<Binding>) -> Vec<Binding> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let key = serde_json::to_string(&row.iter().collect::<BTreeMap<_, _>>()).unwrap_or_default();
            seen.insert(key)
        })
        .collect()
}

fn paginate(rows: Vec<Binding>, offset: usize, limit: Option<usize>) -> Vec<Binding> {
    rows.into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

fn display_row(row: Binding) -> Binding {
    row.into_iter()
        .map(|(k, v)| {
            let display = unquote(&v).to_string();
            (k, display)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use trellis_core::Triple;
    use trellis_core::term::{RDF_TYPE, XSD_INTEGER, encode_string_literal, encode_typed_literal};

    fn people() -> FactStore {
        let mut triples = vec![
            Triple::new("ex:alice", "ex:knows", "ex:bob"),
            Triple::new("ex:alice", "ex:knows", "ex:carol"),
            Triple::new("ex:bob", "ex:knows", "ex:carol"),
            Triple::new("ex:bob", "ex:likes", "ex:tea"),
        ];
        for (person, name, age) in [("ex:alice", "Alice", 30), ("ex:bob", "Bob", 25), ("ex:carol", "Carol", 20)] {
            triples.push(Triple::new(person, "ex:name", encode_string_literal(name)));
            triples.push(Triple::new(person, "ex:age", encode_typed_literal(&age.to_string(), XSD_INTEGER)));
            triples.push(Triple::new(person, "rdf:type", "ex:Person"));
        }
        FactStore::build(triples)
    }

    fn run(store: &FactStore, query: &str) -> (Vec<String>, Vec<Binding>) {
        evaluate(&parse(query).unwrap(), store).unwrap()
    }

    fn column(rows: &[Binding], name: &str) -> Vec<String> {
        rows.iter().map(|r| r.get(name).cloned().unwrap_or_default()).collect()
    }

    #[test]
    fn test_single_pattern() {
        let store = FactStore::build(vec![Triple::new("ex:alice", "ex:knows", "ex:bob")]);
        let (columns, rows) = run(&store, "SELECT ?x ?y WHERE { ?x ex:knows ?y }");
        assert_eq!(columns, vec!["x", "y"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["x"], "ex:alice");
        assert_eq!(rows[0]["y"], "ex:bob");
    }

    #[test]
    fn test_optional_without_match() {
        let store = FactStore::build(vec![Triple::new("ex:alice", "ex:knows", "ex:bob")]);
        let (columns, rows) = run(&store, "SELECT ?x ?y ?z WHERE { ?x ex:knows ?y OPTIONAL { ?x ex:likes ?z } }");
        assert_eq!(columns, vec!["x", "y", "z"]);
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains_key("z"));
    }

    #[test]
    fn test_average_age() {
        let (columns, rows) = run(&people(), "SELECT (AVG(?age) AS ?avg) WHERE { ?p ex:age ?age }");
        assert_eq!(columns, vec!["avg"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["avg"], "25");
    }

    #[test]
    fn test_no_matches_is_empty() {
        let (_, rows) = run(&people(), "SELECT ?x WHERE { ?x ex:knows ex:nobody }");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_brace_is_parse_error() {
        let executor = QueryExecutor::new(Arc::new(people()));
        let err = executor.execute("SELECT ?x WHERE { ?x ex:knows ?y").unwrap_err();
        assert!(err.is_parse_error());
        assert!(matches!(err, Error::UnexpectedToken { ref expected, .. } if expected == "'}'"));
    }

    #[test]
    fn test_bgp_join_on_shared_variable() {
        let (_, rows) = run(&people(), "SELECT ?a ?c WHERE { ?a ex:knows ?b . ?b ex:knows ?c }");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["a"], "ex:alice");
        assert_eq!(rows[0]["c"], "ex:carol");
    }

    #[test]
    fn test_repeated_variable_in_pattern() {
        let store = FactStore::build(vec![
            Triple::new("ex:a", "ex:p", "ex:a"),
            Triple::new("ex:a", "ex:p", "ex:b"),
        ]);
        let (_, rows) = run(&store, "SELECT ?x WHERE { ?x ex:p ?x }");
        assert_eq!(column(&rows, "x"), vec!["ex:a"]);
    }

    #[test]
    fn test_rdf_type_shorthand_and_literals() {
        let store = FactStore::build(vec![
            Triple::new("ex:alice", "rdf:type", "ex:Person"),
            Triple::new("ex:alice", "ex:name", "\"Alice\""),
        ]);
        let (_, rows) = run(&store, r#"SELECT ?s ?n WHERE { ?s a ex:Person ; ex:name ?n . ?s ex:name "Alice" }"#);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], "Alice");
    }

    #[test]
    fn test_type_shorthand_matches_explicit_predicate() {
        let store = FactStore::build(vec![Triple::new("ex:alice", "rdf:type", "ex:Person")]);
        let (_, short) = run(&store, "SELECT ?s WHERE { ?s a ex:Person }");
        let (_, long) = run(&store, "SELECT ?s WHERE { ?s rdf:type ex:Person }");
        assert_eq!(column(&short, "s"), vec!["ex:alice"]);
        assert_eq!(short, long);

        let store = FactStore::build(vec![Triple::new("ex:alice", RDF_TYPE, "ex:Person")]);
        let (_, rows) = run(
            &store,
            "PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> SELECT ?s WHERE { ?s a ex:Person }",
        );
        assert_eq!(column(&rows, "s"), vec!["ex:alice"]);
    }

    #[test]
    fn test_integer_literal_matches_typed_term() {
        let (_, rows) = run(&people(), "SELECT ?p WHERE { ?p ex:age 25 }");
        assert_eq!(column(&rows, "p"), vec!["ex:bob"]);
    }

    #[test]
    fn test_prefix_resolution() {
        let store = FactStore::build(vec![Triple::new("http://e.org/alice", "http://e.org/knows", "http://e.org/bob")]);
        let (_, rows) = run(&store, "PREFIX e: <http://e.org/> SELECT ?o WHERE { e:alice e:knows ?o }");
        assert_eq!(column(&rows, "o"), vec!["http://e.org/bob"]);
    }

    #[test]
    fn test_filter() {
        let (_, rows) = run(
            &people(),
            "SELECT ?p WHERE { ?p ex:age ?age FILTER(?age >= 25) } ORDER BY ?p",
        );
        assert_eq!(column(&rows, "p"), vec!["ex:alice", "ex:bob"]);
    }

    #[test]
    fn test_union() {
        let (_, rows) = run(
            &people(),
            "SELECT ?o WHERE { { ex:bob ex:likes ?o } UNION { ex:bob ex:knows ?o } }",
        );
        assert_eq!(column(&rows, "o"), vec!["ex:tea", "ex:carol"]);
    }

    #[test]
    fn test_minus() {
        let (_, rows) = run(
            &people(),
            "SELECT ?p WHERE { ?p a ex:Person MINUS { ?p ex:knows ex:carol } }",
        );
        assert_eq!(column(&rows, "p"), vec!["ex:carol"]);
    }

    #[test]
    fn test_minus_without_shared_variables_keeps_rows() {
        let (_, rows) = run(
            &people(),
            "SELECT ?p WHERE { ?p a ex:Person MINUS { ?x ex:likes ex:tea } }",
        );
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_nested_group_join() {
        let (_, rows) = run(
            &people(),
            "SELECT ?p ?n WHERE { ?p ex:likes ex:tea . { ?p ex:name ?n } }",
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], "Bob");
    }

    #[test]
    fn test_bind() {
        let (_, rows) = run(
            &people(),
            "SELECT ?p ?next WHERE { ?p ex:age ?age BIND(?age + 1 AS ?next) } ORDER BY ?next",
        );
        assert_eq!(column(&rows, "next"), vec!["21", "26", "31"]);
    }

    #[test]
    fn test_bind_unbound_leaves_variable_unset() {
        let (_, rows) = run(
            &people(),
            "SELECT ?p ?z WHERE { ?p ex:likes ?o BIND(?nothing AS ?z) }",
        );
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains_key("z"));
    }

    #[test]
    fn test_group_by_with_count() {
        let (columns, rows) = run(
            &people(),
            "SELECT ?p (COUNT(?f) AS ?n) WHERE { ?p ex:knows ?f } GROUP BY ?p ORDER BY DESC(?n)",
        );
        assert_eq!(columns, vec!["p", "n"]);
        assert_eq!(column(&rows, "p"), vec!["ex:alice", "ex:bob"]);
        assert_eq!(column(&rows, "n"), vec!["2", "1"]);
    }

    #[test]
    fn test_having_filters_groups() {
        let (_, rows) = run(
            &people(),
            "SELECT ?p WHERE { ?p ex:knows ?f } GROUP BY ?p HAVING(COUNT(?f) > 1)",
        );
        assert_eq!(column(&rows, "p"), vec!["ex:alice"]);
    }

    #[test]
    fn test_having_without_aggregate_filters_rows() {
        let (_, rows) = run(&people(), "SELECT ?p WHERE { ?p a ex:Person } HAVING(?p = ex:alice)");
        assert_eq!(column(&rows, "p"), vec!["ex:alice"]);
    }

    #[test]
    fn test_projected_expression_without_grouping() {
        let (columns, rows) = run(
            &people(),
            "SELECT ?p (?age + 1 AS ?next) WHERE { ?p ex:age ?age } ORDER BY ?next",
        );
        assert_eq!(columns, vec!["p", "next"]);
        assert_eq!(column(&rows, "next"), vec!["21", "26", "31"]);
    }

    #[test]
    fn test_count_star_over_no_rows() {
        let (_, rows) = run(&people(), "SELECT (COUNT(*) AS ?n) WHERE { ?p ex:missing ?o }");
        assert_eq!(column(&rows, "n"), vec!["0"]);
    }

    #[test]
    fn test_group_by_over_no_rows() {
        let (_, rows) = run(&people(), "SELECT ?p WHERE { ?p ex:missing ?o } GROUP BY ?p");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_sum_min_max() {
        let (_, rows) = run(
            &people(),
            "SELECT (SUM(?a) AS ?s) (MIN(?a) AS ?lo) (MAX(?a) AS ?hi) WHERE { ?p ex:age ?a }",
        );
        assert_eq!(rows[0]["s"], "75");
        assert_eq!(rows[0]["lo"], "20");
        assert_eq!(rows[0]["hi"], "30");
    }

    #[test]
    fn test_order_by_numeric_and_direction() {
        let (_, rows) = run(&people(), "SELECT ?n WHERE { ?p ex:name ?n ; ex:age ?a } ORDER BY DESC(?a)");
        assert_eq!(column(&rows, "n"), vec!["Alice", "Bob", "Carol"]);

        let (_, rows) = run(&people(), "SELECT ?n WHERE { ?p ex:name ?n ; ex:age ?a } ORDER BY ?a");
        assert_eq!(column(&rows, "n"), vec!["Carol", "Bob", "Alice"]);
    }

    #[test]
    fn test_order_by_is_stable() {
        let (_, rows) = run(
            &people(),
            "SELECT ?p ?f WHERE { ?p ex:knows ?f } ORDER BY ?p",
        );
        // alice's two rows keep their store order
        assert_eq!(column(&rows, "f"), vec!["ex:bob", "ex:carol", "ex:carol"]);
    }

    #[test]
    fn test_distinct() {
        let (_, rows) = run(&people(), "SELECT DISTINCT ?f WHERE { ?p ex:knows ?f }");
        assert_eq!(column(&rows, "f"), vec!["ex:bob", "ex:carol"]);
    }

    #[test]
    fn test_distinct_applies_to_projected_columns_before_limit() {
        // Rows differ only in the unprojected ?p; LIMIT counts distinct ?f values
        let (_, rows) = run(
            &people(),
            "SELECT DISTINCT ?f WHERE { ?p ex:knows ?f } ORDER BY DESC(?f) LIMIT 2",
        );
        assert_eq!(column(&rows, "f"), vec!["ex:carol", "ex:bob"]);
    }

    #[test]
    fn test_limit_offset() {
        let (_, rows) = run(&people(), "SELECT ?n WHERE { ?p ex:name ?n } ORDER BY ?n LIMIT 1 OFFSET 1");
        assert_eq!(column(&rows, "n"), vec!["Bob"]);

        let (_, rows) = run(&people(), "SELECT ?n WHERE { ?p ex:name ?n } OFFSET 5");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_select_all_columns_sorted() {
        let (columns, _) = run(&people(), "SELECT * WHERE { ?s ex:likes ?o OPTIONAL { ?s ex:name ?name } }");
        assert_eq!(columns, vec!["name", "o", "s"]);
    }

    #[test]
    fn test_projected_variable_keeps_iri() {
        let (_, rows) = run(&people(), "SELECT ?p (?a * 2 AS ?double) WHERE { ?p ex:age ?a } ORDER BY ?a");
        assert_eq!(column(&rows, "p"), vec!["ex:carol", "ex:bob", "ex:alice"]);
        assert_eq!(column(&rows, "double"), vec!["40", "50", "60"]);
    }

    #[test]
    fn test_string_literal_unquotes() {
        let (_, rows) = run(&people(), "SELECT ?n WHERE { ex:alice ex:name ?n }");
        assert_eq!(rows[0]["n"], "Alice");
    }

    #[test]
    fn test_result_too_large() {
        let triples: Vec<Triple> = (0..50).map(|i| Triple::new(format!("ex:s{i}"), "ex:p", "ex:o")).collect();
        let executor = QueryExecutor::with_options(
            Arc::new(FactStore::build(triples)),
            ExecutorOptions::new().max_intermediate_results(100),
        );
        let err = executor.execute("SELECT * WHERE { ?a ex:p ?x . ?b ex:p ?y }").unwrap_err();
        assert!(matches!(err, Error::ResultTooLarge { limit: 100 }));
        assert!(err.is_evaluation_error());
    }

    #[test]
    fn test_evaluation_error_propagates() {
        let err = evaluate(
            &parse("SELECT ?p WHERE { ?p ex:age ?a FILTER(?a / 0 > 1) }").unwrap(),
            &people(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DivisionByZero));
    }

    #[test]
    fn test_executor_stats_and_table() {
        let executor = QueryExecutor::new(Arc::new(people()));
        let result = executor.execute("SELECT ?p ?n WHERE { ?p ex:likes ?o OPTIONAL { ?p ex:nick ?n } }").unwrap();
        assert_eq!(result.stats.rows_returned, 1);
        assert_eq!(result.stats.index_lookups, 2);
        assert_eq!(result.cell(0, "p"), "ex:bob");
        assert_eq!(result.cell(0, "n"), "");
        assert_eq!(result.cell(7, "p"), "");

        let table = result.to_table();
        assert!(table.starts_with(" p      | n "));
        assert!(table.ends_with("(1 rows)"));
    }

    #[test]
    fn test_default_limit() {
        let executor = QueryExecutor::with_options(
            Arc::new(people()),
            ExecutorOptions::new().default_limit(Some(2)),
        );
        assert_eq!(executor.execute("SELECT ?s WHERE { ?s ?p ?o }").unwrap().len(), 2);
        assert_eq!(executor.execute("SELECT ?s WHERE { ?s ?p ?o } LIMIT 5").unwrap().len(), 5);
    }

    #[test]
    fn test_shared_store_across_threads() {
        let executor = Arc::new(QueryExecutor::new(Arc::new(people())));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let executor = Arc::clone(&executor);
                std::thread::spawn(move || executor.execute("SELECT ?p WHERE { ?p a ex:Person }").map(|r| r.len()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 3);
        }
    }

    // ========== Properties ==========

    fn small_triples() -> impl Strategy<Value = Vec<Triple>> {
        let term = prop::sample::select(vec!["ex:a", "ex:b", "ex:c", "ex:d"]);
        prop::collection::vec((term.clone(), term.clone(), term), 0..30)
            .prop_map(|ts| ts.into_iter().map(|(s, p, o)| Triple::new(s, p, o)).collect())
    }

    proptest! {
        #[test]
        fn prop_ground_pattern_matches_presence(triples in small_triples(), s in 0..4usize, p in 0..4usize, o in 0..4usize) {
            let names = ["ex:a", "ex:b", "ex:c", "ex:d"];
            let store = FactStore::build(triples.clone());
            let query = format!("SELECT * WHERE {{ {} {} {} }}", names[s], names[p], names[o]);
            let (_, rows) = run(&store, &query);
            let present = triples.contains(&Triple::new(names[s], names[p], names[o]));
            let expected = triples.iter().filter(|t| **t == Triple::new(names[s], names[p], names[o])).count();
            prop_assert_eq!(rows.len(), expected);
            prop_assert_eq!(!rows.is_empty(), present);
        }

        #[test]
        fn prop_join_agrees_on_shared_variables(triples in small_triples()) {
            let store = FactStore::build(triples);
            let (_, rows) = run(&store, "SELECT ?x ?y ?z WHERE { ?x ex:a ?y . { ?y ex:b ?z } }");
            let (_, left) = run(&store, "SELECT ?x ?y WHERE { ?x ex:a ?y }");
            let (_, right) = run(&store, "SELECT ?y ?z WHERE { ?y ex:b ?z }");
            for row in &rows {
                prop_assert!(left.iter().any(|l| l["x"] == row["x"] && l["y"] == row["y"]));
                prop_assert!(right.iter().any(|r| r["y"] == row["y"] && r["z"] == row["z"]));
            }
        }

        #[test]
        fn prop_optional_keeps_left_rows(triples in small_triples()) {
            let store = FactStore::build(triples);
            let (_, left) = run(&store, "SELECT ?x ?y WHERE { ?x ex:a ?y }");
            let (_, rows) = run(&store, "SELECT ?x ?y ?z WHERE { ?x ex:a ?y OPTIONAL { ?y ex:b ?z } }");
            prop_assert!(rows.len() >= left.len());
            for l in &left {
                prop_assert!(rows.iter().any(|r| r["x"] == l["x"] && r["y"] == l["y"]));
            }
        }

        #[test]
        fn prop_minus_excludes_compatible_rows(triples in small_triples()) {
            let store = FactStore::build(triples);
            let (_, rows) = run(&store, "SELECT ?x ?y WHERE { ?x ex:a ?y MINUS { ?x ex:b ?y } }");
            let (_, right) = run(&store, "SELECT ?x ?y WHERE { ?x ex:b ?y }");
            for row in &rows {
                prop_assert!(!right.iter().any(|r| r["x"] == row["x"] && r["y"] == row["y"]));
            }
        }

        #[test]
        fn prop_distinct_is_idempotent(triples in small_triples()) {
            let store = FactStore::build(triples);
            let (_, rows) = run(&store, "SELECT DISTINCT ?p WHERE { ?s ?p ?o }");
            prop_assert_eq!(distinct(rows.clone()), rows);
        }

        #[test]
        fn prop_pagination_law(triples in small_triples(), limit in 0..10usize, offset in 0..10usize) {
            let store = FactStore::build(triples);
            let (_, all) = run(&store, "SELECT ?s ?o WHERE { ?s ?p ?o } ORDER BY ?s ?o");
            let (_, page) = run(&store, &format!("SELECT ?s ?o WHERE {{ ?s ?p ?o }} ORDER BY ?s ?o LIMIT {limit} OFFSET {offset}"));
            let expected: Vec<Binding> = all.into_iter().skip(offset).take(limit).collect();
            prop_assert_eq!(page, expected);
        }

        #[test]
        fn prop_count_star_counts_rows(triples in small_triples()) {
            let store = FactStore::build(triples);
            let (_, rows) = run(&store, "SELECT ?s WHERE { ?s ?p ?o }");
            let (_, count) = run(&store, "SELECT (COUNT(*) AS ?n) WHERE { ?s ?p ?o }");
            prop_assert_eq!(count[0]["n"].clone(), rows.len().to_string());
        }
    }
}
