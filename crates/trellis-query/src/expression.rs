//! Expression evaluation
//!
//! Expressions evaluate to [`FilterValue`] against a single row. Aggregates
//! additionally need the members of the row's group, supplied via
//! [`Scope::group`].

use crate::ast::{AggregateFunction, BinaryOp, Builtin, FilterExpr, Term, UnaryOp};
use regex::{Regex, RegexBuilder};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use trellis_core::term::{is_iri, is_literal, split_literal, unquote};
use trellis_core::{Binding, Error, FilterValue, Result};

/// The row an expression is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub row: &'a Binding,
    /// Members of the row's group, when grouping is active
    pub group: Option<&'a [Binding]>,
}

impl<'a> Scope<'a> {
    pub fn row(row: &'a Binding) -> Self {
        Self { row, group: None }
    }

    pub fn grouped(row: &'a Binding, group: &'a [Binding]) -> Self {
        Self { row, group: Some(group) }
    }
}

/// Evaluates [`FilterExpr`] trees for one query
pub struct ExpressionEvaluator<'q> {
    prefixes: &'q HashMap<String, String>,
    regex_cache: RefCell<HashMap<(String, String), Regex>>,
}

impl<'q> ExpressionEvaluator<'q> {
    pub fn new(prefixes: &'q HashMap<String, String>) -> Self {
        Self {
            prefixes,
            regex_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Effective boolean value of an expression
    pub fn is_true(&self, expr: &FilterExpr, scope: Scope<'_>) -> Result<bool> {
        Ok(self.evaluate(expr, scope)?.is_truthy())
    }

    /// Evaluate to an encoded term, for storing in a binding.
    ///
    /// Term references keep their raw encoding; computed values are
    /// re-encoded as literals. `None` means unbound.
    pub fn evaluate_term(&self, expr: &FilterExpr, scope: Scope<'_>) -> Result<Option<String>> {
        match expr {
            FilterExpr::Term(Term::Variable(name)) => Ok(scope.row.get(name).cloned()),
            FilterExpr::Term(term) => Ok(term.encode(self.prefixes)),
            _ => Ok(self.evaluate(expr, scope)?.to_term()),
        }
    }

    pub fn evaluate(&self, expr: &FilterExpr, scope: Scope<'_>) -> Result<FilterValue> {
        match expr {
            FilterExpr::Term(term) => Ok(self.evaluate_constant(term, scope)),

            FilterExpr::Binary { left, op, right } => {
                // Both sides are always evaluated, errors included
                let left = self.evaluate(left, scope)?;
                let right = self.evaluate(right, scope)?;
                evaluate_binary(&left, *op, &right)
            }

            FilterExpr::Unary { op, operand } => {
                let value = self.evaluate(operand, scope)?;
                evaluate_unary(*op, value)
            }

            FilterExpr::Builtin { function, args } => self.evaluate_builtin(*function, args, scope),

            FilterExpr::Aggregate { function, distinct, arg } => match scope.group {
                Some(group) => self.evaluate_aggregate(*function, *distinct, arg.as_deref(), group),
                None => Err(Error::UnsupportedOperation(
                    "aggregate used outside of a grouped query".to_string(),
                )),
            },
        }
    }

    fn evaluate_constant(&self, term: &Term, scope: Scope<'_>) -> FilterValue {
        match term {
            Term::Variable(name) => scope
                .row
                .get(name)
                .map_or(FilterValue::Unbound, |value| FilterValue::from_term(value)),
            Term::IntegerLiteral(i) => FilterValue::Integer(*i),
            Term::DoubleLiteral(d) => FilterValue::Double(*d),
            other => other
                .encode(self.prefixes)
                .map_or(FilterValue::Unbound, |value| FilterValue::from_term(&value)),
        }
    }

    // ========== Built-ins ==========

    fn evaluate_builtin(&self, function: Builtin, args: &[FilterExpr], scope: Scope<'_>) -> Result<FilterValue> {
        match function {
            Builtin::Bound => match args.first() {
                Some(FilterExpr::Term(Term::Variable(name))) => {
                    Ok(FilterValue::Boolean(scope.row.contains_key(name)))
                }
                _ => Err(Error::TypeError("BOUND expects a variable".to_string())),
            },
            Builtin::IsIri => {
                let term = self.evaluate_term(argument(args, 0, "isIRI")?, scope)?;
                Ok(FilterValue::Boolean(term.is_some_and(|t| is_iri(&t))))
            }
            Builtin::IsLiteral => {
                let term = self.evaluate_term(argument(args, 0, "isLiteral")?, scope)?;
                Ok(FilterValue::Boolean(term.is_some_and(|t| is_literal(&t))))
            }
            Builtin::Str => {
                let term = self.require_term(argument(args, 0, "STR")?, scope)?;
                Ok(FilterValue::String(unquote(&term).to_string()))
            }
            Builtin::Lang => {
                let term = self.require_term(argument(args, 0, "LANG")?, scope)?;
                let lang = split_literal(&term).and_then(|parts| parts.language).unwrap_or("");
                Ok(FilterValue::String(lang.to_string()))
            }
            Builtin::Regex => {
                let text = self.require_term(argument(args, 0, "REGEX")?, scope)?;
                let pattern = self.evaluate(argument(args, 1, "REGEX")?, scope)?.as_string();
                let flags = match args.get(2) {
                    Some(expr) => self.evaluate(expr, scope)?.as_string(),
                    None => String::new(),
                };
                let matched = self.with_regex(&pattern, &flags, |re| re.is_match(unquote(&text)))?;
                Ok(FilterValue::Boolean(matched))
            }
        }
    }

    /// Evaluate to an encoded term that must be bound
    fn require_term(&self, expr: &FilterExpr, scope: Scope<'_>) -> Result<String> {
        match self.evaluate_term(expr, scope)? {
            Some(term) => Ok(term),
            None => match expr {
                FilterExpr::Term(Term::Variable(name)) => Err(Error::UnboundVariable(name.clone())),
                _ => Err(Error::TypeError("expression has no value".to_string())),
            },
        }
    }

    fn with_regex<T>(&self, pattern: &str, flags: &str, f: impl FnOnce(&Regex) -> T) -> Result<T> {
        let key = (pattern.to_string(), flags.to_string());
        if let Some(re) = self.regex_cache.borrow().get(&key) {
            return Ok(f(re));
        }

        let re = compile_regex(pattern, flags)?;
        let result = f(&re);
        self.regex_cache.borrow_mut().insert(key, re);
        Ok(result)
    }

    // ========== Aggregates ==========

    fn evaluate_aggregate(
        &self,
        function: AggregateFunction,
        distinct: bool,
        arg: Option<&FilterExpr>,
        group: &[Binding],
    ) -> Result<FilterValue> {
        let Some(arg) = arg else {
            // COUNT(*)
            let count = if distinct {
                group
                    .iter()
                    .map(|row| row.iter().collect::<BTreeMap<_, _>>())
                    .collect::<HashSet<_>>()
                    .len()
            } else {
                group.len()
            };
            return Ok(FilterValue::Integer(count as i64));
        };

        let mut values = Vec::with_capacity(group.len());
        let mut seen = HashSet::new();
        for member in group {
            let value = self.evaluate(arg, Scope::row(member))?;
            if value.is_unbound() {
                continue;
            }
            if distinct && !seen.insert(distinct_key(&value)) {
                continue;
            }
            values.push(value);
        }

        Ok(match function {
            AggregateFunction::Count => FilterValue::Integer(values.len() as i64),
            AggregateFunction::Sum => sum(values.iter().filter(|v| v.is_numeric())),
            AggregateFunction::Avg => {
                let numeric: Vec<&FilterValue> = values.iter().filter(|v| v.is_numeric()).collect();
                if numeric.is_empty() {
                    FilterValue::Integer(0)
                } else {
                    let total: f64 = numeric.iter().filter_map(|v| v.as_f64()).sum();
                    FilterValue::Double(total / numeric.len() as f64)
                }
            }
            AggregateFunction::Min => extreme(values, Ordering::Less),
            AggregateFunction::Max => extreme(values, Ordering::Greater),
        })
    }
}

fn argument<'e>(args: &'e [FilterExpr], index: usize, function: &str) -> Result<&'e FilterExpr> {
    args.get(index)
        .ok_or_else(|| Error::TypeError(format!("{function} is missing argument {}", index + 1)))
}

fn compile_regex(pattern: &str, flags: &str) -> Result<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(Error::InvalidRegex(format!("unknown flag '{other}'"))),
        };
    }
    builder.build().map_err(|e| Error::InvalidRegex(e.to_string()))
}

/// Key for DISTINCT aggregates; numbers compare by value
fn distinct_key(value: &FilterValue) -> String {
    match value {
        FilterValue::Integer(i) => format!("n:{}", *i as f64),
        FilterValue::Double(d) => format!("n:{d}"),
        FilterValue::Boolean(b) => format!("b:{b}"),
        other => format!("s:{}", other.as_string()),
    }
}

fn sum<'v>(values: impl Iterator<Item = &'v FilterValue>) -> FilterValue {
    let mut total = FilterValue::Integer(0);
    for value in values {
        total = add(&total, value);
    }
    total
}

fn extreme(values: Vec<FilterValue>, wanted: Ordering) -> FilterValue {
    values
        .into_iter()
        .reduce(|best, value| if value.compare(&best) == wanted { value } else { best })
        .unwrap_or(FilterValue::Unbound)
}

// ========== Operators ==========

fn evaluate_binary(left: &FilterValue, op: BinaryOp, right: &FilterValue) -> Result<FilterValue> {
    let value = match op {
        BinaryOp::Or => FilterValue::Boolean(left.is_truthy() || right.is_truthy()),
        BinaryOp::And => FilterValue::Boolean(left.is_truthy() && right.is_truthy()),

        BinaryOp::Equals => FilterValue::Boolean(left.loose_eq(right)),
        BinaryOp::NotEquals => FilterValue::Boolean(!left.loose_eq(right)),
        BinaryOp::LessThan => ordered(left, right, |o| o == Ordering::Less),
        BinaryOp::LessEquals => ordered(left, right, |o| o != Ordering::Greater),
        BinaryOp::GreaterThan => ordered(left, right, |o| o == Ordering::Greater),
        BinaryOp::GreaterEquals => ordered(left, right, |o| o != Ordering::Less),

        BinaryOp::Add => {
            if left.is_numeric() && right.is_numeric() {
                add(left, right)
            } else {
                FilterValue::String(format!("{}{}", left.as_string(), right.as_string()))
            }
        }
        BinaryOp::Subtract => numeric_op(&zero_if_not_numeric(left), &zero_if_not_numeric(right), i64::checked_sub, |a, b| a - b),
        BinaryOp::Multiply => numeric_op(&zero_if_not_numeric(left), &zero_if_not_numeric(right), i64::checked_mul, |a, b| a * b),
        BinaryOp::Divide => return divide(left, right),
    };
    Ok(value)
}

/// Ordering comparisons never hold against an unbound operand
fn ordered(left: &FilterValue, right: &FilterValue, test: impl Fn(Ordering) -> bool) -> FilterValue {
    if left.is_unbound() || right.is_unbound() {
        return FilterValue::Boolean(false);
    }
    FilterValue::Boolean(test(left.compare(right)))
}

fn zero_if_not_numeric(value: &FilterValue) -> FilterValue {
    if value.is_numeric() {
        value.clone()
    } else {
        FilterValue::Integer(0)
    }
}

fn add(left: &FilterValue, right: &FilterValue) -> FilterValue {
    numeric_op(left, right, i64::checked_add, |a, b| a + b)
}

/// Integer arithmetic when both sides are integers, falling back to
/// doubles on overflow or mixed operands
fn numeric_op(
    left: &FilterValue,
    right: &FilterValue,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> FilterValue {
    if let (FilterValue::Integer(a), FilterValue::Integer(b)) = (left, right) {
        if let Some(result) = int_op(*a, *b) {
            return FilterValue::Integer(result);
        }
    }
    let a = left.as_f64().unwrap_or(0.0);
    let b = right.as_f64().unwrap_or(0.0);
    FilterValue::Double(float_op(a, b))
}

fn divide(left: &FilterValue, right: &FilterValue) -> Result<FilterValue> {
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(Error::TypeError(format!(
            "cannot divide '{}' by '{}'",
            left.as_string(),
            right.as_string()
        )));
    };
    if b == 0.0 {
        return Err(Error::DivisionByZero);
    }
    if let (FilterValue::Integer(a), FilterValue::Integer(b)) = (left, right) {
        if a.checked_rem(*b) == Some(0) {
            if let Some(quotient) = a.checked_div(*b) {
                return Ok(FilterValue::Integer(quotient));
            }
        }
    }
    Ok(FilterValue::Double(a / b))
}

fn evaluate_unary(op: UnaryOp, value: FilterValue) -> Result<FilterValue> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(FilterValue::Boolean(!value.is_truthy())),
        (UnaryOp::Negate, FilterValue::Integer(i)) => Ok(i
            .checked_neg()
            .map_or(FilterValue::Double(-(i as f64)), FilterValue::Integer)),
        (UnaryOp::Negate, FilterValue::Double(d)) => Ok(FilterValue::Double(-d)),
        (UnaryOp::Plus, value) if value.is_numeric() => Ok(value),
        (_, value) => Err(Error::TypeError(format!("'{}' is not a number", value.as_string()))),
    }
}
