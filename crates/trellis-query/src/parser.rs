//! Recursive descent parser for SELECT queries
//!
//! Grammar:
//! `[PREFIX p: <iri>]* SELECT [DISTINCT] (* | projection) WHERE { pattern }
//!  [GROUP BY ?v..] [HAVING (expr)] [ORDER BY cond..] [LIMIT n] [OFFSET n]`
//!
//! Expressions use precedence climbing:
//! OR < AND < relational < additive < multiplicative < unary < primary.

use crate::ast::*;
use crate::lexer::{PrefixedName, Token, tokenize};
use std::collections::HashMap;
use tracing::warn;
use trellis_core::{Error, Result};

/// Aggregate names recognized only to be rejected
const UNSUPPORTED_AGGREGATES: &[&str] = &["GROUP_CONCAT", "SAMPLE"];

/// Parse a query string into an AST
pub fn parse(query: &str) -> Result<ParsedQuery> {
    let tokens = tokenize(query)?;
    Parser::new(tokens).parse_query()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    prefixes: HashMap<String, String>,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last() != Some(&Token::Eof) {
            tokens.push(Token::Eof);
        }
        Self {
            tokens,
            pos: 0,
            prefixes: HashMap::new(),
        }
    }

    // ========== Query ==========

    fn parse_query(mut self) -> Result<ParsedQuery> {
        while self.eat(&Token::Prefix) {
            self.parse_prefix_decl()?;
        }

        self.expect(&Token::Select, "SELECT")?;
        let distinct = self.eat(&Token::Distinct);
        let projection = self.parse_projection()?;

        self.expect(&Token::Where, "WHERE")?;
        let pattern = self.parse_group_pattern()?;

        let mut group_by = None;
        let mut having = None;
        let mut order_by = None;
        let mut limit = None;
        let mut offset = None;

        // Trailing clauses in any order; a repeated clause replaces the earlier one
        loop {
            match self.peek() {
                Token::GroupBy => {
                    self.advance();
                    warn_repeated("GROUP BY", group_by.is_some());
                    group_by = Some(self.parse_group_by()?);
                }
                Token::Having => {
                    self.advance();
                    warn_repeated("HAVING", having.is_some());
                    having = Some(self.parse_bracketted()?);
                }
                Token::OrderBy => {
                    self.advance();
                    warn_repeated("ORDER BY", order_by.is_some());
                    order_by = Some(self.parse_order_by()?);
                }
                Token::Limit => {
                    self.advance();
                    warn_repeated("LIMIT", limit.is_some());
                    limit = Some(self.parse_count("LIMIT")?);
                }
                Token::Offset => {
                    self.advance();
                    warn_repeated("OFFSET", offset.is_some());
                    offset = Some(self.parse_count("OFFSET")?);
                }
                Token::Eof => break,
                _ => return self.error("GROUP BY, HAVING, ORDER BY, LIMIT, OFFSET or end of query"),
            }
        }

        Ok(ParsedQuery {
            prefixes: self.prefixes,
            distinct,
            projection,
            pattern,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_prefix_decl(&mut self) -> Result<()> {
        let prefix = match self.peek() {
            Token::PrefixedName(PrefixedName { prefix, local }) if local.is_empty() => prefix.clone(),
            _ => return self.error("prefix name ending in ':'"),
        };
        self.advance();

        let namespace = match self.peek() {
            Token::Iri(iri) => iri.clone(),
            _ => return self.error("namespace IRI"),
        };
        self.advance();

        self.prefixes.insert(prefix, namespace);
        Ok(())
    }

    fn parse_projection(&mut self) -> Result<Projection> {
        if self.eat(&Token::Star) {
            return Ok(Projection::All);
        }

        let mut items = Vec::new();
        let mut has_expression = false;

        loop {
            match self.peek().clone() {
                Token::Variable(name) => {
                    self.advance();
                    items.push(ProjectionItem {
                        expression: FilterExpr::variable(name.clone()),
                        alias: name,
                    });
                }
                Token::LParen => {
                    self.advance();
                    let expression = self.parse_expression()?;
                    self.expect(&Token::As, "AS")?;
                    let alias = self.expect_variable()?;
                    self.expect(&Token::RParen, "')'")?;
                    items.push(ProjectionItem { expression, alias });
                    has_expression = true;
                }
                _ => break,
            }
        }

        if items.is_empty() {
            return self.error("'*', a variable or '(expression AS ?alias)'");
        }

        if has_expression {
            Ok(Projection::Expressions(items))
        } else {
            Ok(Projection::Variables(
                items.into_iter().map(|item| item.alias).collect(),
            ))
        }
    }

    // ========== Graph patterns ==========

    fn parse_group_pattern(&mut self) -> Result<GraphPattern> {
        self.expect(&Token::LBrace, "'{'")?;

        let mut current: Option<GraphPattern> = None;
        let mut pending: Vec<TriplePattern> = Vec::new();

        loop {
            match self.peek() {
                Token::RBrace => {
                    self.advance();
                    break;
                }
                Token::Eof => return self.error("'}'"),
                Token::Filter => {
                    self.advance();
                    flush(&mut current, &mut pending);
                    let expr = self.parse_constraint()?;
                    current = Some(GraphPattern::Filter {
                        inner: Box::new(current.take().unwrap_or_else(GraphPattern::empty)),
                        expr,
                    });
                }
                Token::Optional => {
                    self.advance();
                    flush(&mut current, &mut pending);
                    let right = self.parse_group_pattern()?;
                    let left = current.take().unwrap_or_else(GraphPattern::empty);
                    current = Some(GraphPattern::Optional(Box::new(left), Box::new(right)));
                }
                Token::Minus => {
                    self.advance();
                    flush(&mut current, &mut pending);
                    let right = self.parse_group_pattern()?;
                    let left = current.take().unwrap_or_else(GraphPattern::empty);
                    current = Some(GraphPattern::Minus(Box::new(left), Box::new(right)));
                }
                Token::Bind => {
                    self.advance();
                    flush(&mut current, &mut pending);
                    self.expect(&Token::LParen, "'('")?;
                    let expr = self.parse_expression()?;
                    self.expect(&Token::As, "AS")?;
                    let variable = self.expect_variable()?;
                    self.expect(&Token::RParen, "')'")?;
                    current = Some(GraphPattern::Bind {
                        inner: Box::new(current.take().unwrap_or_else(GraphPattern::empty)),
                        variable,
                        expr,
                    });
                }
                Token::LBrace => {
                    flush(&mut current, &mut pending);
                    let mut group = self.parse_group_pattern()?;
                    while self.eat(&Token::Union) {
                        let right = self.parse_group_pattern()?;
                        group = GraphPattern::Union(Box::new(group), Box::new(right));
                    }
                    current = Some(join(current.take(), group));
                }
                _ => self.parse_triples(&mut pending)?,
            }

            self.eat(&Token::Dot);
        }

        flush(&mut current, &mut pending);
        Ok(current.unwrap_or_else(GraphPattern::empty))
    }

    /// `subject predicate object [, object]* [; predicate object ...]*`
    fn parse_triples(&mut self, pending: &mut Vec<TriplePattern>) -> Result<()> {
        let subject = self.parse_graph_term("subject")?;

        loop {
            let predicate = self.parse_verb()?;
            loop {
                let object = self.parse_graph_term("object")?;
                pending.push(TriplePattern {
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                    object,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }

            if !self.eat(&Token::Semicolon) {
                break;
            }
            // A dangling ';' before the end of the block is allowed
            if matches!(self.peek(), Token::Dot | Token::RBrace) {
                break;
            }
        }

        Ok(())
    }

    fn parse_verb(&mut self) -> Result<Term> {
        match self.peek().clone() {
            Token::PrefixedName(PrefixedName { prefix, local }) if prefix.is_empty() && local == "a" => {
                self.advance();
                Ok(Term::PrefixedName {
                    prefix: "rdf".to_string(),
                    local: "type".to_string(),
                })
            }
            Token::Variable(_) | Token::Iri(_) | Token::PrefixedName(_) => {
                self.parse_graph_term("predicate")
            }
            _ => self.error("predicate"),
        }
    }

    fn parse_graph_term(&mut self, what: &str) -> Result<Term> {
        let term = match self.peek().clone() {
            Token::Variable(name) => Term::Variable(name),
            Token::Iri(iri) => Term::Iri(iri),
            Token::PrefixedName(PrefixedName { prefix, local }) => Term::PrefixedName { prefix, local },
            Token::Integer(i) | Token::SignedInteger(i) => Term::IntegerLiteral(i),
            Token::Double(d) => Term::DoubleLiteral(d),
            Token::StringLiteral(value) => {
                self.advance();
                return self.parse_literal_suffix(value);
            }
            _ => return self.error(what),
        };
        self.advance();
        Ok(term)
    }

    /// Attach an optional `^^datatype` or `@lang` to a string literal
    fn parse_literal_suffix(&mut self, value: String) -> Result<Term> {
        if self.eat(&Token::DoubleCaret) {
            let datatype = match self.peek().clone() {
                Token::Iri(iri) => iri,
                Token::PrefixedName(PrefixedName { prefix, local }) => {
                    resolve_prefixed(&self.prefixes, &prefix, &local)
                }
                _ => return self.error("datatype IRI"),
            };
            self.advance();
            return Ok(Term::TypedLiteral { value, datatype });
        }

        if let Token::LangTag(lang) = self.peek().clone() {
            self.advance();
            return Ok(Term::LangLiteral { value, lang });
        }

        Ok(Term::StringLiteral(value))
    }

    // ========== Solution modifiers ==========

    fn parse_group_by(&mut self) -> Result<Vec<String>> {
        let mut variables = Vec::new();
        while let Token::Variable(name) = self.peek().clone() {
            self.advance();
            variables.push(name);
        }
        if variables.is_empty() {
            return self.error("variable after GROUP BY");
        }
        Ok(variables)
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderCondition>> {
        let mut conditions = Vec::new();

        loop {
            let condition = match self.peek().clone() {
                Token::Asc | Token::Desc => {
                    let ascending = self.advance() == Token::Asc;
                    OrderCondition {
                        expression: self.parse_bracketted()?,
                        ascending,
                    }
                }
                token if starts_order_condition(&token) => OrderCondition {
                    expression: self.parse_primary()?,
                    ascending: true,
                },
                _ => break,
            };
            conditions.push(condition);
        }

        if conditions.is_empty() {
            return self.error("ordering condition after ORDER BY");
        }
        Ok(conditions)
    }

    fn parse_count(&mut self, clause: &str) -> Result<usize> {
        match self.peek().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(n as usize)
            }
            _ => self.error(&format!("non-negative integer after {clause}")),
        }
    }

    // ========== Expressions ==========

    /// FILTER argument: a bracketted expression or a built-in call
    fn parse_constraint(&mut self) -> Result<FilterExpr> {
        match self.peek().clone() {
            Token::LParen => self.parse_bracketted(),
            token if token.is_function() => self.parse_primary(),
            _ => self.error("'(' or built-in call after FILTER"),
        }
    }

    fn parse_bracketted(&mut self) -> Result<FilterExpr> {
        self.expect(&Token::LParen, "'('")?;
        let expr = self.parse_expression()?;
        self.expect(&Token::RParen, "')'")?;
        Ok(expr)
    }

    fn parse_expression(&mut self) -> Result<FilterExpr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_relational()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_relational()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<FilterExpr> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Token::Equals => BinaryOp::Equals,
            Token::NotEquals => BinaryOp::NotEquals,
            Token::LessThan => BinaryOp::LessThan,
            Token::LessEquals => BinaryOp::LessEquals,
            Token::GreaterThan => BinaryOp::GreaterThan,
            Token::GreaterEquals => BinaryOp::GreaterEquals,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(binary(left, op, right))
    }

    fn parse_additive(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            match self.peek().clone() {
                Token::Plus => {
                    self.advance();
                    let right = self.parse_multiplicative()?;
                    left = binary(left, BinaryOp::Add, right);
                }
                Token::Dash => {
                    self.advance();
                    let right = self.parse_multiplicative()?;
                    left = binary(left, BinaryOp::Subtract, right);
                }
                // `?a -1` lexes the sign into the literal; read it as subtraction
                Token::SignedInteger(n) => {
                    self.advance();
                    let right = FilterExpr::Term(Term::IntegerLiteral(n.wrapping_neg()));
                    left = binary(left, BinaryOp::Subtract, right);
                }
                Token::Double(d) if d.is_sign_negative() => {
                    self.advance();
                    let right = FilterExpr::Term(Term::DoubleLiteral(-d));
                    left = binary(left, BinaryOp::Subtract, right);
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_multiplicative(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Multiply,
                Token::Slash => BinaryOp::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
    }

    fn parse_unary(&mut self) -> Result<FilterExpr> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Dash => UnaryOp::Negate,
            Token::Plus => UnaryOp::Plus,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(FilterExpr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Result<FilterExpr> {
        match self.peek().clone() {
            Token::LParen => self.parse_bracketted(),

            Token::PrefixedName(PrefixedName { prefix, local })
                if self.peek_at(1) == &Token::LParen =>
            {
                let name = if prefix.is_empty() { local } else { format!("{prefix}:{local}") };
                if UNSUPPORTED_AGGREGATES.contains(&name.to_ascii_uppercase().as_str()) {
                    return Err(Error::UnsupportedAggregate(name.to_ascii_uppercase()));
                }
                self.error("built-in function")
            }

            Token::Bound => {
                self.advance();
                self.expect(&Token::LParen, "'('")?;
                let variable = self.expect_variable()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(FilterExpr::Builtin {
                    function: Builtin::Bound,
                    args: vec![FilterExpr::variable(variable)],
                })
            }
            Token::IsIri => self.parse_builtin(Builtin::IsIri, 1, 1),
            Token::IsLiteral => self.parse_builtin(Builtin::IsLiteral, 1, 1),
            Token::Str => self.parse_builtin(Builtin::Str, 1, 1),
            Token::Lang => self.parse_builtin(Builtin::Lang, 1, 1),
            Token::Regex => self.parse_builtin(Builtin::Regex, 2, 3),

            Token::Count => self.parse_aggregate(AggregateFunction::Count),
            Token::Sum => self.parse_aggregate(AggregateFunction::Sum),
            Token::Avg => self.parse_aggregate(AggregateFunction::Avg),
            Token::Min => self.parse_aggregate(AggregateFunction::Min),
            Token::Max => self.parse_aggregate(AggregateFunction::Max),

            token if token.is_term_start() => Ok(FilterExpr::Term(self.parse_graph_term("expression")?)),

            _ => self.error("expression"),
        }
    }

    fn parse_builtin(&mut self, function: Builtin, min_args: usize, max_args: usize) -> Result<FilterExpr> {
        self.advance();
        self.expect(&Token::LParen, "'('")?;

        let mut args = vec![self.parse_expression()?];
        while args.len() < max_args && self.eat(&Token::Comma) {
            args.push(self.parse_expression()?);
        }
        if args.len() < min_args {
            return self.error("','");
        }

        self.expect(&Token::RParen, "')'")?;
        Ok(FilterExpr::Builtin { function, args })
    }

    fn parse_aggregate(&mut self, function: AggregateFunction) -> Result<FilterExpr> {
        self.advance();
        self.expect(&Token::LParen, "'('")?;
        let distinct = self.eat(&Token::Distinct);

        let arg = if function == AggregateFunction::Count && self.eat(&Token::Star) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        self.expect(&Token::RParen, "')'")?;
        Ok(FilterExpr::Aggregate { function, distinct, arg })
    }

    // ========== Token helpers ==========

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, expected: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            self.error(expected)
        }
    }

    fn expect_variable(&mut self) -> Result<String> {
        match self.peek().clone() {
            Token::Variable(name) => {
                self.advance();
                Ok(name)
            }
            _ => self.error("variable"),
        }
    }

    fn error<T>(&self, expected: &str) -> Result<T> {
        Err(Error::UnexpectedToken {
            expected: expected.to_string(),
            found: self.peek().to_string(),
            position: self.pos,
        })
    }
}

fn binary(left: FilterExpr, op: BinaryOp, right: FilterExpr) -> FilterExpr {
    FilterExpr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn join(current: Option<GraphPattern>, next: GraphPattern) -> GraphPattern {
    match current {
        Some(left) => GraphPattern::Join(Box::new(left), Box::new(next)),
        None => next,
    }
}

/// Fold buffered triple patterns into the pattern built so far
fn flush(current: &mut Option<GraphPattern>, pending: &mut Vec<TriplePattern>) {
    if pending.is_empty() {
        return;
    }
    let bgp = GraphPattern::Bgp(std::mem::take(pending));
    *current = Some(join(current.take(), bgp));
}

fn starts_order_condition(token: &Token) -> bool {
    matches!(token, Token::Variable(_) | Token::LParen) || token.is_function()
}

fn warn_repeated(clause: &str, repeated: bool) {
    if repeated {
        warn!("{} clause given more than once; the last one wins", clause);
    }
}
