//! Query lexer using logos

use logos::{Lexer, Logos};
use serde::{Deserialize, Serialize};
use trellis_core::{Error, Result};

/// Failure raised by a token callback
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
    UnterminatedIri,
    UnterminatedString,
    InvalidEscape(char),
    InvalidNumber(String),
}

/// A `prefix:local` name; bare words carry an empty prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefixedName {
    pub prefix: String,
    pub local: String,
}

/// Query tokens
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // Keywords
    #[token("SELECT", ignore(ascii_case))]
    Select,

    #[token("DISTINCT", ignore(ascii_case))]
    Distinct,

    #[token("WHERE", ignore(ascii_case))]
    Where,

    #[token("FILTER", ignore(ascii_case))]
    Filter,

    #[token("OPTIONAL", ignore(ascii_case))]
    Optional,

    #[token("UNION", ignore(ascii_case))]
    Union,

    #[token("MINUS", ignore(ascii_case))]
    Minus,

    #[token("BIND", ignore(ascii_case))]
    Bind,

    #[token("AS", ignore(ascii_case))]
    As,

    /// `GROUP BY` is a single token; a lone GROUP lexes as a bare word
    #[regex(r"group[ \t\r\n]+by", ignore(ascii_case))]
    GroupBy,

    #[regex(r"order[ \t\r\n]+by", ignore(ascii_case))]
    OrderBy,

    #[token("HAVING", ignore(ascii_case))]
    Having,

    #[token("ASC", ignore(ascii_case))]
    Asc,

    #[token("DESC", ignore(ascii_case))]
    Desc,

    #[token("LIMIT", ignore(ascii_case))]
    Limit,

    #[token("OFFSET", ignore(ascii_case))]
    Offset,

    #[token("PREFIX", ignore(ascii_case))]
    Prefix,

    // Aggregates
    #[token("COUNT", ignore(ascii_case))]
    Count,

    #[token("SUM", ignore(ascii_case))]
    Sum,

    #[token("AVG", ignore(ascii_case))]
    Avg,

    #[token("MIN", ignore(ascii_case))]
    Min,

    #[token("MAX", ignore(ascii_case))]
    Max,

    // Built-in functions
    #[token("BOUND", ignore(ascii_case))]
    Bound,

    #[token("isIRI", ignore(ascii_case))]
    #[token("isURI", ignore(ascii_case))]
    IsIri,

    #[token("isLiteral", ignore(ascii_case))]
    IsLiteral,

    #[token("STR", ignore(ascii_case))]
    Str,

    #[token("LANG", ignore(ascii_case))]
    Lang,

    #[token("REGEX", ignore(ascii_case))]
    Regex,

    // Symbols
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(".")]
    Dot,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("+")]
    Plus,

    #[token("-")]
    Dash,

    #[token("!")]
    Bang,

    #[token("=")]
    Equals,

    #[token("!=")]
    NotEquals,

    #[token("<")]
    LessThan,

    #[token("<=")]
    LessEquals,

    #[token(">")]
    GreaterThan,

    #[token(">=")]
    GreaterEquals,

    #[token("&&")]
    AndAnd,

    #[token("||")]
    OrOr,

    /// Datatype marker, attached to the preceding string by the parser
    #[token("^^")]
    DoubleCaret,

    // Terms
    #[regex(r"[?$][A-Za-z0-9_]+", |lex| lex.slice()[1..].to_string())]
    Variable(String),

    /// `<` followed by a digit, sign, variable or quote is a comparison, so
    /// `?a<30&&?b>20` lexes as operators rather than one IRI
    #[regex(r#"<([^<>"{}|^`\\\x00-\x20?$0-9.=+!'(\-][^<>"{}|^`\\\x00-\x20]*)?>"#, iri)]
    #[regex(r#"<[A-Za-z][^<>"{}|^`\\\x00-\x20]*"#, unterminated_iri)]
    Iri(String),

    #[regex(r"([A-Za-z_][A-Za-z0-9_-]*)?:([A-Za-z0-9_][A-Za-z0-9_-]*)?", prefixed_name)]
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", bare_word)]
    PrefixedName(PrefixedName),

    #[regex(r#""([^"\\\n]|\\.)*""#, string_literal)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, string_literal)]
    #[regex(r#""([^"\\\n]|\\.)*"#, unterminated_string)]
    #[regex(r#"'([^'\\\n]|\\.)*"#, unterminated_string)]
    StringLiteral(String),

    /// Language tag, attached to the preceding string by the parser
    #[regex(r"@[A-Za-z]+(-[A-Za-z0-9]+)*", |lex| lex.slice()[1..].to_string())]
    LangTag(String),

    #[regex(r"[0-9]+", integer)]
    Integer(i64),

    /// Integer written with a leading `-`; kept apart so `-0` still reads
    /// as subtraction after an operand
    #[regex(r"-[0-9]+", integer)]
    SignedInteger(i64),

    #[regex(r"-?[0-9]*\.[0-9]+([eE][+-]?[0-9]+)?", double)]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", double)]
    Double(f64),

    // Comment (skip)
    #[regex(r"#[^\n]*", logos::skip)]
    LineComment,

    /// Terminal token appended by [`tokenize`]
    Eof,
}

fn iri(lex: &mut Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

fn unterminated_iri(_lex: &mut Lexer<Token>) -> std::result::Result<String, LexError> {
    Err(LexError::UnterminatedIri)
}

fn prefixed_name(lex: &mut Lexer<Token>) -> PrefixedName {
    let (prefix, local) = lex.slice().split_once(':').unwrap_or(("", lex.slice()));
    PrefixedName {
        prefix: prefix.to_string(),
        local: local.to_string(),
    }
}

fn bare_word(lex: &mut Lexer<Token>) -> PrefixedName {
    PrefixedName {
        prefix: String::new(),
        local: lex.slice().to_string(),
    }
}

fn string_literal(lex: &mut Lexer<Token>) -> std::result::Result<String, LexError> {
    let s = lex.slice();
    unescape(&s[1..s.len() - 1])
}

fn unterminated_string(_lex: &mut Lexer<Token>) -> std::result::Result<String, LexError> {
    Err(LexError::UnterminatedString)
}

fn integer(lex: &mut Lexer<Token>) -> std::result::Result<i64, LexError> {
    lex.slice()
        .parse()
        .map_err(|_| LexError::InvalidNumber(lex.slice().to_string()))
}

fn double(lex: &mut Lexer<Token>) -> std::result::Result<f64, LexError> {
    lex.slice()
        .parse()
        .map_err(|_| LexError::InvalidNumber(lex.slice().to_string()))
}

/// Resolve C-style escapes inside a quoted string
fn unescape(raw: &str) -> std::result::Result<String, LexError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => return Err(LexError::InvalidEscape(other)),
            None => return Err(LexError::UnterminatedString),
        }
    }
    Ok(out)
}

impl Token {
    /// Check if this token can start a graph term
    pub fn is_term_start(&self) -> bool {
        matches!(
            self,
            Token::Variable(_)
                | Token::Iri(_)
                | Token::PrefixedName(_)
                | Token::StringLiteral(_)
                | Token::Integer(_)
                | Token::SignedInteger(_)
                | Token::Double(_)
        )
    }

    /// Check if this token names a built-in function or aggregate
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            Token::Count
                | Token::Sum
                | Token::Avg
                | Token::Min
                | Token::Max
                | Token::Bound
                | Token::IsIri
                | Token::IsLiteral
                | Token::Str
                | Token::Lang
                | Token::Regex
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Variable(name) => write!(f, "variable ?{name}"),
            Token::Iri(iri) => write!(f, "IRI <{iri}>"),
            Token::PrefixedName(name) if name.prefix.is_empty() && !name.local.is_empty() => {
                write!(f, "'{}'", name.local)
            }
            Token::PrefixedName(name) => write!(f, "name {}:{}", name.prefix, name.local),
            Token::StringLiteral(value) => write!(f, "string \"{value}\""),
            Token::LangTag(tag) => write!(f, "language tag @{tag}"),
            Token::Integer(i) | Token::SignedInteger(i) => write!(f, "integer {i}"),
            Token::Double(d) => write!(f, "number {d}"),
            Token::GroupBy => write!(f, "GROUP BY"),
            Token::OrderBy => write!(f, "ORDER BY"),
            Token::Eof => write!(f, "end of input"),
            other => write!(f, "'{}'", symbol(other)),
        }
    }
}

fn symbol(token: &Token) -> &'static str {
    match token {
        Token::Select => "SELECT",
        Token::Distinct => "DISTINCT",
        Token::Where => "WHERE",
        Token::Filter => "FILTER",
        Token::Optional => "OPTIONAL",
        Token::Union => "UNION",
        Token::Minus => "MINUS",
        Token::Bind => "BIND",
        Token::As => "AS",
        Token::Having => "HAVING",
        Token::Asc => "ASC",
        Token::Desc => "DESC",
        Token::Limit => "LIMIT",
        Token::Offset => "OFFSET",
        Token::Prefix => "PREFIX",
        Token::Count => "COUNT",
        Token::Sum => "SUM",
        Token::Avg => "AVG",
        Token::Min => "MIN",
        Token::Max => "MAX",
        Token::Bound => "BOUND",
        Token::IsIri => "isIRI",
        Token::IsLiteral => "isLiteral",
        Token::Str => "STR",
        Token::Lang => "LANG",
        Token::Regex => "REGEX",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::Dot => ".",
        Token::Comma => ",",
        Token::Semicolon => ";",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Plus => "+",
        Token::Dash => "-",
        Token::Bang => "!",
        Token::Equals => "=",
        Token::NotEquals => "!=",
        Token::LessThan => "<",
        Token::LessEquals => "<=",
        Token::GreaterThan => ">",
        Token::GreaterEquals => ">=",
        Token::AndAnd => "&&",
        Token::OrOr => "||",
        Token::DoubleCaret => "^^",
        _ => "token",
    }
}

/// Tokenize a query string.
///
/// The returned sequence always ends with [`Token::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut lexer = Token::lexer(input);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(err) => return Err(lex_error(err, input, lexer.span().start)),
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn lex_error(err: LexError, input: &str, position: usize) -> Error {
    match err {
        LexError::UnexpectedCharacter => Error::UnexpectedCharacter {
            character: input[position..].chars().next().unwrap_or('\0'),
            position,
        },
        LexError::UnterminatedIri => Error::InvalidIri {
            position,
            message: "unterminated IRI, expected '>'".to_string(),
        },
        LexError::UnterminatedString => Error::InvalidLiteral {
            position,
            message: "unterminated string literal".to_string(),
        },
        LexError::InvalidEscape(c) => Error::InvalidLiteral {
            position,
            message: format!("invalid escape sequence '\\{c}'"),
        },
        LexError::InvalidNumber(text) => Error::InvalidLiteral {
            position,
            message: format!("malformed number '{text}'"),
        },
    }
}
