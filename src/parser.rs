//! SQL text → typed statement.
//!
//! The dialect is deliberately small: CREATE TABLE, DROP TABLE, single-row
//! INSERT, SELECT with at most one JOIN and one WHERE, UPDATE, DELETE.
//! Keywords are case-insensitive, identifiers are not, whitespace between
//! tokens is free-form, and a trailing `;` is allowed. Splitting respects
//! single-quoted strings; there are no escape sequences, so a literal
//! apostrophe cannot appear in a value.
//!
//! The parser is pure: it never consults the catalog and never checks that
//! tables or columns exist. Structural mismatch fails with a parse error.

use crate::error::{Result, TabletError};
use crate::storage::Value;

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable { table: String, columns: Vec<ColumnSpec> },
    DropTable { table: String },
    Insert { table: String, row: Vec<(String, Value)> },
    Select { table: String, columns: Vec<String>, join: Option<Join>, filter: Option<Predicate> },
    Update { table: String, assignments: Vec<(String, Value)>, filter: Option<Predicate> },
    Delete { table: String, filter: Option<Predicate> },
}

/// One column definition from CREATE TABLE. The dtype spelling is kept raw;
/// the storage layer decides whether it is supported.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: String,
    pub primary: bool,
    pub unique: bool,
}

/// `JOIN <table> ON <left-column> = <right-column>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Gt,
}

/// A single `WHERE <column> <op> <literal>` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn parse(sql: &str) -> Result<Statement> {
    let sql = strip_semicolon(sql);
    if sql.is_empty() {
        return Err(TabletError::Parse("empty SQL".into()));
    }

    if let Some(rest) = strip_keywords(sql, &["CREATE", "TABLE"]) {
        return parse_create_table(rest);
    }
    if let Some(rest) = strip_keywords(sql, &["DROP", "TABLE"]) {
        return parse_drop_table(rest);
    }
    if let Some(rest) = strip_keywords(sql, &["INSERT", "INTO"]) {
        return parse_insert(rest);
    }
    if let Some(rest) = strip_keywords(sql, &["SELECT"]) {
        return parse_select(rest);
    }
    if let Some(rest) = strip_keywords(sql, &["UPDATE"]) {
        return parse_update(rest);
    }
    if let Some(rest) = strip_keywords(sql, &["DELETE", "FROM"]) {
        return parse_delete(rest);
    }
    Err(TabletError::Parse("unsupported SQL".into()))
}

// ---------------------------------------------------------------------------
// Per-statement parsers
// ---------------------------------------------------------------------------

fn parse_create_table(rest: &str) -> Result<Statement> {
    let open = rest
        .find('(')
        .ok_or_else(|| TabletError::Parse("invalid CREATE TABLE".into()))?;
    let table = parse_identifier(&rest[..open])?;
    let body = rest[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| TabletError::Parse("invalid CREATE TABLE".into()))?;

    let mut columns = Vec::new();
    for cdef in split_csv(body) {
        let parts: Vec<&str> = cdef.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(TabletError::Parse("invalid column definition".into()));
        }
        let name = parse_identifier(parts[0])?;
        let dtype = parts[1].to_ascii_uppercase();
        let primary = parts[2..].iter().any(|p| p.eq_ignore_ascii_case("PRIMARY"));
        let unique = parts[2..].iter().any(|p| p.eq_ignore_ascii_case("UNIQUE"));
        columns.push(ColumnSpec { name, dtype, primary, unique });
    }
    Ok(Statement::CreateTable { table, columns })
}

fn parse_drop_table(rest: &str) -> Result<Statement> {
    let table = parse_identifier(rest)?;
    Ok(Statement::DropTable { table })
}

fn parse_insert(rest: &str) -> Result<Statement> {
    let open = rest
        .find('(')
        .ok_or_else(|| TabletError::Parse("invalid INSERT".into()))?;
    let table = parse_identifier(&rest[..open])?;
    let after_open = &rest[open + 1..];
    let close = after_open
        .find(')')
        .ok_or_else(|| TabletError::Parse("invalid INSERT".into()))?;
    let cols_body = &after_open[..close];

    let tail = after_open[close + 1..].trim_start();
    let tail = strip_keywords(tail, &["VALUES"]).ok_or_else(|| TabletError::Parse("invalid INSERT".into()))?;
    let tail = tail.trim();
    let vals_body = tail
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| TabletError::Parse("invalid INSERT".into()))?;
    if vals_body.contains(')') {
        return Err(TabletError::Parse("invalid INSERT".into()));
    }

    let cols = split_csv(cols_body)
        .into_iter()
        .map(parse_identifier)
        .collect::<Result<Vec<_>>>()?;
    let vals: Vec<Value> = split_csv(vals_body).into_iter().map(parse_literal).collect();
    if cols.len() != vals.len() {
        return Err(TabletError::Parse("INSERT columns/values mismatch".into()));
    }
    Ok(Statement::Insert { table, row: cols.into_iter().zip(vals).collect() })
}

fn parse_select(rest: &str) -> Result<Statement> {
    let from = find_keyword(rest, "FROM").ok_or_else(|| TabletError::Parse("invalid SELECT".into()))?;
    let cols_part = rest[..from].trim();
    let columns = if cols_part == "*" {
        vec!["*".to_string()]
    } else {
        split_csv(cols_part)
            .into_iter()
            .map(parse_identifier)
            .collect::<Result<Vec<_>>>()?
    };

    let tail = &rest[from + "FROM".len()..];
    let join_pos = find_keyword(tail, "JOIN");
    let where_pos = find_keyword(tail, "WHERE");

    // A JOIN keyword after WHERE belongs to the WHERE literal, not to a
    // join clause.
    let join_pos = match (join_pos, where_pos) {
        (Some(j), Some(w)) if j > w => None,
        (j, _) => j,
    };

    let table_end = join_pos.or(where_pos).unwrap_or(tail.len());
    let table = parse_identifier(&tail[..table_end])?;

    let join = match join_pos {
        None => None,
        Some(j) => {
            let seg = &tail[j + "JOIN".len()..where_pos.unwrap_or(tail.len())];
            let on = find_keyword(seg, "ON").ok_or_else(|| TabletError::Parse("invalid SELECT".into()))?;
            let join_table = parse_identifier(&seg[..on])?;
            let (left, right) = seg[on + "ON".len()..]
                .split_once('=')
                .ok_or_else(|| TabletError::Parse("invalid SELECT".into()))?;
            Some(Join {
                table: join_table,
                left: parse_identifier(left)?,
                right: parse_identifier(right)?,
            })
        }
    };

    let filter = match where_pos {
        None => None,
        Some(w) => Some(parse_predicate(&tail[w + "WHERE".len()..])?),
    };

    Ok(Statement::Select { table, columns, join, filter })
}

fn parse_update(rest: &str) -> Result<Statement> {
    let set = find_keyword(rest, "SET").ok_or_else(|| TabletError::Parse("invalid UPDATE".into()))?;
    let table = parse_identifier(&rest[..set])?;

    let tail = &rest[set + "SET".len()..];
    let where_pos = find_keyword(tail, "WHERE");
    let set_body = &tail[..where_pos.unwrap_or(tail.len())];

    let mut assignments = Vec::new();
    for assign in split_csv(set_body) {
        let (col, val) = assign
            .split_once('=')
            .ok_or_else(|| TabletError::Parse("invalid SET assignment".into()))?;
        assignments.push((parse_identifier(col)?, parse_literal(val)));
    }

    let filter = match where_pos {
        None => None,
        Some(w) => Some(parse_predicate(&tail[w + "WHERE".len()..])?),
    };
    Ok(Statement::Update { table, assignments, filter })
}

fn parse_delete(rest: &str) -> Result<Statement> {
    let where_pos = find_keyword(rest, "WHERE");
    let table = parse_identifier(&rest[..where_pos.unwrap_or(rest.len())])?;
    let filter = match where_pos {
        None => None,
        Some(w) => Some(parse_predicate(&rest[w + "WHERE".len()..])?),
    };
    Ok(Statement::Delete { table, filter })
}

/// `<identifier> (=|<|>) <literal>`. The literal is the raw remainder of
/// the statement, so a bareword value may contain spaces.
fn parse_predicate(s: &str) -> Result<Predicate> {
    let mut in_str = false;
    for (i, ch) in s.char_indices() {
        match ch {
            '\'' => in_str = !in_str,
            '=' | '<' | '>' if !in_str => {
                let op = match ch {
                    '=' => CompareOp::Eq,
                    '<' => CompareOp::Lt,
                    _ => CompareOp::Gt,
                };
                let column = parse_identifier(&s[..i])?;
                let value = parse_literal(&s[i + 1..]);
                return Ok(Predicate { column, op, value });
            }
            _ => {}
        }
    }
    Err(TabletError::Parse("invalid WHERE clause".into()))
}

// ---------------------------------------------------------------------------
// Lexical helpers
// ---------------------------------------------------------------------------

fn strip_semicolon(sql: &str) -> &str {
    let s = sql.trim();
    match s.strip_suffix(';') {
        Some(stripped) => stripped.trim_end(),
        None => s,
    }
}

/// Consume a sequence of leading keywords (case-insensitive, any amount of
/// whitespace between them) and return the remainder, or None if the input
/// does not start with them. Each keyword must end at a word boundary.
fn strip_keywords<'a>(s: &'a str, keywords: &[&str]) -> Option<&'a str> {
    let mut rest = s;
    for kw in keywords {
        rest = strip_keyword(rest.trim_start(), kw)?;
    }
    Some(rest)
}

fn strip_keyword<'a>(s: &'a str, kw: &str) -> Option<&'a str> {
    if s.len() < kw.len() || !s.as_bytes()[..kw.len()].eq_ignore_ascii_case(kw.as_bytes()) {
        return None;
    }
    let rest = s.get(kw.len()..)?;
    match rest.bytes().next() {
        None => Some(rest),
        Some(b) if b.is_ascii_whitespace() || b == b'(' => Some(rest),
        _ => None,
    }
}

/// Find a standalone keyword (whitespace on both sides, case-insensitive)
/// outside single-quoted strings. Returns the byte offset of its start.
fn find_keyword(s: &str, kw: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut in_str = false;
    let mut i = 0;
    while i + kw.len() <= bytes.len() {
        if bytes[i] == b'\'' {
            in_str = !in_str;
            i += 1;
            continue;
        }
        if !in_str
            && bytes[i..i + kw.len()].eq_ignore_ascii_case(kw.as_bytes())
            && (i == 0 || bytes[i - 1].is_ascii_whitespace())
            && bytes
                .get(i + kw.len())
                .is_none_or(|b| b.is_ascii_whitespace())
        {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Split on commas outside single-quoted strings. Interior empty items are
/// kept; a trailing empty item is dropped.
fn split_csv(s: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut in_str = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '\'' => in_str = !in_str,
            ',' if !in_str => {
                items.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}

fn parse_identifier(s: &str) -> Result<String> {
    let s = s.trim();
    let mut chars = s.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(TabletError::Parse(format!("invalid identifier: {s}")));
    }
    Ok(s.to_string())
}

/// Classify a literal token: NULL, a quoted string, an integer, a float, or
/// a bareword (kept verbatim as a string; the consumer coerces it).
fn parse_literal(token: &str) -> Value {
    let t = token.trim();
    if t.eq_ignore_ascii_case("NULL") {
        return Value::Null;
    }
    if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        return Value::Str(t[1..t.len() - 1].to_string());
    }
    let digits = t.strip_prefix('-').unwrap_or(t);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        // A digit run too large for i64 falls through to the bareword class.
        if let Ok(i) = t.parse::<i64>() {
            return Value::Int(i);
        }
        return Value::Str(t.to_string());
    }
    if let Some((whole, frac)) = digits.split_once('.') {
        if !whole.is_empty()
            && !frac.is_empty()
            && whole.bytes().all(|b| b.is_ascii_digit())
            && frac.bytes().all(|b| b.is_ascii_digit())
        {
            if let Ok(f) = t.parse::<f64>() {
                return Value::Float(f);
            }
        }
    }
    Value::Str(t.to_string())
}
