//! Classification of schema text reported by the SQLite catalog.
//!
//! The catalog hands back fragments of the original `CREATE` statements:
//! default values from `PRAGMA table_info`, the full table SQL from
//! `sqlite_master`, virtual table definitions. Rather than matching on
//! substrings, this module parses them with small explicit grammars:
//!
//! - default values: quoted string, blob literal, numeric literal,
//!   parenthesized expression, bare keyword, or any other expression
//! - table options after the column list: `STRICT`, `WITHOUT ROWID`
//! - `CREATE VIRTUAL TABLE name USING module(arg, ...)`

use std::fmt;

use crate::error::{CoreError, Result};
use crate::value::Value;

/// Quotes an identifier with double quotes, doubling embedded quotes.
///
/// ```
/// use dyntable_core::quote_identifier;
///
/// assert_eq!(quote_identifier("dogs"), "\"dogs\"");
/// assert_eq!(quote_identifier("say \"hi\""), "\"say \"\"hi\"\"\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal with single quotes, doubling embedded quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Strips one level of identifier quoting (`"x"`, `[x]`, `` `x` ``, `'x'`).
pub fn unquote_identifier(text: &str) -> String {
    let text = text.trim();
    let bytes = text.as_bytes();
    if bytes.len() < 2 {
        return text.to_string();
    }
    let inner = || &text[1..text.len() - 1];
    match (bytes[0], bytes[bytes.len() - 1]) {
        (b'"', b'"') => inner().replace("\"\"", "\""),
        (b'\'', b'\'') => inner().replace("''", "'"),
        (b'`', b'`') => inner().replace("``", "`"),
        (b'[', b']') => inner().to_string(),
        _ => text.to_string(),
    }
}

/// A column default, classified by its literal form.
///
/// Constants supplied as [`Value`]s are quoted on the way in; expressions and
/// keywords are kept verbatim.
///
/// # Examples
///
/// ```
/// use dyntable_core::{SqlDefault, Value};
///
/// assert_eq!(SqlDefault::parse("'dog'").unwrap(), SqlDefault::Text("'dog'".into()));
/// assert_eq!(SqlDefault::parse("CURRENT_TIMESTAMP").unwrap().to_sql(), "CURRENT_TIMESTAMP");
/// assert_eq!(SqlDefault::parse("datetime('now')").unwrap().to_sql(), "(datetime('now'))");
/// assert_eq!(SqlDefault::from_value(&Value::from("it's")).to_sql(), "'it''s'");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlDefault {
    /// Quoted string literal, quotes included.
    Text(String),
    /// Blob literal such as `X'00FF'`.
    Blob(String),
    /// Numeric literal, optionally signed.
    Number(String),
    /// Bare keyword: `NULL`, `TRUE`, `CURRENT_TIMESTAMP`, ...
    Keyword(String),
    /// Any other expression, stored without its outer parentheses.
    Expression(String),
}

impl SqlDefault {
    /// Classifies default-value text as reported by `PRAGMA table_info`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSql`] for empty text or an unterminated
    /// string literal.
    pub fn parse(text: &str) -> Result<SqlDefault> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::InvalidSql("empty default value".into()));
        }
        let first = text.as_bytes()[0];

        if first == b'\'' || first == b'"' {
            let end = scan_quoted(text, 0)
                .ok_or_else(|| CoreError::InvalidSql(format!("unterminated literal: {text}")))?;
            if end == text.len() {
                return Ok(SqlDefault::Text(text.to_string()));
            }
            return Ok(SqlDefault::Expression(text.to_string()));
        }
        if (first == b'x' || first == b'X') && text.len() >= 3 && text.as_bytes()[1] == b'\'' {
            if scan_quoted(text, 1) == Some(text.len()) {
                return Ok(SqlDefault::Blob(text.to_string()));
            }
        }
        if is_numeric_literal(text) {
            return Ok(SqlDefault::Number(text.to_string()));
        }
        if first == b'(' && matching_paren(text, 0) == Some(text.len() - 1) {
            return Ok(SqlDefault::Expression(text[1..text.len() - 1].trim().to_string()));
        }
        if text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Ok(SqlDefault::Keyword(text.to_string()));
        }
        Ok(SqlDefault::Expression(text.to_string()))
    }

    /// Builds a constant default from a value.
    pub fn from_value(value: &Value) -> SqlDefault {
        match value {
            Value::Null => SqlDefault::Keyword("NULL".into()),
            Value::Bool(b) => SqlDefault::Number(if *b { "1" } else { "0" }.into()),
            Value::Integer(i) => SqlDefault::Number(i.to_string()),
            Value::Float(f) => SqlDefault::Number(f.to_string()),
            Value::Text(s) => SqlDefault::Text(quote_literal(s)),
            Value::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                SqlDefault::Blob(format!("X'{hex}'"))
            }
            Value::List(_) | Value::Map(_) => SqlDefault::Text(quote_literal(&value.to_json().to_string())),
        }
    }

    /// An expression default, e.g. `datetime('now')`.
    pub fn expression(expr: impl Into<String>) -> SqlDefault {
        SqlDefault::Expression(expr.into())
    }

    /// A keyword default, e.g. `CURRENT_TIMESTAMP`.
    pub fn keyword(keyword: impl Into<String>) -> SqlDefault {
        SqlDefault::Keyword(keyword.into())
    }

    /// Returns the text to place after `DEFAULT` in a column definition.
    pub fn to_sql(&self) -> String {
        match self {
            SqlDefault::Text(s) | SqlDefault::Blob(s) | SqlDefault::Number(s) | SqlDefault::Keyword(s) => {
                s.clone()
            }
            SqlDefault::Expression(expr) => format!("({expr})"),
        }
    }

    /// Returns `true` for the `NULL` keyword.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlDefault::Keyword(k) if k.eq_ignore_ascii_case("NULL"))
    }
}

impl From<Value> for SqlDefault {
    fn from(value: Value) -> Self {
        SqlDefault::from_value(&value)
    }
}

impl fmt::Display for SqlDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Options trailing the column list of a `CREATE TABLE` statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub strict: bool,
    pub without_rowid: bool,
}

/// Parses the table options of a `CREATE TABLE` statement.
///
/// ```
/// use dyntable_core::table_options;
///
/// let opts = table_options("CREATE TABLE t (id INTEGER PRIMARY KEY) WITHOUT ROWID, STRICT");
/// assert!(opts.strict);
/// assert!(opts.without_rowid);
/// ```
pub fn table_options(create_sql: &str) -> TableOptions {
    let mut options = TableOptions::default();
    let Some(open) = find_unquoted(create_sql, b'(') else {
        return options;
    };
    let Some(close) = matching_paren(create_sql, open) else {
        return options;
    };
    for option in create_sql[close + 1..].split(',') {
        let normalized: Vec<String> = option
            .split_whitespace()
            .map(|word| word.trim_end_matches(';').to_ascii_uppercase())
            .filter(|word| !word.is_empty())
            .collect();
        match normalized.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["STRICT"] => options.strict = true,
            ["WITHOUT", "ROWID"] => options.without_rowid = true,
            _ => {}
        }
    }
    options
}

/// A parsed `CREATE VIRTUAL TABLE` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualTableDef {
    /// Table name, unquoted.
    pub name: String,
    /// Module name as written (e.g. `fts5`, `FTS4`).
    pub module: String,
    /// Raw module arguments, trimmed.
    pub args: Vec<String>,
}

impl VirtualTableDef {
    /// Parses a `CREATE VIRTUAL TABLE` statement; returns `None` for
    /// anything else.
    ///
    /// ```
    /// use dyntable_core::VirtualTableDef;
    ///
    /// let def = VirtualTableDef::parse(
    ///     r#"CREATE VIRTUAL TABLE "docs_fts" USING FTS5 ("title", body, tokenize='porter', content="docs")"#,
    /// ).unwrap();
    /// assert_eq!(def.name, "docs_fts");
    /// assert_eq!(def.columns(), ["title", "body"]);
    /// assert_eq!(def.option("content").as_deref(), Some("docs"));
    /// assert_eq!(def.option("tokenize").as_deref(), Some("porter"));
    /// ```
    pub fn parse(sql: &str) -> Option<VirtualTableDef> {
        let mut rest = sql.trim_start();
        for keyword in ["CREATE", "VIRTUAL", "TABLE"] {
            rest = strip_keyword(rest, keyword)?;
        }
        if let Some(after_if) = strip_keyword(rest, "IF") {
            rest = strip_keyword(strip_keyword(after_if, "NOT")?, "EXISTS")?;
        }
        let (mut name, mut after_name) = read_identifier(rest)?;
        if let Some(after_dot) = after_name.trim_start().strip_prefix('.') {
            let (table, after_table) = read_identifier(after_dot)?;
            name = table;
            after_name = after_table;
        }
        let rest = strip_keyword(after_name, "USING")?;
        let (module, after_module) = read_identifier(rest)?;
        let after_module = after_module.trim_start();
        let args = if after_module.starts_with('(') {
            let close = matching_paren(after_module, 0)?;
            split_top_level(&after_module[1..close])
        } else {
            Vec::new()
        };
        Some(VirtualTableDef { name, module, args })
    }

    /// Column names declared in the arguments (those without `=`).
    pub fn columns(&self) -> Vec<String> {
        self.args
            .iter()
            .filter(|arg| find_unquoted(arg, b'=').is_none())
            .filter_map(|arg| read_identifier(arg).map(|(name, _)| name))
            .collect()
    }

    /// Value of a `key=value` argument, unquoted. Keys match
    /// case-insensitively.
    pub fn option(&self, key: &str) -> Option<String> {
        self.args.iter().find_map(|arg| {
            let eq = find_unquoted(arg, b'=')?;
            let (k, v) = arg.split_at(eq);
            k.trim()
                .eq_ignore_ascii_case(key)
                .then(|| unquote_identifier(v[1..].trim()))
        })
    }

    /// Returns `true` when the module is `fts3`, `fts4` or `fts5`.
    pub fn is_fts(&self) -> bool {
        let module = self.module.to_ascii_lowercase();
        matches!(module.as_str(), "fts3" | "fts4" | "fts5")
    }
}

/// Returns the index just past the closing quote of the literal starting at
/// `start`, honouring doubled quotes.
fn scan_quoted(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let quote = *bytes.get(start)?;
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Index of the parenthesis closing the one at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = scan_quoted(text, i)?;
                continue;
            }
            b'[' => {
                i += text[i..].find(']')? + 1;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// First occurrence of `needle` outside quotes and brackets.
fn find_unquoted(text: &str, needle: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b if b == needle => return Some(i),
            b'\'' | b'"' | b'`' => {
                i = scan_quoted(text, i)?;
                continue;
            }
            b'[' => {
                i += text[i..].find(']')? + 1;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Splits on commas that are not nested in parentheses or quotes.
fn split_top_level(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = scan_quoted(text, i).unwrap_or(bytes.len());
                continue;
            }
            b'[' => {
                i = text[i..].find(']').map_or(bytes.len(), |off| i + off + 1);
                continue;
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        parts.push(last.to_string());
    }
    parts
}

/// Strips a case-insensitive keyword followed by a word boundary.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let text = text.trim_start();
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    match rest.chars().next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => None,
        _ => Some(rest),
    }
}

/// Reads a bare or quoted identifier, returning it unquoted with the rest.
fn read_identifier(text: &str) -> Option<(String, &str)> {
    let text = text.trim_start();
    let first = *text.as_bytes().first()?;
    match first {
        b'"' | b'\'' | b'`' => {
            let end = scan_quoted(text, 0)?;
            Some((unquote_identifier(&text[..end]), &text[end..]))
        }
        b'[' => {
            let end = text.find(']')? + 1;
            Some((unquote_identifier(&text[..end]), &text[end..]))
        }
        _ => {
            let end = text
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                .unwrap_or(text.len());
            if end == 0 {
                return None;
            }
            Some((text[..end].to_string(), &text[end..]))
        }
    }
}

fn is_numeric_literal(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    let mut parts = mantissa.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    let mantissa_ok = digits(int_part)
        && frac_part.is_none_or(digits)
        && (!int_part.is_empty() || frac_part.is_some_and(|f| !f.is_empty()));
    let exponent_ok = exponent.is_none_or(|e| {
        let e = e.strip_prefix(['+', '-']).unwrap_or(e);
        !e.is_empty() && digits(e)
    });
    mantissa_ok && exponent_ok
}
