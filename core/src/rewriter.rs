//! Splits a mixed query into its relational and text halves and makes sure the
//! relational half projects the join key.
//!
//! Key injection is a textual rewrite, not a SQL parser. It only understands a single
//! top-level `SELECT`; clauses with subqueries or compound selects are rejected with
//! [`EngineError::RewriteAmbiguity`] when the key is not already projected.

use crate::error::{EngineError, Result};
use crate::relational::RelationalPredicate;
use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_SEPARATOR: &str = "WITH";

lazy_static! {
    static ref SELECT_RE: Regex = Regex::new(r"(?i)\bselect\b").expect("valid regex");
    static ref FROM_RE: Regex = Regex::new(r"(?i)\bfrom\b").expect("valid regex");
    static ref MODIFIER_RE: Regex = Regex::new(r"(?i)^\s*(distinct|all)\b").expect("valid regex");
    static ref DEFAULT_REWRITER: QueryRewriter = QueryRewriter::new(DEFAULT_SEPARATOR).expect("valid separator");
}

/// Both halves of a rewritten mixed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenQuery {
    pub predicate: RelationalPredicate,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct QueryRewriter {
    separator: Regex,
}

impl QueryRewriter {
    /// Rewriter splitting on `separator`, matched case-insensitively as a whole word.
    pub fn new(separator: &str) -> Result<Self> {
        let word = separator.trim();
        if word.is_empty() || word.chars().any(char::is_whitespace) {
            return Err(EngineError::Config(format!("invalid separator `{separator}`")));
        }
        let separator = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))
            .map_err(|e| EngineError::Config(format!("invalid separator `{word}`: {e}")))?;
        Ok(Self { separator })
    }

    /// Split on the first separator. The text half is empty when there is no separator.
    pub fn split(&self, mixed: &str) -> (String, String) {
        match self.separator.find(mixed) {
            Some(m) => (mixed[..m.start()].trim().to_string(), mixed[m.end()..].trim().to_string()),
            None => (mixed.trim().to_string(), String::new()),
        }
    }

    pub fn rewrite(&self, mixed: &str, key: &str) -> Result<RewrittenQuery> {
        let (relational, text) = self.split(mixed);
        let clause = ensure_key_projected(&relational, key)?;
        Ok(RewrittenQuery { predicate: RelationalPredicate::new(clause, key), text })
    }
}

impl Default for QueryRewriter {
    fn default() -> Self {
        DEFAULT_REWRITER.clone()
    }
}

/// Split with the default `WITH` separator.
pub fn split(mixed: &str) -> (String, String) {
    DEFAULT_REWRITER.split(mixed)
}

fn ambiguity(key: &str, reason: &str) -> EngineError {
    EngineError::RewriteAmbiguity { key: key.to_string(), reason: reason.to_string() }
}

fn projects(projection: &str, key: &str) -> bool {
    projection.split(',').any(|item| {
        let item = item.trim();
        if item == "*" || item.ends_with(".*") {
            return true;
        }
        item.split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .any(|ident| ident.eq_ignore_ascii_case(key))
    })
}

/// Return `clause` unchanged when its projection already mentions `key` (or `*`),
/// otherwise inject `key` as the first projected column.
pub fn ensure_key_projected(clause: &str, key: &str) -> Result<String> {
    let mut selects = SELECT_RE.find_iter(clause);
    let Some(select) = selects.next() else {
        return Err(ambiguity(key, "no SELECT keyword in relational clause"));
    };
    let nested = selects.next().is_some();

    let mut list_start = select.end();
    if let Some(modifier) = MODIFIER_RE.find(&clause[list_start..]) {
        list_start += modifier.end();
    }
    let list_end = FROM_RE.find_at(clause, list_start).map(|m| m.start()).unwrap_or(clause.len());
    let projection = &clause[list_start..list_end];

    if projects(projection, key) {
        return Ok(clause.to_string());
    }
    if nested {
        return Err(ambiguity(key, "clause holds several SELECT keywords; subqueries are not rewritten"));
    }
    if projection.trim().is_empty() {
        return Err(ambiguity(key, "empty projection list"));
    }
    Ok(format!("{} {}, {}", &clause[..list_start], key, clause[list_start..].trim_start()))
}
