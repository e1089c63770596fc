//! Parser for the text half of a mixed query.
//!
//! Grammar: whitespace separated clauses. A clause is a bare word or a `"quoted phrase"`,
//! optionally prefixed with `+` (required) or `-` (prohibited). `AND` makes both of its
//! neighbours required, `NOT` prohibits the next clause, `OR` is the default and does
//! nothing. Parentheses are rejected: grouping is not supported.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Should,
    Must,
    MustNot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub occur: Occur,
    /// Raw, unanalyzed text of the word or phrase.
    pub text: String,
    pub phrase: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextQuery {
    pub clauses: Vec<Clause>,
}

impl TextQuery {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word { text: String, prefix: Option<char>, phrase: bool },
    And,
    Or,
    Not,
}

fn parse_error(offset: usize, reason: &str) -> EngineError {
    EngineError::TextQueryParse { offset, reason: reason.to_string() }
}

fn lex(input: &str) -> Result<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '(' || c == ')' {
            return Err(parse_error(start, "grouping with parentheses is not supported"));
        }
        let mut prefix = None;
        if c == '+' || c == '-' {
            prefix = Some(c);
            chars.next();
            match chars.peek() {
                Some(&(_, n)) if !n.is_whitespace() && n != '+' && n != '-' => {}
                _ => return Err(parse_error(start, "operator prefix without a clause")),
            }
        }
        let Some(&(body_start, first)) = chars.peek() else { break };
        if first == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            for (_, ch) in chars.by_ref() {
                if ch == '"' {
                    closed = true;
                    break;
                }
                text.push(ch);
            }
            if !closed {
                return Err(parse_error(body_start, "unterminated phrase"));
            }
            if text.trim().is_empty() {
                return Err(parse_error(body_start, "empty phrase"));
            }
            tokens.push((start, Token::Word { text, prefix, phrase: true }));
            continue;
        }
        let mut text = String::new();
        while let Some(&(_, ch)) = chars.peek() {
            if ch.is_whitespace() || ch == '"' || ch == '(' || ch == ')' {
                break;
            }
            text.push(ch);
            chars.next();
        }
        let token = match (prefix, text.as_str()) {
            (None, "AND") => Token::And,
            (None, "OR") => Token::Or,
            (None, "NOT") => Token::Not,
            _ => Token::Word { text, prefix, phrase: false },
        };
        tokens.push((start, token));
    }
    Ok(tokens)
}

/// Parse a text clause. Empty or blank input yields an empty query.
pub fn parse(input: &str) -> Result<TextQuery> {
    let tokens = lex(input)?;
    let mut clauses: Vec<Clause> = Vec::new();
    let mut pending_not = false;
    let mut pending_and = false;
    let mut last_offset = 0;

    for (offset, token) in tokens {
        last_offset = offset;
        match token {
            Token::And => {
                if clauses.is_empty() || pending_and || pending_not {
                    return Err(parse_error(offset, "AND needs a clause on both sides"));
                }
                if let Some(prev) = clauses.last_mut() {
                    if prev.occur == Occur::Should {
                        prev.occur = Occur::Must;
                    }
                }
                pending_and = true;
            }
            Token::Or => {
                if clauses.is_empty() || pending_and || pending_not {
                    return Err(parse_error(offset, "OR needs a clause on both sides"));
                }
            }
            Token::Not => {
                if pending_not {
                    return Err(parse_error(offset, "NOT cannot be repeated"));
                }
                pending_not = true;
            }
            Token::Word { text, prefix, phrase } => {
                let mut occur = match prefix {
                    Some('+') => Occur::Must,
                    Some('-') => Occur::MustNot,
                    _ => Occur::Should,
                };
                if pending_not {
                    occur = Occur::MustNot;
                } else if pending_and && occur == Occur::Should {
                    occur = Occur::Must;
                }
                pending_not = false;
                pending_and = false;
                clauses.push(Clause { occur, text, phrase });
            }
        }
    }
    if pending_and || pending_not {
        return Err(parse_error(last_offset, "dangling operator at end of query"));
    }
    Ok(TextQuery { clauses })
}
