//! Lexing and parsing of SQURIL URI queries into [`UriQuery`].
//!
//! A query string is a sequence of `&`-separated clauses:
//!
//! ```text
//! select=a,b&where=a=eq.1&order=a.asc&range=0.10
//! ```
//!
//! `&` inside a quoted where-value does not separate clauses, so splitting
//! is quote-aware rather than a plain [`str::split`].

use crate::ast::query::UriQuery;
use crate::ast::term::{AlterTerm, OrderTerm, RangeTerm, SelectTerm, SetTerm, WhereTerm};
use crate::error::SqurilResult;

/// Parse a full SQURIL URI query against the given table name.
pub fn parse(table: impl Into<String>, uri_query: &str) -> SqurilResult<UriQuery> {
    let clauses = split_clauses(uri_query);
    let mut query = UriQuery::new(table);

    for clause in &clauses {
        if clause.as_str() == "restore" {
            query.restore = true;
        } else if let Some(rest) = clause.strip_prefix("select=") {
            for term in split_terms(rest) {
                query.select.push(SelectTerm::parse(&term)?);
            }
        } else if let Some(rest) = clause.strip_prefix("where=") {
            for term in split_terms(rest) {
                query.where_.push(WhereTerm::parse(&term)?);
            }
        } else if let Some(rest) = clause.strip_prefix("order=") {
            for term in split_terms(rest) {
                query.order.push(OrderTerm::parse(&term)?);
            }
        } else if let Some(rest) = clause.strip_prefix("range=") {
            if let Some(term) = split_terms(rest).into_iter().next() {
                query.range = Some(RangeTerm::parse(&term)?);
            }
        } else if let Some(rest) = clause.strip_prefix("set=") {
            for term in split_terms(rest) {
                query.set.push(SetTerm::parse(&term)?);
            }
        } else if let Some(rest) = clause.strip_prefix("group_by=") {
            for term in split_terms(rest) {
                query.group_by.push(SelectTerm::parse_plain(&term)?);
            }
        } else if let Some(rest) = clause.strip_prefix("alter=") {
            query.alter = Some(AlterTerm::parse(rest)?);
        } else if let Some(rest) = clause.strip_prefix("message=") {
            query.message = Some(percent_decode(rest));
        } else if let Some(rest) = clause.strip_prefix("primary_key=") {
            query.primary_key = rest.split('.').map(str::to_string).collect();
        }
    }

    query.validate()?;
    Ok(query)
}

/// Split a query string on `&`, treating everything between an opening and
/// closing single quote as opaque (so a literal `&` inside a where-value
/// survives intact).
fn split_clauses(uri_query: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut is_quoted = false;
    let mut prev = None;
    for ch in uri_query.chars() {
        if ch == '\'' && prev != Some('\\') {
            is_quoted = !is_quoted;
        }
        if ch == '&' && !is_quoted {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
        prev = Some(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Split a clause's body on `,`, treating `[...]` and quoted spans as
/// opaque so a sub-selection list or a comma inside a quoted value does not
/// get split into separate terms.
fn split_terms(clause_body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0u32;
    let mut is_quoted = false;
    let mut prev = None;
    for ch in clause_body.chars() {
        if ch == '\'' && prev != Some('\\') {
            is_quoted = !is_quoted;
        }
        if !is_quoted {
            match ch {
                '[' => bracket_depth += 1,
                ']' => bracket_depth = bracket_depth.saturating_sub(1),
                _ => {}
            }
        }
        if ch == ',' && bracket_depth == 0 && !is_quoted {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
        prev = Some(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn percent_decode(raw: &str) -> String {
    percent_encoding::percent_decode_str(raw)
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select_and_where() {
        let query = parse("t", "select=a,b&where=a=eq.1").unwrap();
        assert_eq!(query.select.len(), 2);
        assert_eq!(query.where_.len(), 1);
    }

    #[test]
    fn ampersand_inside_quotes_does_not_split_clauses() {
        let query = parse("t", "where=a=eq.'x&y'&order=a.asc").unwrap();
        assert_eq!(query.where_.len(), 1);
        assert_eq!(query.where_[0].value, "x&y");
        assert_eq!(query.order.len(), 1);
    }

    #[test]
    fn comma_inside_brackets_does_not_split_terms() {
        let query = parse("t", "select=a[0|h,s],b").unwrap();
        assert_eq!(query.select.len(), 2);
    }

    #[test]
    fn detects_restore_flag() {
        let query = parse("t", "restore&where=transaction_id=eq.abc&primary_key=id").unwrap();
        assert!(query.restore);
        assert_eq!(query.primary_key, vec!["id".to_string()]);
    }

    #[test]
    fn rejects_group_by_not_in_select() {
        let err = parse("t", "select=a&group_by=b").unwrap_err();
        assert!(err.to_string().contains("group_by"));
    }

    #[test]
    fn decodes_message() {
        let query = parse("t", "message=hello%20world").unwrap();
        assert_eq!(query.message.as_deref(), Some("hello world"));
    }
}
