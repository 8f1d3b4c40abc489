//! The parsed representation of one SQURIL URI query.

use crate::ast::term::{
    AlterTerm, GroupByTerm, OrderTerm, RangeTerm, SelectTerm, SetTerm, WhereTerm,
};
use crate::error::SqurilResult;

/// A fully parsed SQURIL query, independent of any SQL dialect.
///
/// Construction (via [`crate::parser::parse`]) guarantees the clause
/// combination is internally consistent — e.g. `group_by` is never paired
/// with `order`, and a `restore` query never carries `set`.
#[derive(Debug, Clone, Default)]
pub struct UriQuery {
    /// The table name this query targets, before any rename (`alter=`)
    /// is applied.
    pub table: String,

    pub select: Vec<SelectTerm>,
    pub where_: Vec<WhereTerm>,
    pub order: Vec<OrderTerm>,
    pub range: Option<RangeTerm>,
    pub set: Vec<SetTerm>,
    pub group_by: Vec<GroupByTerm>,
    pub alter: Option<AlterTerm>,

    /// `message=` — a caller-supplied note stored on the audit event this
    /// query produces.
    pub message: Option<String>,

    /// `primary_key=` — a dotted sequence of plain object keys (never
    /// array/broadcast syntax) locating the value a restore diffs on.
    pub primary_key: Vec<String>,

    /// Whether this is a restore request (`set=restore`, recognized by the
    /// parser before term-splitting since it is the literal clause value).
    pub restore: bool,
}

impl UriQuery {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_aggregate(&self) -> bool {
        self.select.iter().any(|term| term.aggregate.is_some())
    }

    #[must_use]
    pub fn is_wildcard_select(&self) -> bool {
        self.select.is_empty()
    }

    /// The primary-key path as a dotted string, for error messages.
    #[must_use]
    pub fn primary_key_path(&self) -> String {
        self.primary_key.join(".")
    }

    /// Look up a primary-key value inside a document by walking
    /// [`Self::primary_key`] one plain key at a time.
    #[must_use]
    pub fn primary_key_value<'a>(&self, document: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        let mut current = document;
        for key in &self.primary_key {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }

    pub fn validate(&self) -> SqurilResult<()> {
        use crate::error::SqurilError;

        if !self.group_by.is_empty() && !self.order.is_empty() {
            return Err(SqurilError::parse(
                "group_by and order cannot be combined in the same query",
            ));
        }
        if !self.group_by.is_empty() {
            let selected: Vec<&str> = self.select.iter().map(|t| t.bare_term.as_str()).collect();
            for term in &self.group_by {
                if !selected.contains(&term.bare_term.as_str()) {
                    return Err(SqurilError::parse(format!(
                        "group_by key `{}` must also appear in select",
                        term.raw
                    )));
                }
            }
        }
        if self.restore && !self.set.is_empty() {
            return Err(SqurilError::parse(
                "restore queries cannot also carry a set clause",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primary_key_value_walks_nested_keys() {
        let mut query = UriQuery::new("t");
        query.primary_key = vec!["a".into(), "b".into()];
        let doc = json!({"a": {"b": 42}});
        assert_eq!(query.primary_key_value(&doc), Some(&json!(42)));
    }

    #[test]
    fn validate_rejects_group_by_with_order() {
        let mut query = UriQuery::new("t");
        query.group_by = vec![SelectTerm::parse("a").unwrap()];
        query.order = vec![OrderTerm::parse("a.asc").unwrap()];
        assert!(query.validate().is_err());
    }
}
