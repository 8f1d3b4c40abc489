//! Per-backend SQL generation rules.
//!
//! [`Dialect`] captures everything that differs between the embedded
//! (SQLite + json1) and server (PostgreSQL + jsonb) backends: how to reach
//! into a JSON document, how to update one key of it, and how to express
//! retention and array-aggregation. The generator in [`crate::generator`]
//! is otherwise dialect-agnostic.

pub mod embedded;
pub mod server;

pub use embedded::EmbeddedDialect;
pub use server::ServerDialect;

use crate::ast::SelectTerm;
use crate::ast::term::SetTerm;
use crate::error::SqurilResult;

/// Why a column reference is being generated — where/order clauses need a
/// plain value extraction, where clauses additionally need type coercion
/// tailored to the comparison operator and literal.
#[derive(Debug, Clone, Copy)]
pub enum ColContext<'a> {
    Where { op: &'a str, val: &'a str },
    Order,
}

/// Dialect-specific SQL fragment generation for one backend.
pub trait Dialect: Send + Sync {
    /// The function used to wrap multiple select expressions into one row
    /// (`json_array` for SQLite, `jsonb_build_array` for PostgreSQL).
    fn json_array_sql(&self) -> &'static str;

    /// Generate the expression selecting a plain key, applying an
    /// aggregate function if the term carries one. Returns the SQL
    /// fragment and whether an aggregate was applied.
    fn key_selection(&self, term: &SelectTerm) -> (String, bool);

    /// Generate the expression selecting `name[N]`.
    fn array_selection(&self, term: &SelectTerm, index: u64) -> (String, bool);

    /// Generate the expression selecting `name[N|k]`, `name[N|k1,k2]`,
    /// `name[*|k]`, or `name[*|k1,k2]`.
    fn array_sub_selection(&self, table_name: &str, term: &SelectTerm) -> (String, bool);

    /// Generate a column reference for a where/order clause.
    fn column_ref(&self, select_term: &SelectTerm, ctx: ColContext<'_>) -> SqurilResult<String>;

    /// Generate the `set data = ...` fragment of an update statement for
    /// one set term, given the full update payload.
    fn update_expression(&self, term: &SetTerm, data: &serde_json::Value) -> SqurilResult<String>;

    /// Wrap a table reference with a retention cutoff on the `timestamp`
    /// key, for audit-table reads bounded by `backup_days`.
    fn select_with_retention(&self, table_name: &str, backup_cutoff: &str) -> String;

    /// Wrap a select query so its rows are aggregated into one JSON array.
    fn array_agg(&self, query: &str) -> String;

    /// Render a where-clause literal that looks numeric as a float if it
    /// round-trips cleanly, else quote it as text.
    fn maybe_float(&self, val: &str) -> String;
}

/// Select the term's last path element and dispatch to the matching
/// generation method — the original generator's effective rule once its
/// "process parsed elements in reverse, first one wins" loop is simplified.
pub fn term_to_sql_select(dialect: &dyn Dialect, table_name: &str, term: &SelectTerm) -> SqurilResult<(String, bool)> {
    use crate::ast::SelectElement;

    let last = term
        .elements
        .last()
        .ok_or_else(|| crate::error::SqurilError::parse(format!("empty select term `{}`", term.raw)))?;

    Ok(match last {
        SelectElement::Key { .. } => dialect.key_selection(term),
        SelectElement::ArraySpecific { index, .. } => dialect.array_selection(term, *index),
        SelectElement::ArraySpecificSingle { .. }
        | SelectElement::ArraySpecificMultiple { .. }
        | SelectElement::ArrayBroadcastSingle { .. }
        | SelectElement::ArrayBroadcastMultiple { .. } => dialect.array_sub_selection(table_name, term),
    })
}

/// The dotted path to use when addressing a JSON document, mirroring the
/// original generator's `_gen_sql_col` target-selection rule: the last
/// element decides the addressing mode, earlier elements are along for the
/// ride as plain dotted-key prefixes.
pub enum ColTarget {
    /// Address the whole path including a trailing `[N]` index.
    FullWithIndex(String),
    /// Address `key[N].sub_key` (an array-specific single sub-selection).
    ArraySingle { key: String, index: u64, sub_key: String },
    /// Address a plain dotted key (also used, faithfully, for broadcast
    /// sub-selections in where/order position — those ignore sub-keys).
    Bare(String),
}

pub fn col_target(select_term: &SelectTerm) -> SqurilResult<ColTarget> {
    use crate::ast::SelectElement;

    if select_term.elements.len() > 1 {
        return Ok(match select_term.elements.last() {
            Some(SelectElement::ArraySpecific { .. }) => ColTarget::FullWithIndex(select_term.path_text.clone()),
            Some(SelectElement::ArraySpecificSingle { index, sub_key, .. }) => ColTarget::ArraySingle {
                key: select_term.bare_term.clone(),
                index: *index,
                sub_key: sub_key.clone(),
            },
            _ => ColTarget::Bare(select_term.bare_term.clone()),
        });
    }
    match select_term.elements.first() {
        Some(element @ crate::ast::SelectElement::Key { .. }) => Ok(ColTarget::Bare(element.raw().to_string())),
        _ => Err(crate::error::SqurilError::parse(format!(
            "invalid term `{}`",
            select_term.raw
        ))),
    }
}
