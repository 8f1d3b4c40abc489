//! Turns a parsed [`UriQuery`] plus a chosen [`Dialect`] into executable SQL.

use std::collections::BTreeSet;

use crate::ast::UriQuery;
use crate::ast::term::{Combinator, SelectTerm, WhereTerm};
use crate::dialect::{ColContext, Dialect, term_to_sql_select};
use crate::error::SqurilResult;

/// A fully generated set of SQL statements for one query, plus whether its
/// select clause used an aggregate function (callers use this to decide
/// whether to wrap the result in an array-aggregate).
pub struct GeneratedSql {
    pub select_query: String,
    pub update_queries: Vec<String>,
    pub delete_query: String,
    pub alter_query: Option<String>,
    pub has_aggregate: bool,
}

const OPERATORS: &[(&str, &str)] = &[
    ("eq", "="),
    ("gt", ">"),
    ("gte", ">="),
    ("lt", "<"),
    ("lte", "<="),
    ("neq", "!="),
    ("like", "like"),
    ("ilike", "ilike"),
    ("not", "not"),
    ("is", "is"),
    ("in", "in"),
];

fn sql_operator(op: &str) -> SqurilResult<&'static str> {
    OPERATORS
        .iter()
        .find(|(name, _)| *name == op)
        .map(|(_, sql)| *sql)
        .ok_or_else(|| crate::error::SqurilError::parse(format!("unsupported operator `{op}`")))
}

pub fn generate(
    dialect: &dyn Dialect,
    table_name: &str,
    query: &UriQuery,
    data: Option<&serde_json::Value>,
    backup_cutoff: Option<&str>,
    array_agg: bool,
    table_name_func: Option<&dyn Fn(&str) -> String>,
) -> SqurilResult<GeneratedSql> {
    let mut has_aggregate = false;

    let select_query = select_clause(dialect, table_name, query, backup_cutoff, &mut has_aggregate)?;
    let select_query = if array_agg && !has_aggregate {
        dialect.array_agg(&select_query)
    } else {
        select_query
    };

    let update_queries = update_clause(dialect, table_name, query, data)?;
    let delete_query = delete_clause(dialect, table_name, query)?;
    let alter_query = alter_clause(table_name, query, table_name_func);

    Ok(GeneratedSql {
        select_query,
        update_queries,
        delete_query,
        alter_query,
        has_aggregate,
    })
}

fn select_clause(
    dialect: &dyn Dialect,
    table_name: &str,
    query: &UriQuery,
    backup_cutoff: Option<&str>,
    has_aggregate: &mut bool,
) -> SqurilResult<String> {
    let table_reference = match backup_cutoff {
        Some(cutoff) => dialect.select_with_retention(table_name, cutoff),
        None => table_name.to_string(),
    };

    let select_sql = if query.select.is_empty() {
        format!("select data from {table_reference}")
    } else {
        let mut parts = Vec::with_capacity(query.select.len());
        for term in &query.select {
            let (sql, aggregated) = term_to_sql_select(dialect, table_name, term)?;
            *has_aggregate |= aggregated;
            parts.push(sql);
        }
        format!(
            "select {}({}) data from {table_reference}",
            dialect.json_array_sql(),
            parts.join(",")
        )
    };

    let where_sql = where_clause(dialect, &query.where_)?;
    let order_sql = order_clause(dialect, &query.order)?;
    let range_sql = range_clause(&query.range);
    let group_by_sql = group_by_clause(dialect, table_name, &query.group_by)?;

    Ok(format!(
        "{select_sql} {where_sql} {order_sql} {group_by_sql} {range_sql}"
    ))
}

fn where_clause(dialect: &dyn Dialect, terms: &[WhereTerm]) -> SqurilResult<String> {
    if terms.is_empty() {
        return Ok(String::new());
    }
    let mut rendered = Vec::with_capacity(terms.len());
    for term in terms {
        rendered.push(where_term_to_sql(dialect, term)?);
    }
    Ok(format!("where {}", rendered.join(" ")))
}

fn where_term_to_sql(dialect: &dyn Dialect, term: &WhereTerm) -> SqurilResult<String> {
    let groups_start = "(".repeat(term.groups_open as usize);
    let groups_end = ")".repeat(term.groups_close as usize);
    let combinator = term
        .combinator
        .map(Combinator::as_sql)
        .unwrap_or_default();
    let col = dialect.column_ref(
        &term.select_term,
        ColContext::Where {
            op: &term.op,
            val: &term.value,
        },
    )?;

    let mut op = term.op.clone();
    let mut val = term.value.clone();

    let looks_integer = val.parse::<i64>().is_ok();
    if looks_integer {
        if op == "eq" || op == "neq" {
            val = format!("'{val}'");
        }
    } else if val == "null" || op == "in" {
        // left as-is
    } else {
        val = dialect.maybe_float(&val);
    }

    if op.ends_with(".not") || op.starts_with("not.") {
        op = op.replace('.', " ");
    } else if op == "in" {
        let inner = val.trim_start_matches('[').trim_end_matches(']');
        let quoted: Vec<String> = inner.split(',').map(|v| format!("'{v}'")).collect();
        val = format!("({})", quoted.join(","));
    } else {
        op = sql_operator(&op)?.to_string();
    }

    if op.contains("like") {
        val = val.replace('*', "%");
    }

    Ok(format!("{groups_start} {combinator} {col} {op} {val} {groups_end}"))
}

fn order_clause(dialect: &dyn Dialect, terms: &[crate::ast::term::OrderTerm]) -> SqurilResult<String> {
    let Some(term) = terms.first() else {
        return Ok(String::new());
    };
    let col = dialect.column_ref(&term.select_term, ColContext::Order)?;
    let direction = if term.descending { "desc" } else { "asc" };
    Ok(format!("order by {col} {direction}"))
}

fn range_clause(range: &Option<crate::ast::term::RangeTerm>) -> String {
    match range {
        Some(range) => format!("limit {} offset {}", range.end, range.start),
        None => String::new(),
    }
}

fn group_by_clause(dialect: &dyn Dialect, table_name: &str, terms: &[SelectTerm]) -> SqurilResult<String> {
    if terms.is_empty() {
        return Ok(String::new());
    }
    let mut cols = Vec::with_capacity(terms.len());
    for term in terms {
        let (sql, _) = term_to_sql_select(dialect, table_name, term)?;
        cols.push(sql);
    }
    Ok(format!("group by {}", cols.join(",")))
}

fn update_clause(
    dialect: &dyn Dialect,
    table_name: &str,
    query: &UriQuery,
    data: Option<&serde_json::Value>,
) -> SqurilResult<Vec<String>> {
    if query.set.is_empty() {
        return Ok(Vec::new());
    }
    let data = data.ok_or_else(|| {
        crate::error::SqurilError::parse("a set clause requires an update payload")
    })?;
    let where_sql = where_clause(dialect, &query.where_)?;

    let mut expressions = BTreeSet::new();
    for term in &query.set {
        expressions.insert(dialect.update_expression(term, data)?);
    }

    Ok(expressions
        .into_iter()
        .map(|expr| format!("update {table_name} {expr} {where_sql}; "))
        .collect())
}

fn delete_clause(dialect: &dyn Dialect, table_name: &str, query: &UriQuery) -> SqurilResult<String> {
    if query.where_.is_empty() {
        Ok(format!("drop table {table_name}"))
    } else {
        let where_sql = where_clause(dialect, &query.where_)?;
        Ok(format!("delete from {table_name} {where_sql}"))
    }
}

fn alter_clause(table_name: &str, query: &UriQuery, table_name_func: Option<&dyn Fn(&str) -> String>) -> Option<String> {
    let alter = query.alter.as_ref()?;
    let new_name = match table_name_func {
        Some(f) => f(&alter.new_name),
        None => alter.new_name.clone(),
    };
    Some(format!("alter table {table_name} rename to {new_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::EmbeddedDialect;

    fn parse(q: &str) -> UriQuery {
        crate::parser::parse("t", q).unwrap()
    }

    #[test]
    fn select_wildcard_has_no_projection() {
        let dialect = EmbeddedDialect;
        let query = parse("");
        let sql = generate(&dialect, "t", &query, None, None, false, None).unwrap();
        assert!(sql.select_query.contains("select data from t"));
    }

    #[test]
    fn select_with_where_and_order() {
        let dialect = EmbeddedDialect;
        let query = parse("select=a,b&where=a=eq.1&order=a.asc&range=0.5");
        let sql = generate(&dialect, "t", &query, None, None, false, None).unwrap();
        assert!(sql.select_query.contains("json_array"));
        assert!(sql.select_query.contains("where"));
        assert!(sql.select_query.contains("order by"));
        assert!(sql.select_query.contains("limit 5 offset 0"));
    }

    #[test]
    fn delete_without_where_drops_table() {
        let dialect = EmbeddedDialect;
        let query = parse("");
        let sql = delete_clause(&dialect, "t", &query).unwrap();
        assert_eq!(sql, "drop table t");
    }

    #[test]
    fn update_requires_payload() {
        let dialect = EmbeddedDialect;
        let query = parse("set=a&where=id=eq.1");
        let err = update_clause(&dialect, "t", &query, None).unwrap_err();
        assert!(err.to_string().contains("payload"));
    }

    #[test]
    fn update_with_payload_uses_json_patch() {
        let dialect = EmbeddedDialect;
        let query = parse("set=a&where=id=eq.1");
        let data = serde_json::json!({"a": 1});
        let queries = update_clause(&dialect, "t", &query, Some(&data)).unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("json_patch"));
    }
}
