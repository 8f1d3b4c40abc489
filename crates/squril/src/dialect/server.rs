//! PostgreSQL (jsonb) dialect: `#>`/`#>>` path operators, `jsonb_set`.

use crate::ast::SelectTerm;
use crate::ast::term::{AggregateFn, SetTerm};
use crate::dialect::{ColContext, ColTarget, Dialect, col_target};
use crate::error::{SqurilError, SqurilResult};

#[derive(Debug, Default)]
pub struct ServerDialect;

impl ServerDialect {
    /// `a.b` -> `a,b` — postgres path arrays are comma-separated.
    fn select_target(path: &str) -> String {
        path.replace('.', ",")
    }

    fn apply_function(&self, term: &SelectTerm, selection: String) -> (String, bool) {
        let Some(aggregate) = term.aggregate else {
            return (selection, false);
        };
        if aggregate == AggregateFn::Count && (term.path_text == "*" || term.path_text == "1") {
            return (format!("{}(1)", aggregate.sql_name()), true);
        }
        let selection = match aggregate {
            AggregateFn::Avg | AggregateFn::Sum | AggregateFn::Min | AggregateFn::Max => {
                format!("({selection})::int")
            }
            _ => selection,
        };
        (format!("{}({selection})", aggregate.sql_name()), true)
    }
}

impl Dialect for ServerDialect {
    fn json_array_sql(&self) -> &'static str {
        "jsonb_build_array"
    }

    fn key_selection(&self, term: &SelectTerm) -> (String, bool) {
        let target = Self::select_target(&term.path_text);
        let selector = if term.aggregate.is_none() { "#>" } else { "#>>" };
        let selection = format!("{selector}'{{{target}}}'");
        let selection = format!("data{selection}");
        self.apply_function(term, selection)
    }

    fn array_selection(&self, term: &SelectTerm, index: u64) -> (String, bool) {
        let target = Self::select_target(&term.bare_term);
        let indexer = if term.aggregate.is_none() { "->" } else { "->>" };
        let selection = format!(
            "case when data#>'{{{target}}}'{indexer}{index} is not null then \
             data#>'{{{target}}}'{indexer}{index} else null end"
        );
        self.apply_function(term, selection)
    }

    fn array_sub_selection(&self, _table_name: &str, term: &SelectTerm) -> (String, bool) {
        use crate::ast::SelectElement;

        let last = term.elements.last().expect("non-empty path checked by caller");
        let target = Self::select_target(&term.bare_term);
        let (sub_keys, index): (&[String], Option<u64>) = match last {
            SelectElement::ArraySpecificSingle { index, sub_key, .. } => {
                (std::slice::from_ref(sub_key), Some(*index))
            }
            SelectElement::ArraySpecificMultiple { index, sub_keys, .. } => (sub_keys.as_slice(), Some(*index)),
            SelectElement::ArrayBroadcastSingle { sub_key, .. } => (std::slice::from_ref(sub_key), None),
            SelectElement::ArrayBroadcastMultiple { sub_keys, .. } => (sub_keys.as_slice(), None),
            _ => unreachable!("array_sub_selection called on non-sub-selection element"),
        };
        let sub_selections = sub_keys.join(",");
        let mut data_selection_expr = format!("filter_array_elements(data#>'{{{target}}}','{{{sub_selections}}}')");
        if let Some(index) = index {
            data_selection_expr = format!("{data_selection_expr}->{index}");
        }
        let selection = format!(
            "case when data#>'{{{target}}}' is not null and jsonb_typeof(data#>'{{{target}}}') = 'array' \
             then {data_selection_expr} else null end"
        );
        self.apply_function(term, selection)
    }

    fn column_ref(&self, select_term: &SelectTerm, ctx: ColContext<'_>) -> SqurilResult<String> {
        let final_op = match ctx {
            ColContext::Where { .. } => "#>>",
            ColContext::Order => "#>",
        };
        let mut col = match col_target(select_term)? {
            ColTarget::FullWithIndex(path) => {
                let target = Self::select_target(&select_term.bare_term);
                let index = path
                    .rsplit_once('[')
                    .and_then(|(_, rest)| rest.strip_suffix(']'))
                    .unwrap_or_default();
                format!("data#>'{{{target}}}'{final_op}'{{{index}}}'")
            }
            ColTarget::ArraySingle { key, index, sub_key } => {
                let target = Self::select_target(&key);
                format!("data#>'{{{target}}}'#>'{{{index}}}'#>'{{{sub_key}}}'")
            }
            ColTarget::Bare(path) => {
                let target = Self::select_target(&path);
                format!("data{final_op}'{{{target}}}'")
            }
        };
        if let ColContext::Where { op, val } = ctx {
            let integer_ops = ["gt", "gte", "lt", "lte"];
            if let Ok(parsed) = val.parse::<i64>() {
                let is_float_text = val.parse::<f64>().map(|f| f.to_string() == val).unwrap_or(false);
                if integer_ops.contains(&op) && !is_float_text {
                    col = format!("({col})::int");
                } else if val.parse::<f64>().map(|f| f.to_string() == val).unwrap_or(false) {
                    col = format!("({col})::real");
                }
                let _ = parsed;
            }
        }
        Ok(col)
    }

    fn update_expression(&self, term: &SetTerm, data: &serde_json::Value) -> SqurilResult<String> {
        match term {
            SetTerm::Assign { .. } => {
                let key = term
                    .top_level_key()
                    .expect("Assign always has a top-level key");
                let value = data
                    .get(key)
                    .ok_or_else(|| SqurilError::parse(format!("target key of update `{key}` not found in payload")))?;
                let encoded = serde_json::to_string(value)?.replace('\'', "''");
                Ok(format!("set data = jsonb_set(data, '{{{key}}}', ('{encoded}')::jsonb)"))
            }
            SetTerm::Remove { key } => Ok(format!("set data = data - '{key}'")),
            SetTerm::ReplaceAll => {
                let encoded = serde_json::to_string(data)?.replace('\'', "''");
                Ok(format!("set data = '{encoded}'::jsonb"))
            }
        }
    }

    fn select_with_retention(&self, table_name: &str, backup_cutoff: &str) -> String {
        format!("(select * from {table_name} where data->>'timestamp' >= '{backup_cutoff}')a")
    }

    fn array_agg(&self, query: &str) -> String {
        format!("select json_agg(data) from ({query})a")
    }

    fn maybe_float(&self, val: &str) -> String {
        format!("'{val}'")
    }
}
