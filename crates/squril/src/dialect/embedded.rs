//! SQLite (json1) dialect: `json_extract`, `json_tree`, `json_patch`.

use crate::ast::SelectTerm;
use crate::ast::term::{AggregateFn, SetTerm};
use crate::dialect::{ColContext, ColTarget, Dialect, col_target};
use crate::error::{SqurilError, SqurilResult};

#[derive(Debug, Default)]
pub struct EmbeddedDialect;

impl EmbeddedDialect {
    fn apply_function(&self, term: &SelectTerm, selection: String) -> (String, bool) {
        let Some(aggregate) = term.aggregate else {
            return (selection, false);
        };
        if aggregate == AggregateFn::Count && (term.path_text == "*" || term.path_text == "1") {
            return (format!("{}(1)", aggregate.sql_name()), true);
        }
        (format!("{}({selection})", aggregate.sql_name()), true)
    }
}

impl Dialect for EmbeddedDialect {
    fn json_array_sql(&self) -> &'static str {
        "json_array"
    }

    fn key_selection(&self, term: &SelectTerm) -> (String, bool) {
        let selection = format!("json_extract(data, '$.{}')", term.path_text);
        self.apply_function(term, selection)
    }

    fn array_selection(&self, term: &SelectTerm, _index: u64) -> (String, bool) {
        let selection = format!("json_extract(data, '$.{}')", term.path_text);
        self.apply_function(term, selection)
    }

    fn array_sub_selection(&self, table_name: &str, term: &SelectTerm) -> (String, bool) {
        use crate::ast::SelectElement;

        let last = term.elements.last().expect("non-empty path checked by caller");
        let (fullkey, vals, sub_keys): (String, &str, &[String]) = match last {
            SelectElement::ArraySpecificSingle { index, sub_key, .. } => (
                format!("and fullkey = '$.{}[{index}]'", term.bare_term),
                "vals",
                std::slice::from_ref(sub_key),
            ),
            SelectElement::ArraySpecificMultiple { index, sub_keys, .. } => (
                format!("and fullkey = '$.{}[{index}]'", term.bare_term),
                "vals",
                sub_keys.as_slice(),
            ),
            SelectElement::ArrayBroadcastSingle { sub_key, .. } => {
                (String::new(), "json_group_array(vals)", std::slice::from_ref(sub_key))
            }
            SelectElement::ArrayBroadcastMultiple { sub_keys, .. } => {
                (String::new(), "json_group_array(vals)", sub_keys.as_slice())
            }
            _ => unreachable!("array_sub_selection called on non-sub-selection element"),
        };

        let extracted: Vec<String> = sub_keys
            .iter()
            .map(|key| format!("json_extract(value, '$.{key}')"))
            .collect();
        let sub_selections = if extracted.len() > 1 {
            format!("json_array({})", extracted.join(","))
        } else {
            extracted.join(",")
        };

        let selection = format!(
            "(case when json_extract(data, '$.{bare}') is not null then ( \
                select {vals} from ( \
                    select {sub_selections} as vals from ( \
                        select key, value, fullkey, path \
                        from {table_name}, json_tree({table_name}.data) \
                        where path = '$.{bare}' {fullkey} \
                    ) \
                ) \
            ) else null end)",
            bare = term.bare_term,
        );
        self.apply_function(term, selection)
    }

    fn column_ref(&self, select_term: &SelectTerm, ctx: ColContext<'_>) -> SqurilResult<String> {
        let target = match col_target(select_term)? {
            ColTarget::FullWithIndex(path) => path,
            ColTarget::ArraySingle { key, index, sub_key } => format!("{key}[{index}].{sub_key}"),
            ColTarget::Bare(path) => path,
        };
        let mut col = format!("json_extract(data, '$.{target}')");
        if let ColContext::Where { op, .. } = ctx {
            if op == "eq" || op == "neq" {
                col = format!("cast ({col} as text)");
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
                let patch = serde_json::to_string(&serde_json::json!({ key: value }))?.replace('\'', "''");
                Ok(format!("set data = json_patch(data, '{patch}')"))
            }
            SetTerm::Remove { key } => Ok(format!("set data = json_remove(data, '$.{key}')")),
            SetTerm::ReplaceAll => {
                let replacement = serde_json::to_string(data)?.replace('\'', "''");
                Ok(format!("set data = '{replacement}'"))
            }
        }
    }

    fn select_with_retention(&self, table_name: &str, backup_cutoff: &str) -> String {
        format!(
            "(select * from {table_name} where json_extract(data, '$.timestamp') >= '{backup_cutoff}')a"
        )
    }

    fn array_agg(&self, query: &str) -> String {
        format!("select json_group_array(data) from ({query})")
    }

    fn maybe_float(&self, val: &str) -> String {
        match val.parse::<f64>() {
            Ok(parsed) if parsed.to_string() == val => val.to_string(),
            _ => format!("'{val}'"),
        }
    }
}
