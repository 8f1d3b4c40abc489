//! Clause terms: the parsed shape of one comma-separated item inside a
//! `select=`, `where=`, `order=`, `range=`, `set=`, `group_by=`, or
//! `alter=` clause.

use crate::ast::element::{SelectElement, parse_path};
use crate::error::{SqurilError, SqurilResult};

/// Aggregate functions a select term may be wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Avg,
    Sum,
    Min,
    Max,
    MinTs,
    MaxTs,
}

impl AggregateFn {
    const ALL: &'static [(&'static str, Self)] = &[
        ("count", Self::Count),
        ("avg", Self::Avg),
        ("sum", Self::Sum),
        ("min", Self::Min),
        ("max", Self::Max),
        ("min_ts", Self::MinTs),
        ("max_ts", Self::MaxTs),
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, variant)| *variant == self)
            .map(|(name, _)| *name)
            .expect("every variant is listed in ALL")
    }

    /// The underlying SQL aggregate name, with the `_ts` suffix (a cosmetic
    /// marker meaning "this aggregates a timestamp-shaped value") stripped.
    #[must_use]
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Min | Self::MinTs => "min",
            Self::Max | Self::MaxTs => "max",
        }
    }
}

/// A select term: an optional aggregate wrapper around a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectTerm {
    /// The term exactly as given by the caller, aggregate wrapper included.
    pub raw: String,
    /// The dotted path text, aggregate wrapper stripped (what the original
    /// implementation calls `term.original`).
    pub path_text: String,
    /// `path_text` truncated at the first `[`, used to name the bare target
    /// of a sub-selection.
    pub bare_term: String,
    pub elements: Vec<SelectElement>,
    pub aggregate: Option<AggregateFn>,
}

impl SelectTerm {
    pub fn parse(raw: &str) -> SqurilResult<Self> {
        Self::parse_with(raw, true)
    }

    /// Parse without permitting an aggregate wrapper — used by `group_by=`,
    /// which forbids aggregates on its terms.
    pub fn parse_plain(raw: &str) -> SqurilResult<Self> {
        for (name, _) in AggregateFn::ALL {
            if raw.starts_with(&format!("{name}(")) {
                return Err(SqurilError::parse(
                    "group_by keys cannot contain functions",
                ));
            }
        }
        Self::parse_with(raw, false)
    }

    fn parse_with(raw: &str, allow_aggregate: bool) -> SqurilResult<Self> {
        let mut aggregate = None;
        let mut path_text = raw.to_string();
        if allow_aggregate {
            for (name, variant) in AggregateFn::ALL {
                let prefix = format!("{name}(");
                if raw.starts_with(&prefix) && raw.ends_with(')') {
                    aggregate = Some(*variant);
                    path_text = raw[prefix.len()..raw.len() - 1].to_string();
                    break;
                }
            }
        }
        let bare_term = path_text.split('[').next().unwrap_or(&path_text).to_string();
        let elements = parse_path(&path_text)?;
        Ok(Self {
            raw: raw.to_string(),
            path_text,
            bare_term,
            elements,
            aggregate,
        })
    }
}

/// Logical combinator joining a `where=` term to the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// One `where=` term: parenthesis nesting, combinator, path, operator
/// (already normalized the way the original parser normalizes `not.is` to
/// `is.not`), and a raw value string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereTerm {
    pub raw: String,
    pub groups_open: u32,
    pub groups_close: u32,
    pub combinator: Option<Combinator>,
    pub select_term: SelectTerm,
    /// Normalized operator token, e.g. `"eq"`, `"not.like"`, `"is.not"`.
    pub op: String,
    pub value: String,
}

impl WhereTerm {
    pub fn parse(raw: &str) -> SqurilResult<Self> {
        let mut groups_open = 0u32;
        let mut groups_close = 0u32;
        let mut stripped = String::with_capacity(raw.len());
        let mut is_quoted = false;
        let mut prev: Option<char> = None;
        for ch in raw.chars() {
            if ch == '\'' && prev != Some('\\') {
                is_quoted = !is_quoted;
            }
            if (ch == '(' || ch == ')') && !is_quoted {
                if ch == '(' {
                    groups_open += 1;
                } else {
                    groups_close += 1;
                }
            } else {
                stripped.push(ch);
            }
            prev = Some(ch);
        }

        let mut rest = stripped.as_str();
        let mut combinator = None;
        if let Some(after) = rest.strip_prefix("and:") {
            combinator = Some(Combinator::And);
            rest = after;
        } else if let Some(after) = rest.strip_prefix("or:") {
            combinator = Some(Combinator::Or);
            rest = after;
        }

        let (term, op, value) = split_term_op_value(rest)?;
        let op = normalize_op(&op);
        let select_term = SelectTerm::parse(&term)?;

        Ok(Self {
            raw: raw.to_string(),
            groups_open,
            groups_close,
            combinator,
            select_term,
            op,
            value,
        })
    }
}

/// Split `<path>=<op>.<value>`, honoring the quirky "not." op-prefix
/// absorption and single-quote value escaping the original parser performs
/// one character at a time.
fn split_term_op_value(input: &str) -> SqurilResult<(String, String, String)> {
    let mut term = String::new();
    let mut term_found = false;
    let mut op = String::new();
    let mut op_found = false;
    let mut value = String::new();
    let mut negated_ops = 0u8;
    let mut prev: Option<char> = None;

    for ch in input.chars() {
        if !term_found {
            if ch != '=' {
                term.push(ch);
            } else {
                term_found = true;
            }
        } else if !op_found {
            if ch != '.' {
                op.push(ch);
            } else if op.starts_with("not") {
                if negated_ops == 1 {
                    op_found = true;
                } else {
                    negated_ops += 1;
                    op.push(ch);
                }
            } else {
                op_found = true;
            }
        } else {
            if ch == '\'' && prev != Some('\\') {
                prev = Some(ch);
                continue;
            }
            if ch == '\\' {
                prev = Some(ch);
                continue;
            }
            if ch == '\'' && prev == Some('\\') {
                value.push_str("''");
            } else {
                value.push(ch);
            }
        }
        prev = Some(ch);
    }

    if !term_found {
        return Err(SqurilError::parse(format!(
            "where term `{input}` is missing `=`"
        )));
    }
    Ok((term, op, value))
}

fn normalize_op(op: &str) -> String {
    if op == "not.is" {
        "is.not".to_string()
    } else {
        op.to_string()
    }
}

/// One `order=` term: a path plus ascending/descending direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub select_term: SelectTerm,
    pub descending: bool,
}

impl OrderTerm {
    pub fn parse(raw: &str) -> SqurilResult<Self> {
        let (path, direction) = raw
            .rsplit_once('.')
            .ok_or_else(|| SqurilError::parse(format!("order term `{raw}` is missing a direction")))?;
        let descending = match direction {
            "desc" => true,
            "asc" => false,
            other => {
                return Err(SqurilError::parse(format!(
                    "order direction must be `asc` or `desc`, got `{other}`"
                )));
            }
        };
        Ok(Self {
            select_term: SelectTerm::parse(path)?,
            descending,
        })
    }
}

/// One `range=` term: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeTerm {
    pub start: i64,
    pub end: i64,
}

impl RangeTerm {
    pub fn parse(raw: &str) -> SqurilResult<Self> {
        let (start, end) = raw
            .split_once('.')
            .ok_or_else(|| SqurilError::parse(format!("range term `{raw}` must be `start.end`")))?;
        let start = start
            .parse::<i64>()
            .map_err(|_| SqurilError::parse(format!("invalid range start `{start}`")))?;
        let end = end
            .parse::<i64>()
            .map_err(|_| SqurilError::parse(format!("invalid range end `{end}`")))?;
        Ok(Self { start, end })
    }
}

/// One `set=` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetTerm {
    /// `k` or nested `a.b` / `a.b[N]` / `a[N|k]` — change or add a key.
    Assign { select_term: SelectTerm },
    /// `-k` — remove a top-level key.
    Remove { key: String },
    /// `*` — replace the whole document.
    ReplaceAll,
}

impl SetTerm {
    pub fn parse(raw: &str) -> SqurilResult<Self> {
        if raw == "*" {
            return Ok(Self::ReplaceAll);
        }
        if let Some(key) = raw.strip_prefix('-') {
            return Ok(Self::Remove {
                key: key.to_string(),
            });
        }
        let select_term = SelectTerm::parse(raw)?;
        if select_term.aggregate.is_some() {
            return Err(SqurilError::parse(format!(
                "set term `{raw}` cannot use an aggregate function"
            )));
        }
        for element in &select_term.elements {
            if matches!(
                element,
                SelectElement::ArrayBroadcastSingle { .. } | SelectElement::ArrayBroadcastMultiple { .. }
            ) {
                return Err(SqurilError::parse(format!(
                    "set term `{raw}` cannot use broadcast selection"
                )));
            }
            if matches!(element, SelectElement::ArraySpecificMultiple { .. }) {
                return Err(SqurilError::parse(format!(
                    "set term `{raw}` cannot select multiple sub-keys"
                )));
            }
        }
        Ok(Self::Assign { select_term })
    }

    /// The top-level key this term targets, used to look it up in the
    /// update payload and to build restore set-queries.
    #[must_use]
    pub fn top_level_key(&self) -> Option<&str> {
        match self {
            Self::Assign { select_term } => select_term.elements.first().map(SelectElement::key),
            Self::Remove { key } => Some(key.as_str()),
            Self::ReplaceAll => None,
        }
    }
}

/// One `group_by=` term — a bare path, aggregates forbidden.
pub type GroupByTerm = SelectTerm;

/// The `alter=` clause: only `name=eq.<new_name>` is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterTerm {
    pub new_name: String,
}

impl AlterTerm {
    pub fn parse(raw: &str) -> SqurilResult<Self> {
        let term = WhereTerm::parse(raw)?;
        if term.select_term.bare_term != "name" {
            return Err(SqurilError::parse(
                "alter statements are limited to the `name` attribute",
            ));
        }
        if term.op != "eq" {
            return Err(SqurilError::parse(format!(
                "rename requires the `eq` operator, not `{}`",
                term.op
            )));
        }
        Ok(Self {
            new_name: term.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aggregate_wrapper() {
        let term = SelectTerm::parse("count(*)").unwrap();
        assert_eq!(term.aggregate, Some(AggregateFn::Count));
        assert_eq!(term.path_text, "*");
    }

    #[test]
    fn where_term_parses_quoted_value_with_escape() {
        let term = WhereTerm::parse(r"loop=eq.'g\'n kat oor die pad'").unwrap();
        assert_eq!(term.op, "eq");
        assert_eq!(term.value, "g''n kat oor die pad");
    }

    #[test]
    fn where_term_normalizes_not_is() {
        let term = WhereTerm::parse("a=not.is.null").unwrap();
        assert_eq!(term.op, "is.not");
    }

    #[test]
    fn where_term_keeps_not_like() {
        let term = WhereTerm::parse("a=not.like.foo*").unwrap();
        assert_eq!(term.op, "not.like");
        assert_eq!(term.value, "foo*");
    }

    #[test]
    fn where_term_tracks_groups_and_combinator() {
        let term = WhereTerm::parse("(and:a=eq.1)").unwrap();
        assert_eq!(term.groups_open, 1);
        assert_eq!(term.groups_close, 1);
        assert_eq!(term.combinator, Some(Combinator::And));
    }

    #[test]
    fn order_term_parses_direction() {
        let term = OrderTerm::parse("a.b.desc").unwrap();
        assert!(term.descending);
        assert_eq!(term.select_term.path_text, "a.b");
    }

    #[test]
    fn range_term_parses_bounds() {
        let term = RangeTerm::parse("0.10").unwrap();
        assert_eq!(term.start, 0);
        assert_eq!(term.end, 10);
    }

    #[test]
    fn set_term_rejects_nested_broadcast() {
        let err = SetTerm::parse("a[*|h]").unwrap_err();
        assert!(err.to_string().contains("broadcast"));
    }

    #[test]
    fn set_term_parses_remove() {
        let term = SetTerm::parse("-k").unwrap();
        assert_eq!(term.top_level_key(), Some("k"));
    }

    #[test]
    fn alter_term_requires_name_eq() {
        let err = AlterTerm::parse("other=eq.new").unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn alter_term_parses_new_name() {
        let term = AlterTerm::parse("name=eq.new_table").unwrap();
        assert_eq!(term.new_name, "new_table");
    }
}
