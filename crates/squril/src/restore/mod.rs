//! Three-way diffing and the restore orchestration loop.
//!
//! Restoring replays a table's audit history from oldest to newest,
//! comparing each remembered `previous` state against the row's current
//! state (located by a caller-supplied primary key) and applying whatever
//! minimal `set=`/delete-then-insert operations bring it back in line.

use serde_json::{Map, Value};

use crate::audit::AuditEvent;
use crate::error::{SqurilError, SqurilResult};

/// The result of comparing a row's current state against a target
/// (historical) state: which keys changed value, which were removed, and
/// which were added, moving from current to target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreeWayDiff {
    pub to_change: Map<String, Value>,
    pub to_remove: Map<String, Value>,
    pub to_add: Map<String, Value>,
}

impl ThreeWayDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_change.is_empty() && self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Diff two JSON objects the way the original restore logic does:
/// keys present in both with different values go to `to_change`, keys only
/// in `current` go to `to_remove`, keys only in `target` go to `to_add`.
#[must_use]
pub fn three_way_diff(current: &Map<String, Value>, target: &Map<String, Value>) -> ThreeWayDiff {
    let mut diff = ThreeWayDiff::default();
    for (key, value) in target {
        match current.get(key) {
            Some(current_value) if current_value != value => {
                diff.to_change.insert(key.clone(), value.clone());
            }
            None => {
                diff.to_add.insert(key.clone(), value.clone());
            }
            _ => {}
        }
    }
    for (key, value) in current {
        if !target.contains_key(key) {
            diff.to_remove.insert(key.clone(), value.clone());
        }
    }
    diff
}

/// Walk a caller-supplied dotted, plain-key-only path into a document.
#[must_use]
pub fn primary_key_value<'a>(path: &[String], document: &'a Value) -> Option<&'a Value> {
    let mut current = document;
    for key in path {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Index a table's current rows by primary-key value, for `plan_restore`.
/// Errors if two distinct rows share a primary-key value, matching the
/// original implementation raising on a non-unique primary-key match.
pub fn group_current_rows_by_pk(
    primary_key: &[String],
    current_rows: &[Value],
) -> SqurilResult<std::collections::HashMap<String, Map<String, Value>>> {
    let mut current_by_pk = std::collections::HashMap::new();
    for row in current_rows {
        let Some(pk) = primary_key_value(primary_key, row) else {
            continue;
        };
        let Some(object) = row.as_object() else {
            continue;
        };
        if current_by_pk.insert(pk.to_string(), object.clone()).is_some() {
            return Err(SqurilError::data_integrity(format!(
                "more than one row matches primary key value `{pk}`"
            )));
        }
    }
    Ok(current_by_pk)
}

/// One unit of work the restore loop decided to perform for a single
/// primary-key value, expressed independently of any backend so it can be
/// executed by either `EmbeddedBackend` or `ServerBackend`.
#[derive(Debug, Clone)]
pub enum RestoreAction {
    /// The row no longer exists; reinsert `previous` verbatim.
    Reinsert { previous: Value },
    /// The row exists but has drifted; apply a set clause bringing the
    /// listed keys in `to_change`/`to_add` to the target's values.
    Update {
        pk_value: Value,
        to_change: Map<String, Value>,
    },
    /// The row exists but carries keys the target no longer has; remove
    /// them.
    RemoveKeys { pk_value: Value, keys: Vec<String> },
}

/// Replay a table's audit history (oldest first, already filtered to the
/// caller's `where=`/table scope) into a minimal ordered set of
/// [`RestoreAction`]s.
///
/// `current_rows` is keyed by the primary key's JSON value (via its debug
/// string, since [`Value`] is not `Hash`) to the row as currently stored.
pub fn plan_restore(
    primary_key: &[String],
    audit_events_oldest_first: &[AuditEvent],
    current_rows_by_pk: &std::collections::HashMap<String, Map<String, Value>>,
) -> SqurilResult<Vec<RestoreAction>> {
    let mut actions = Vec::new();
    let mut handled = std::collections::HashSet::new();

    for event in audit_events_oldest_first {
        if matches!(event.event.as_str(), "restore" | "create" | "read") {
            continue;
        }
        let Some(target_entry) = event.previous.as_ref() else {
            continue;
        };
        let Some(pk_value) = primary_key_value(primary_key, target_entry) else {
            continue;
        };
        let pk_key = pk_value.to_string();
        if handled.contains(&pk_key) {
            continue;
        }

        let target_object = target_entry
            .as_object()
            .ok_or_else(|| SqurilError::data_integrity("audit `previous` state is not an object"))?;

        match current_rows_by_pk.get(&pk_key) {
            None => {
                actions.push(RestoreAction::Reinsert {
                    previous: target_entry.clone(),
                });
            }
            Some(current_object) => {
                let diff = three_way_diff(current_object, target_object);
                if !diff.to_change.is_empty() || !diff.to_add.is_empty() {
                    let mut to_change = diff.to_change.clone();
                    to_change.extend(diff.to_add.clone());
                    actions.push(RestoreAction::Update {
                        pk_value: pk_value.clone(),
                        to_change,
                    });
                }
                if !diff.to_remove.is_empty() {
                    actions.push(RestoreAction::RemoveKeys {
                        pk_value: pk_value.clone(),
                        keys: diff.to_remove.keys().cloned().collect(),
                    });
                }
            }
        }
        handled.insert(pk_key);
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_detects_change_remove_add() {
        let current = json!({"a": 3, "b": 4}).as_object().unwrap().clone();
        let target = json!({"a": 3, "b": 5}).as_object().unwrap().clone();
        let diff = three_way_diff(&current, &target);
        assert_eq!(diff.to_change.get("b"), Some(&json!(5)));
        assert!(diff.to_remove.is_empty());
        assert!(diff.to_add.is_empty());
    }

    #[test]
    fn diff_detects_removed_key() {
        let current = json!({"a": 3, "b": 4}).as_object().unwrap().clone();
        let target = json!({"a": 3}).as_object().unwrap().clone();
        let diff = three_way_diff(&current, &target);
        assert_eq!(diff.to_remove.get("b"), Some(&json!(4)));
    }

    #[test]
    fn diff_detects_added_key() {
        let current = json!({"a": 3}).as_object().unwrap().clone();
        let target = json!({"a": 3, "c": 9}).as_object().unwrap().clone();
        let diff = three_way_diff(&current, &target);
        assert_eq!(diff.to_add.get("c"), Some(&json!(9)));
    }

    #[test]
    fn plan_restore_skips_restore_and_create_events() {
        let tsc = crate::audit::AuditTransaction::new(None, None, None);
        let skip_me = tsc.event_restore(json!({"id": 1}), None, "q");
        let actions = plan_restore(&["id".to_string()], &[skip_me], &std::collections::HashMap::new()).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn plan_restore_reinserts_missing_row() {
        let tsc = crate::audit::AuditTransaction::new(None, None, None);
        let deleted = tsc.event_delete(json!({"id": 1, "name": "a"}), "where=id=eq.1");
        let actions = plan_restore(&["id".to_string()], &[deleted], &std::collections::HashMap::new()).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], RestoreAction::Reinsert { .. }));
    }
}
