use serde_json::{Value, json};
use squril::backend::{Backend, EmbeddedBackend};
use squril::config::BackendConfig;

fn backend() -> EmbeddedBackend {
    EmbeddedBackend::in_memory(BackendConfig::default()).expect("in-memory backend should open")
}

fn select(backend: &EmbeddedBackend, table: &str, query: &str) -> Vec<Value> {
    backend.select(table, query, false).expect("select should succeed")
}

#[test]
fn update_then_restore_reverses_a_single_row() {
    let backend = backend();
    backend
        .insert(
            "people",
            &json!([
                {"id": 1, "a": 5, "b": "a"},
                {"id": 2, "a": 5, "c": {"m": "t"}},
            ]),
            true,
        )
        .expect("insert should succeed");

    backend
        .update("people", "set=a&where=a=eq.5&message=M", &json!({"a": 6}))
        .expect("update should succeed");

    let rows = select(&backend, "people", "order=id.asc");
    assert_eq!(rows[0]["a"], 6);
    assert_eq!(rows[1]["a"], 6);

    let audit_rows = select(&backend, "people_audit", "where=event=eq.update");
    assert_eq!(audit_rows.len(), 2);
    assert_eq!(audit_rows[0]["transaction_id"], audit_rows[1]["transaction_id"]);
    assert_eq!(audit_rows[0]["message"], "M");

    let first_event_id = audit_rows
        .iter()
        .find(|event| event["previous"]["id"] == 1)
        .expect("an update event for id=1 should exist")["event_id"]
        .as_str()
        .unwrap()
        .to_string();

    backend
        .restore(
            "people",
            &format!("restore&primary_key=id&where=event_id=eq.{first_event_id}"),
        )
        .expect("restore should succeed");

    let restored = select(&backend, "people", "where=id=eq.1");
    assert_eq!(restored[0]["a"], 5);

    let updates_after_restore = select(&backend, "people_audit", "where=event=eq.update");
    assert_eq!(updates_after_restore.len(), 3, "restore should record one more update event");
}

#[test]
fn delete_then_restore_reinserts_the_row() {
    let backend = backend();
    backend
        .insert(
            "people",
            &json!([
                {"id": 1, "a": 5, "b": "a"},
                {"id": 2, "a": 5, "c": {"m": "t"}},
            ]),
            true,
        )
        .expect("insert should succeed");

    backend
        .delete("people", "where=c=not.is.null&message=bad", true)
        .expect("delete should succeed");
    assert_eq!(select(&backend, "people", ""), vec![json!({"id": 1, "a": 5, "b": "a"})]);

    backend
        .restore("people", "restore&primary_key=id&where=event=eq.delete")
        .expect("restore should succeed");

    let rows = select(&backend, "people", "order=id.asc");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["c"]["m"], "t");

    let restores = select(&backend, "people_audit", "where=event=eq.restore");
    assert_eq!(restores.len(), 1);
}

#[test]
fn restoring_a_dropped_table_recreates_it_with_every_row() {
    let backend = backend();
    backend.insert("people", &json!({"id": 1, "a": 1}), true).unwrap();
    backend.insert("people", &json!({"id": 2, "a": 2}), true).unwrap();

    backend.delete("people", "", true).unwrap();
    let err = backend.select("people", "", false).unwrap_err();
    assert!(matches!(err, squril::SqurilError::Embedded(_)), "table should be gone: {err}");

    backend.restore("people", "restore&primary_key=id").unwrap();
    let rows = select(&backend, "people", "order=id.asc");
    assert_eq!(rows, vec![json!({"id": 1, "a": 1}), json!({"id": 2, "a": 2})]);
}

#[test]
fn restore_is_a_fixed_point() {
    let backend = backend();
    backend.insert("people", &json!({"id": 1, "a": 1}), true).unwrap();
    backend.update("people", "set=a&where=id=eq.1", &json!({"a": 2})).unwrap();

    backend.restore("people", "restore&primary_key=id").unwrap();
    let after_first = select(&backend, "people_audit", "where=event=eq.restore").len();

    backend.restore("people", "restore&primary_key=id").unwrap();
    let after_second = select(&backend, "people_audit", "where=event=eq.restore").len();

    assert_eq!(after_first, after_second, "a second restore of the same query should be a no-op");
}

#[test]
fn quoted_where_value_matches_the_escaped_apostrophe() {
    let backend = backend();
    backend
        .insert("sayings", &json!({"loop": "g'n kat oor die pad"}), false)
        .unwrap();
    backend
        .insert("sayings", &json!({"loop": "something else"}), false)
        .unwrap();

    let rows = select(&backend, "sayings", "where=loop=eq.'g\\'n kat oor die pad'");
    assert_eq!(rows, vec![json!({"loop": "g'n kat oor die pad"})]);
}

#[test]
fn array_sub_selection_projects_matching_keys_per_element() {
    let backend = backend();
    backend
        .insert(
            "widgets",
            &json!({"a": {"k3": [{"h": 0, "r": 77, "s": 521}, {"h": 63, "s": 333}]}}),
            false,
        )
        .unwrap();

    let rows = select(&backend, "widgets", "select=a.k3[*|h,s]");
    assert_eq!(rows[0], json!([[[0, 521], [63, 333]]]));
}

#[test]
fn aggregate_select_applies_count_and_avg() {
    let backend = backend();
    for x in [Some(1900), None, Some(88), Some(107), Some(10)] {
        backend.insert("readings", &json!({"x": x}), false).unwrap();
    }

    let rows = select(&backend, "readings", "select=count(*),avg(x)&where=x=not.is.null");
    assert_eq!(rows[0][0], 4);
}

#[test]
fn update_on_audit_table_is_rejected_even_through_set_clause() {
    let backend = backend();
    backend.insert("people", &json!({"id": 1}), true).unwrap();
    let err = backend
        .update("people_audit", "set=event&where=id=eq.1", &json!({"event": "x"}))
        .unwrap_err();
    assert!(matches!(err, squril::SqurilError::OperationNotPermitted { .. }));
}

#[test]
fn non_unique_primary_key_aborts_restore_with_data_integrity_error() {
    let backend = backend();
    backend.insert("people", &json!({"id": 1, "a": 1}), false).unwrap();
    backend.insert("people", &json!({"id": 1, "a": 2}), false).unwrap();
    backend.update("people", "set=a&where=a=eq.1", &json!({"a": 9})).unwrap();

    let err = backend.restore("people", "restore&primary_key=id").unwrap_err();
    assert!(matches!(err, squril::SqurilError::DataIntegrity { .. }));
}
