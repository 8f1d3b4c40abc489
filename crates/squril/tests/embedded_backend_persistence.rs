use serde_json::json;
use squril::backend::{Backend, EmbeddedBackend};
use squril::config::BackendConfig;

#[test]
fn data_survives_reopening_the_same_file() {
    let dir = tempfile::tempdir().expect("tempdir should be creatable");
    let db_path = dir.path().join("squril.db");

    {
        let backend = EmbeddedBackend::open(&db_path, BackendConfig::default()).expect("opening a fresh file should succeed");
        backend.insert("people", &json!({"id": 1, "name": "ingrid"}), true).unwrap();
    }

    let backend = EmbeddedBackend::open(&db_path, BackendConfig::default()).expect("reopening the same file should succeed");
    let rows = backend.select("people", "", false).unwrap();
    assert_eq!(rows, vec![json!({"id": 1, "name": "ingrid"})]);

    let audit_rows = backend.select("people_audit", "", false).unwrap();
    assert_eq!(audit_rows.len(), 1);
    assert_eq!(audit_rows[0]["event"], "create");
}

#[test]
fn table_names_are_listed_for_a_file_backed_store() {
    let dir = tempfile::tempdir().expect("tempdir should be creatable");
    let db_path = dir.path().join("squril.db");
    let backend = EmbeddedBackend::open(&db_path, BackendConfig::default()).unwrap();

    backend.insert("widgets", &json!({"id": 1}), false).unwrap();
    backend.insert("gadgets", &json!({"id": 1}), false).unwrap();

    let mut tables = backend.tables_list(None).unwrap();
    tables.sort();
    assert_eq!(tables, vec!["gadgets".to_string(), "widgets".to_string()]);

    let filtered = backend.tables_list(Some("widg%")).unwrap();
    assert_eq!(filtered, vec!["widgets".to_string()]);
}
