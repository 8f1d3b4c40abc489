//! SQLite (json1) backend: one file, one writer, guarded by a `Mutex`.

use std::sync::Mutex;

use rusqlite::Connection;
use serde_json::Value;

use crate::ast::UriQuery;
use crate::audit::{AuditEvent, AuditTransaction, looks_like_audit_event};
use crate::backend::Backend;
use crate::config::BackendConfig;
use crate::dialect::EmbeddedDialect;
use crate::error::{SqurilError, SqurilResult};
use crate::models::{AlterReport, RestoreReport};
use crate::{generator, parser, restore};

const TABLE_DEFINITION: &str = "(data json unique not null)";

pub struct EmbeddedBackend {
    conn: Mutex<Connection>,
    config: BackendConfig,
    requestor: Option<String>,
    requestor_name: Option<String>,
}

impl EmbeddedBackend {
    pub fn open(path: &std::path::Path, config: BackendConfig) -> SqurilResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn, config))
    }

    #[must_use]
    pub fn in_memory(config: BackendConfig) -> SqurilResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, config))
    }

    fn from_connection(conn: Connection, config: BackendConfig) -> Self {
        Self {
            conn: Mutex::new(conn),
            config,
            requestor: None,
            requestor_name: None,
        }
    }

    #[must_use]
    pub fn with_requestor(mut self, requestor: Option<String>, requestor_name: Option<String>) -> Self {
        self.requestor = requestor;
        self.requestor_name = requestor_name;
        self
    }

    fn fqtn(table_name: &str) -> String {
        format!("\"{table_name}\"")
    }

    fn create_table(tx: &rusqlite::Transaction<'_>, table_name: &str) -> SqurilResult<()> {
        tx.execute(
            &format!("create table if not exists {} {TABLE_DEFINITION}", Self::fqtn(table_name)),
            [],
        )?;
        Ok(())
    }

    fn insert_rows(tx: &rusqlite::Transaction<'_>, table_name: &str, rows: &[Value]) -> SqurilResult<()> {
        let mut stmt = tx.prepare(&format!("insert into {} (data) values (?1)", Self::fqtn(table_name)))?;
        for row in rows {
            let encoded = serde_json::to_string(row)?;
            match stmt.execute([encoded]) {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    log::info!("ignoring duplicate row in {table_name}");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Ok(())
    }

    fn run_select(&self, table_name: &str, uri_query: &str, backup_cutoff: Option<&str>) -> SqurilResult<Vec<Value>> {
        let query = parser::parse(table_name, uri_query)?;
        let dialect = EmbeddedDialect;
        let generated = generator::generate(&dialect, &Self::fqtn(table_name), &query, None, backup_cutoff, false, None)?;
        let conn = self.conn.lock().expect("connection mutex poisoned");
        let mut stmt = conn.prepare(&generated.select_query)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            let text = row?;
            out.push(serde_json::from_str(&text)?);
        }
        Ok(out)
    }

    fn is_audit_table(&self, table_name: &str) -> bool {
        if !self.config.is_audit_table(table_name) {
            return false;
        }
        match self.run_select(table_name, "range=0.1", None) {
            Ok(rows) => rows.first().is_some_and(looks_like_audit_event),
            Err(_) => false,
        }
    }

    fn audit_transaction(&self, message: Option<String>) -> AuditTransaction {
        AuditTransaction::new(self.requestor.clone(), message, self.requestor_name.clone())
    }

    fn insert_audit_events(tx: &rusqlite::Transaction<'_>, table_name: &str, events: &[AuditEvent]) -> SqurilResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let audit_table = crate::audit::audit_table_name(table_name);
        Self::create_table(tx, &audit_table)?;
        let rows: Vec<Value> = events
            .iter()
            .map(|event| serde_json::to_value(event))
            .collect::<Result<_, _>>()?;
        Self::insert_rows(tx, &audit_table, &rows)
    }

    /// Apply a `set=` update under a caller-supplied audit transaction, so
    /// that `restore` can share one `transaction_id`/`timestamp`/`message`
    /// across every event it produces instead of minting a fresh one per
    /// row it touches.
    fn apply_update(
        &self,
        table_name: &str,
        uri_query: &str,
        query: &UriQuery,
        data: &Value,
        tsc: &AuditTransaction,
    ) -> SqurilResult<()> {
        let dialect = EmbeddedDialect;
        let generated = generator::generate(&dialect, &Self::fqtn(table_name), query, Some(data), None, false, None)?;
        let previous_rows = self.run_select(table_name, uri_query, None)?;

        let mut conn = self.conn.lock().expect("connection mutex poisoned");
        crate::session::with_embedded_session(&mut conn, |tx| {
            for statement in &generated.update_queries {
                tx.execute_batch(statement)?;
            }
            let events: Vec<AuditEvent> = previous_rows
                .iter()
                .map(|previous| tsc.event_update(data.clone(), previous.clone(), uri_query))
                .collect();
            Self::insert_audit_events(tx, table_name, &events)
        })
    }
}

impl Backend for EmbeddedBackend {
    fn insert(&self, table_name: &str, data: &Value, audit: bool) -> SqurilResult<()> {
        if self.is_audit_table(table_name) {
            return Err(SqurilError::operation_not_permitted("audit tables cannot be inserted into directly"));
        }
        let rows: Vec<Value> = match data {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![data.clone()],
            _ => return Err(SqurilError::parse("insert payload must be an object or array of objects")),
        };

        let mut conn = self.conn.lock().expect("connection mutex poisoned");
        crate::session::with_embedded_session(&mut conn, |tx| {
            Self::create_table(tx, table_name)?;
            Self::insert_rows(tx, table_name, &rows)?;
            if audit {
                let tsc = self.audit_transaction(None);
                let events: Vec<AuditEvent> = rows.iter().map(|row| tsc.event_create(row.clone())).collect();
                Self::insert_audit_events(tx, table_name, &events)?;
            }
            Ok(())
        })?;
        log::info!("inserted {} row(s) into {table_name}", rows.len());
        Ok(())
    }

    fn select(&self, table_name: &str, uri_query: &str, audit: bool) -> SqurilResult<Vec<Value>> {
        let backup_cutoff = if self.is_audit_table(table_name) {
            self.config.backup_days.map(crate::utils::time::backup_cutoff)
        } else {
            None
        };
        let rows = if table_name.contains('*') || table_name.contains(',') {
            let pattern = table_name.replace('*', "%");
            let tables = self.tables_list(Some(&pattern))?;
            let mut combined = Vec::new();
            for table in tables {
                combined.extend(self.run_select(&table, uri_query, backup_cutoff.as_deref())?);
            }
            combined
        } else {
            self.run_select(table_name, uri_query, backup_cutoff.as_deref())?
        };

        if audit {
            let mut conn = self.conn.lock().expect("connection mutex poisoned");
            crate::session::with_embedded_session(&mut conn, |tx| {
                let tsc = self.audit_transaction(None);
                Self::insert_audit_events(tx, table_name, &[tsc.event_read(uri_query)])
            })?;
        }
        Ok(rows)
    }

    fn update(&self, table_name: &str, uri_query: &str, data: &Value) -> SqurilResult<()> {
        if self.is_audit_table(table_name) {
            return Err(SqurilError::operation_not_permitted("audit tables cannot be altered directly"));
        }
        let query = parser::parse(table_name, uri_query)?;
        let tsc = self.audit_transaction(query.message.clone());
        self.apply_update(table_name, uri_query, &query, data, &tsc)
    }

    fn delete(&self, table_name: &str, uri_query: &str, audit: bool) -> SqurilResult<()> {
        if self.is_audit_table(table_name) {
            return Err(SqurilError::operation_not_permitted("audit tables cannot be altered directly"));
        }
        let query = parser::parse(table_name, uri_query)?;
        let dialect = EmbeddedDialect;
        let generated = generator::generate(&dialect, &Self::fqtn(table_name), &query, None, None, false, None)?;
        let previous_rows = if audit {
            self.run_select(table_name, uri_query, None)?
        } else {
            Vec::new()
        };

        let mut conn = self.conn.lock().expect("connection mutex poisoned");
        crate::session::with_embedded_session(&mut conn, |tx| {
            tx.execute_batch(&generated.delete_query)?;
            if audit {
                let tsc = self.audit_transaction(query.message.clone());
                let events: Vec<AuditEvent> = previous_rows
                    .iter()
                    .map(|previous| tsc.event_delete(previous.clone(), uri_query))
                    .collect();
                Self::insert_audit_events(tx, table_name, &events)?;
            }
            Ok(())
        })
    }

    fn alter(&self, table_name: &str, uri_query: &str) -> SqurilResult<AlterReport> {
        if self.is_audit_table(table_name) {
            return Err(SqurilError::operation_not_permitted("audit tables cannot be altered directly"));
        }
        let query = parser::parse(table_name, uri_query)?;
        let dialect = EmbeddedDialect;
        let name_func = |new_name: &str| Self::fqtn(new_name);
        let generated = generator::generate(&dialect, &Self::fqtn(table_name), &query, None, None, false, Some(&name_func))?;
        let Some(alter_sql) = generated.alter_query else {
            return Ok(AlterReport { tables: vec![table_name.to_string()] });
        };

        let mut altered = vec![table_name.to_string()];
        {
            let mut conn = self.conn.lock().expect("connection mutex poisoned");
            crate::session::with_embedded_session(&mut conn, |tx| {
                tx.execute(&alter_sql, [])?;
                Ok(())
            })?;
        }

        let audit_table = crate::audit::audit_table_name(table_name);
        let audit_new_name = crate::audit::audit_table_name(&query.alter.as_ref().expect("checked above").new_name);
        let audit_alter_sql = format!(
            "alter table {} rename to {}",
            Self::fqtn(&audit_table),
            Self::fqtn(&audit_new_name)
        );
        let renamed_audit = {
            let mut conn = self.conn.lock().expect("connection mutex poisoned");
            crate::session::with_embedded_session(&mut conn, |tx| {
                tx.execute(&audit_alter_sql, []).map_err(SqurilError::from)?;
                Ok(())
            })
            .is_ok()
        };
        if renamed_audit {
            altered.push(audit_table);
        }
        Ok(AlterReport { tables: altered })
    }

    fn restore(&self, table_name: &str, uri_query: &str) -> SqurilResult<RestoreReport> {
        let parts: Vec<&str> = uri_query.split('&').collect();
        if !parts.contains(&"restore") {
            return Ok(RestoreReport::default());
        }
        let query = parser::parse(table_name, uri_query)?;
        if query.primary_key.is_empty() {
            return Err(SqurilError::parse("restore requires a primary_key clause"));
        }

        let current_rows_result = self.run_select(table_name, "", None);
        let table_missing = current_rows_result.is_err();
        let current_rows = current_rows_result.unwrap_or_default();
        let current_by_pk = restore::group_current_rows_by_pk(&query.primary_key, &current_rows)?;

        let backup_cutoff = if table_missing {
            self.config.backup_days.map(crate::utils::time::backup_cutoff)
        } else {
            None
        };
        let audit_query = format!("{uri_query}&order=timestamp.asc");
        let audit_rows = self.run_select(
            &crate::audit::audit_table_name(table_name),
            &audit_query,
            backup_cutoff.as_deref(),
        )?;
        let audit_events: Vec<AuditEvent> = audit_rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();
        if audit_events.is_empty() {
            return Ok(RestoreReport::default());
        }

        let actions = restore::plan_restore(&query.primary_key, &audit_events, &current_by_pk)?;
        let tsc = self.audit_transaction(query.message.clone());
        let mut report = RestoreReport::default();

        {
            let mut conn = self.conn.lock().expect("connection mutex poisoned");
            crate::session::with_embedded_session(&mut conn, |tx| {
                Self::create_table(tx, table_name)?;
                Ok(())
            })?;
        }

        for action in actions {
            match action {
                restore::RestoreAction::Reinsert { previous } => {
                    let mut conn = self.conn.lock().expect("connection mutex poisoned");
                    crate::session::with_embedded_session(&mut conn, |tx| {
                        Self::insert_rows(tx, table_name, std::slice::from_ref(&previous))?;
                        Self::insert_audit_events(
                            tx,
                            table_name,
                            &[tsc.event_restore(previous.clone(), None, uri_query)],
                        )
                    })?;
                    report.restored.push(previous);
                }
                restore::RestoreAction::Update { pk_value, to_change } => {
                    let set_clause = to_change.keys().cloned().collect::<Vec<_>>().join(",");
                    let set_query = format!(
                        "set={set_clause}&where={}=eq.{}",
                        query.primary_key_path(),
                        pk_value.as_str().map(str::to_string).unwrap_or_else(|| pk_value.to_string())
                    );
                    let parsed = parser::parse(table_name, &set_query)?;
                    self.apply_update(table_name, &set_query, &parsed, &Value::Object(to_change.clone()), &tsc)?;
                    report.updated.push(Value::Object(to_change));
                }
                restore::RestoreAction::RemoveKeys { pk_value, keys } => {
                    let set_clause = keys.iter().map(|k| format!("-{k}")).collect::<Vec<_>>().join(",");
                    let where_query = format!(
                        "set={set_clause}&where={}=eq.{}",
                        query.primary_key_path(),
                        pk_value.as_str().map(str::to_string).unwrap_or_else(|| pk_value.to_string())
                    );
                    let parsed = parser::parse(table_name, &where_query)?;
                    self.apply_update(table_name, &where_query, &parsed, &Value::Null, &tsc)?;
                    report.updated.push(Value::Null);
                }
            }
        }
        Ok(report)
    }

    fn tables_list(&self, table_like: Option<&str>) -> SqurilResult<Vec<String>> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        let sql = match table_like {
            Some(pattern) => format!("select name from sqlite_master where type = 'table' and name like '{pattern}' order by name asc"),
            None => "select name from sqlite_master where type = 'table' order by name asc".to_string(),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> EmbeddedBackend {
        EmbeddedBackend::in_memory(BackendConfig::default()).unwrap()
    }

    #[test]
    fn insert_then_select_round_trips() {
        let backend = backend();
        backend.insert("people", &json!({"name": "ingrid"}), false).unwrap();
        let rows = backend.select("people", "", false).unwrap();
        assert_eq!(rows, vec![json!({"name": "ingrid"})]);
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let backend = backend();
        backend.insert("people", &json!({"name": "ingrid"}), false).unwrap();
        backend.insert("people", &json!({"name": "ingrid"}), false).unwrap();
        let rows = backend.select("people", "", false).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn update_records_audit_event() {
        let backend = backend();
        backend.insert("people", &json!({"id": 1, "name": "a"}), false).unwrap();
        backend
            .update("people", "set=name&where=id=eq.1", &json!({"name": "b"}))
            .unwrap();
        let rows = backend.select("people", "", false).unwrap();
        assert_eq!(rows[0]["name"], "b");
        let audit_rows = backend.select("people_audit", "", false).unwrap();
        assert_eq!(audit_rows.len(), 1);
        assert_eq!(audit_rows[0]["event"], "update");
    }

    #[test]
    fn delete_without_where_drops_table() {
        let backend = backend();
        backend.insert("people", &json!({"id": 1}), false).unwrap();
        backend.delete("people", "", false).unwrap();
        let err = backend.select("people", "", false).unwrap_err();
        assert!(matches!(err, SqurilError::Embedded(_)));
    }

    #[test]
    fn update_on_audit_table_is_rejected() {
        let backend = backend();
        backend.insert("people", &json!({"id": 1}), true).unwrap();
        let err = backend
            .update("people_audit", "set=event&where=id=eq.1", &json!({"event": "x"}))
            .unwrap_err();
        assert!(matches!(err, SqurilError::OperationNotPermitted { .. }));
    }
}
