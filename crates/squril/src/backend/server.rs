//! PostgreSQL (jsonb) backend: a pooled, server-based store.

use postgres::NoTls;
use postgres::error::SqlState;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;

use crate::ast::UriQuery;
use crate::audit::{AuditEvent, AuditTransaction, looks_like_audit_event};
use crate::backend::Backend;
use crate::config::BackendConfig;
use crate::dialect::ServerDialect;
use crate::error::{SqurilError, SqurilResult};
use crate::models::{AlterReport, RestoreReport};
use crate::{generator, parser, restore};

const TABLE_DEFINITION: &str = "(data jsonb not null, uniq text unique not null)";

/// Idempotent schema setup shared by every table: a helper that flattens an
/// array-of-objects column for sub-key array selections, and a trigger
/// function deriving the uniqueness column from the document's content hash.
const DB_INIT_SQL: &[&str] = &[
    r#"
    create or replace function filter_array_elements(data jsonb, keys text[])
        returns jsonb as $$
        declare key text;
        declare element jsonb;
        declare filtered jsonb;
        declare out jsonb;
        declare val jsonb;
        begin
            create temporary table if not exists info(v jsonb) on commit drop;
            for element in select jsonb_array_elements(data) loop
                for key in select unnest(keys) loop
                    if filtered is not null then
                        filtered := filtered || jsonb_extract_path(element, key);
                    else
                        filtered := jsonb_extract_path(element, key);
                    end if;
                if filtered is null then
                    filtered := '[]'::jsonb;
                end if;
                end loop;
            insert into info values (filtered);
            filtered := null;
            end loop;
            out := '[]'::jsonb;
            for val in select * from info loop
                out := out || jsonb_build_array(val);
            end loop;
            return out;
        end;
    $$ language plpgsql;
    "#,
    r#"
    create or replace function unique_data()
    returns trigger as $$
        begin
            NEW.uniq := md5(NEW.data::text);
            return new;
        end;
    $$ language plpgsql;
    "#,
];

pub type ServerPool = Pool<PostgresConnectionManager<NoTls>>;

pub struct ServerBackend {
    pool: ServerPool,
    config: BackendConfig,
    schema: String,
    schema_pattern: Option<String>,
    requestor: Option<String>,
    requestor_name: Option<String>,
}

impl ServerBackend {
    /// Open a backend against an already-built pool, running the
    /// process-wide database-init SQL once. Tolerant of "tuple concurrently
    /// updated" failures from racing processes doing the same thing.
    pub fn new(pool: ServerPool, config: BackendConfig) -> SqurilResult<Self> {
        let schema = config.schema_prefix.clone().unwrap_or_else(|| "public".to_string());
        let backend = Self {
            pool,
            config,
            schema,
            schema_pattern: None,
            requestor: None,
            requestor_name: None,
        };
        backend.initialise();
        Ok(backend)
    }

    #[must_use]
    pub fn with_schema_pattern(mut self, schema_pattern: Option<String>) -> Self {
        self.schema_pattern = schema_pattern;
        self
    }

    #[must_use]
    pub fn with_requestor(mut self, requestor: Option<String>, requestor_name: Option<String>) -> Self {
        self.requestor = requestor;
        self.requestor_name = requestor_name;
        self
    }

    fn initialise(&self) {
        let Ok(mut client) = self.pool.get() else {
            log::error!("could not check out a connection to run database-init SQL");
            return;
        };
        for statement in DB_INIT_SQL {
            if let Err(err) = client.batch_execute(statement) {
                log::warn!("db init statement failed, tolerated as concurrent init: {err}");
            }
        }
    }

    fn fqtn(&self, table_name: &str) -> String {
        Self::fqtn_in(&self.schema, table_name)
    }

    fn fqtn_in(schema: &str, table_name: &str) -> String {
        let schema = if schema == "all" { "\"all\"".to_string() } else { schema.to_string() };
        format!("{schema}.\"{table_name}\"")
    }

    fn create_table(tx: &mut postgres::Transaction<'_>, schema: &str, table_name: &str) -> SqurilResult<()> {
        let exists: bool = tx
            .query_one(
                "select exists(select from pg_tables where schemaname = $1 and tablename = $2)",
                &[&schema, &table_name],
            )?
            .get(0);
        if exists {
            return Ok(());
        }
        tx.batch_execute(&format!("create schema if not exists {schema}"))?;
        tx.batch_execute(&format!(
            "create table if not exists {} {TABLE_DEFINITION}",
            Self::fqtn_in(schema, table_name)
        ))?;
        tx.batch_execute(&format!(
            "create trigger ensure_unique_data before insert on {schema}.\"{table_name}\" \
             for each row execute procedure unique_data()"
        ))?;
        Ok(())
    }

    fn insert_rows(tx: &mut postgres::Transaction<'_>, schema: &str, table_name: &str, rows: &[Value]) -> SqurilResult<()> {
        let fqtn = Self::fqtn_in(schema, table_name);
        let statement = format!("insert into {fqtn} (data) values ($1)");
        for row in rows {
            match tx.execute(&statement, &[row]) {
                Ok(_) => {}
                Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                    log::info!("ignoring duplicate row in {table_name}");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Ok(())
    }

    fn run_select(&self, table_name: &str, uri_query: &str, backup_cutoff: Option<&str>) -> SqurilResult<Vec<Value>> {
        let query = parser::parse(table_name, uri_query)?;
        let dialect = ServerDialect;
        let generated = generator::generate(&dialect, &self.fqtn(table_name), &query, None, backup_cutoff, false, None)?;
        let mut conn = self.pool.get()?;
        let rows = conn.query(&generated.select_query, &[])?;
        Ok(rows.into_iter().map(|row| row.get::<_, Value>(0)).collect())
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

    fn insert_audit_events(
        tx: &mut postgres::Transaction<'_>,
        schema: &str,
        table_name: &str,
        events: &[AuditEvent],
    ) -> SqurilResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let audit_table = crate::audit::audit_table_name(table_name);
        Self::create_table(tx, schema, &audit_table)?;
        let rows: Vec<Value> = events
            .iter()
            .map(|event| serde_json::to_value(event))
            .collect::<Result<_, _>>()?;
        Self::insert_rows(tx, schema, &audit_table, &rows)
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
        let dialect = ServerDialect;
        let generated = generator::generate(&dialect, &self.fqtn(table_name), query, Some(data), None, false, None)?;
        let previous_rows = self.run_select(table_name, uri_query, None)?;

        let mut conn = self.pool.get()?;
        crate::session::with_server_session(&mut conn, |tx| {
            for statement in &generated.update_queries {
                tx.batch_execute(statement)?;
            }
            let events: Vec<AuditEvent> = previous_rows
                .iter()
                .map(|previous| tsc.event_update(data.clone(), previous.clone(), uri_query))
                .collect();
            Self::insert_audit_events(tx, &self.schema, table_name, &events)
        })
    }

    /// Find every schema (matching `schema_pattern`) holding a table named
    /// `table_name`, and union them into the `all` schema's view of the same
    /// name. Called after insert/delete when `update_all_view` is enabled.
    fn tables_in_schemas(&self, table_name: &str) -> SqurilResult<Vec<String>> {
        let pattern = format!("{}%", self.schema_pattern.clone().unwrap_or_default());
        let mut conn = self.pool.get()?;
        let rows = conn.query(
            "select concat_ws('.', table_schema, concat('\"', table_name, '\"')) \
             from information_schema.tables where table_schema like $1 and table_name = $2",
            &[&pattern, &table_name],
        )?;
        Ok(rows.into_iter().map(|row| row.get::<_, String>(0)).collect())
    }

    fn rebuild_all_view(&self, table_name: &str) -> SqurilResult<()> {
        let tables = self.tables_in_schemas(table_name)?;
        if tables.is_empty() {
            return Ok(());
        }
        let unions = tables.iter().map(|t| format!("select * from {t}")).collect::<Vec<_>>().join(" union all ");
        let view_name = Self::fqtn_in("all", table_name);
        let mut conn = self.pool.get()?;
        conn.batch_execute("create schema if not exists \"all\"")?;
        conn.batch_execute(&format!("create or replace view {view_name} as {unions}"))?;
        Ok(())
    }
}

impl Backend for ServerBackend {
    fn insert(&self, table_name: &str, data: &Value, audit: bool) -> SqurilResult<()> {
        if self.is_audit_table(table_name) {
            return Err(SqurilError::operation_not_permitted("audit tables cannot be inserted into directly"));
        }
        let rows: Vec<Value> = match data {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![data.clone()],
            _ => return Err(SqurilError::parse("insert payload must be an object or array of objects")),
        };

        let mut conn = self.pool.get()?;
        crate::session::with_server_session(&mut conn, |tx| {
            Self::create_table(tx, &self.schema, table_name)?;
            Self::insert_rows(tx, &self.schema, table_name, &rows)?;
            if audit {
                let tsc = self.audit_transaction(None);
                let events: Vec<AuditEvent> = rows.iter().map(|row| tsc.event_create(row.clone())).collect();
                Self::insert_audit_events(tx, &self.schema, table_name, &events)?;
            }
            Ok(())
        })?;
        if self.config.update_all_view {
            self.rebuild_all_view(table_name)?;
        }
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
            let mut conn = self.pool.get()?;
            crate::session::with_server_session(&mut conn, |tx| {
                let tsc = self.audit_transaction(None);
                Self::insert_audit_events(tx, &self.schema, table_name, &[tsc.event_read(uri_query)])
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
        let dialect = ServerDialect;
        let generated = generator::generate(&dialect, &self.fqtn(table_name), &query, None, None, false, None)?;
        let previous_rows = if audit {
            self.run_select(table_name, uri_query, None)?
        } else {
            Vec::new()
        };

        let mut conn = self.pool.get()?;
        crate::session::with_server_session(&mut conn, |tx| {
            tx.batch_execute(&generated.delete_query)?;
            if audit {
                let tsc = self.audit_transaction(query.message.clone());
                let events: Vec<AuditEvent> = previous_rows
                    .iter()
                    .map(|previous| tsc.event_delete(previous.clone(), uri_query))
                    .collect();
                Self::insert_audit_events(tx, &self.schema, table_name, &events)?;
            }
            Ok(())
        })?;
        if self.config.update_all_view {
            self.rebuild_all_view(table_name)?;
        }
        Ok(())
    }

    fn alter(&self, table_name: &str, uri_query: &str) -> SqurilResult<AlterReport> {
        if self.is_audit_table(table_name) {
            return Err(SqurilError::operation_not_permitted("audit tables cannot be altered directly"));
        }
        let query = parser::parse(table_name, uri_query)?;
        let dialect = ServerDialect;
        let name_func = |new_name: &str| Self::fqtn_in(&self.schema, new_name);
        let generated = generator::generate(&dialect, &self.fqtn(table_name), &query, None, None, false, Some(&name_func))?;
        let Some(alter_sql) = generated.alter_query else {
            return Ok(AlterReport { tables: vec![table_name.to_string()] });
        };

        let mut altered = vec![table_name.to_string()];
        {
            let mut conn = self.pool.get()?;
            crate::session::with_server_session(&mut conn, |tx| {
                tx.batch_execute(&alter_sql)?;
                Ok(())
            })?;
        }

        let audit_table = crate::audit::audit_table_name(table_name);
        let audit_new_name = crate::audit::audit_table_name(&query.alter.as_ref().expect("checked above").new_name);
        let audit_alter_sql = format!(
            "alter table {} rename to \"{}\"",
            Self::fqtn_in(&self.schema, &audit_table),
            audit_new_name
        );
        let renamed_audit = {
            let mut conn = self.pool.get()?;
            crate::session::with_server_session(&mut conn, |tx| {
                tx.batch_execute(&audit_alter_sql).map_err(SqurilError::from)?;
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
            let mut conn = self.pool.get()?;
            crate::session::with_server_session(&mut conn, |tx| {
                Self::create_table(tx, &self.schema, table_name)?;
                Ok(())
            })?;
        }

        for action in actions {
            match action {
                restore::RestoreAction::Reinsert { previous } => {
                    let mut conn = self.pool.get()?;
                    crate::session::with_server_session(&mut conn, |tx| {
                        Self::insert_rows(tx, &self.schema, table_name, std::slice::from_ref(&previous))?;
                        Self::insert_audit_events(
                            tx,
                            &self.schema,
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
        let mut conn = self.pool.get()?;
        let like_filter = table_like.map(|pattern| format!("and table_name like '{pattern}'")).unwrap_or_default();
        let sql = format!(
            "select table_name from information_schema.tables where table_schema = $1 {like_filter} order by table_name asc"
        );
        let rows = conn.query(&sql, &[&self.schema])?;
        Ok(rows.into_iter().map(|row| row.get::<_, String>(0)).collect())
    }
}
