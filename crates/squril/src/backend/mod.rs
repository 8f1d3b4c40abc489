//! Backend facade: the operations a caller performs against a table,
//! implemented once per storage engine (`embedded`, `server`).

pub mod embedded;
pub mod server;

pub use embedded::EmbeddedBackend;
pub use server::ServerBackend;

use serde_json::Value;

use crate::error::SqurilResult;
use crate::models::{AlterReport, RestoreReport};

/// Shared contract both storage engines implement. Methods take `&self`
/// because each backend owns its interior mutability (a `Mutex` around the
/// SQLite connection, an `r2d2::Pool` for PostgreSQL) — callers never need
/// `&mut`.
pub trait Backend {
    /// Insert one or many rows. Creates the table on first use; duplicate
    /// rows (by content) are silently ignored; optionally appends `create`
    /// audit events.
    fn insert(&self, table_name: &str, data: &Value, audit: bool) -> SqurilResult<()>;

    /// Run a `select=`/`where=`/`order=`/`range=`/`group_by=` query and
    /// collect the matching rows.
    fn select(&self, table_name: &str, uri_query: &str, audit: bool) -> SqurilResult<Vec<Value>>;

    /// Apply a `set=` update to every row matching `where=`.
    fn update(&self, table_name: &str, uri_query: &str, data: &Value) -> SqurilResult<()>;

    /// Delete rows matching `where=`, or drop the table if `where=` is
    /// absent. Appends `delete` audit events unless `audit` is false.
    fn delete(&self, table_name: &str, uri_query: &str, audit: bool) -> SqurilResult<()>;

    /// Rename a table (and its audit table, if present).
    fn alter(&self, table_name: &str, uri_query: &str) -> SqurilResult<AlterReport>;

    /// Replay audit history to undo updates/deletes.
    fn restore(&self, table_name: &str, uri_query: &str) -> SqurilResult<RestoreReport>;

    /// List tables known to the backend (used to resolve `*`/`,` table
    /// expressions in a select).
    fn tables_list(&self, table_like: Option<&str>) -> SqurilResult<Vec<String>>;
}
