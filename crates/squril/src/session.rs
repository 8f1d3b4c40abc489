//! Scoped sessions: every mutating backend call runs inside a transaction
//! that commits on success and rolls back on error, mirroring the original
//! `sqlite_session`/`postgres_session` context managers.

use crate::error::SqurilResult;

/// Run `f` inside a SQLite transaction, committing on `Ok` and relying on
/// `Transaction::drop` to roll back on `Err` or panic.
pub fn with_embedded_session<T>(
    conn: &mut rusqlite::Connection,
    f: impl FnOnce(&rusqlite::Transaction<'_>) -> SqurilResult<T>,
) -> SqurilResult<T> {
    let tx = conn.transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}

/// Run `f` inside a PostgreSQL transaction, committing on `Ok` and relying
/// on `Transaction::drop` to roll back on `Err` or panic.
pub fn with_server_session<T>(
    client: &mut postgres::Client,
    f: impl FnOnce(&mut postgres::Transaction<'_>) -> SqurilResult<T>,
) -> SqurilResult<T> {
    let mut tx = client.transaction()?;
    let result = f(&mut tx)?;
    tx.commit()?;
    Ok(result)
}
