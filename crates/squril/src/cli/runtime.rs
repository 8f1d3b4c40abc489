//! Resolves the CLI's global flags into a concrete [`Backend`], and reads
//! JSON payload arguments (either a literal or an `@path` file reference).

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;

use crate::backend::{Backend, EmbeddedBackend, ServerBackend};
use crate::cli::app::BackendArgs;
use crate::config::BackendConfig;

pub fn build_backend(args: &BackendArgs) -> Result<Box<dyn Backend>> {
    let mut config = BackendConfig::default();
    config.backup_days = args.backup_days;
    config.update_all_view = args.update_all_view;
    config.schema_prefix = args.schema.clone();

    match (&args.db_path, &args.host) {
        (Some(db_path), None) => {
            let backend = EmbeddedBackend::open(db_path, config)
                .map_err(|err| anyhow!(err))
                .with_context(|| format!("opening embedded store at {}", db_path.display()))?
                .with_requestor(args.requestor.clone(), args.requestor_name.clone());
            Ok(Box::new(backend))
        }
        (None, Some(host)) => {
            let mut dsn = format!("host={host} port={} dbname={} user={}", args.port, args.dbname, args.user);
            if let Some(password) = &args.password {
                dsn.push_str(&format!(" password={password}"));
            }
            let manager = PostgresConnectionManager::new(dsn.parse()?, postgres::NoTls);
            let pool = Pool::new(manager).context("building the server connection pool")?;
            let backend = ServerBackend::new(pool, config)
                .map_err(|err| anyhow!(err))?
                .with_schema_pattern(args.schema_pattern.clone())
                .with_requestor(args.requestor.clone(), args.requestor_name.clone());
            Ok(Box::new(backend))
        }
        (Some(_), Some(_)) => Err(anyhow!("pass either --db-path or --host, not both")),
        (None, None) => Err(anyhow!("pass --db-path (embedded) or --host (server)")),
    }
}

/// Read a JSON payload argument: `@path` reads a file, anything else is
/// parsed as a literal JSON value.
pub fn read_json_payload(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(PathBuf::from(path))
            .with_context(|| format!("reading payload file {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).with_context(|| format!("parsing JSON payload: {raw}"))
}
