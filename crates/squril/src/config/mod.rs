//! Ambient configuration: how an audit table is named, how long audit
//! history is retained, and how a backend connection is reached.

use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::audit::{AUDIT_SEPARATOR, AUDIT_SUFFIX};

/// Behavioral knobs shared by both backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub audit_sep: String,
    pub audit_suffix: String,
    /// Days of audit history to keep visible once the source table has
    /// been permanently dropped; `None` means keep everything.
    pub backup_days: Option<i64>,
    /// Whether to (re)define the cross-schema `all` union view after
    /// mutating operations.
    pub update_all_view: bool,
    /// Schema-name prefix used when qualifying table names (server dialect
    /// only; ignored by the embedded dialect).
    pub schema_prefix: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            audit_sep: AUDIT_SEPARATOR.to_string(),
            audit_suffix: AUDIT_SUFFIX.to_string(),
            backup_days: None,
            update_all_view: false,
            schema_prefix: None,
        }
    }
}

impl BackendConfig {
    #[must_use]
    pub fn audit_table(&self, table_name: &str) -> String {
        format!("{table_name}{}{}", self.audit_sep, self.audit_suffix)
    }

    #[must_use]
    pub fn is_audit_table(&self, table_name: &str) -> bool {
        table_name.ends_with(&format!("{}{}", self.audit_sep, self.audit_suffix))
    }
}

/// Where to find the embedded (SQLite) store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedConnection {
    pub db_path: PathBuf,
}

/// How to reach the server (PostgreSQL) store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConnection {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
}

impl ServerConnection {
    #[must_use]
    pub fn connection_string(&self) -> String {
        let mut dsn = format!(
            "host={} port={} dbname={} user={}",
            self.host, self.port, self.dbname, self.user
        );
        if let Some(password) = &self.password {
            dsn.push_str(&format!(" password={password}"));
        }
        dsn
    }
}

/// Resolve a `--db-path` CLI argument against `$HOME`, the same tilde- and
/// relative-path resolution the original runtime-paths resolver performs.
pub fn resolve_db_path(home_dir: &std::path::Path, cwd: &std::path::Path, raw: &str) -> Result<PathBuf> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    let path = std::path::Path::new(raw);
    let expanded = expand_tilde(path, home_dir);
    Ok(if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    })
}

fn expand_tilde(path: &std::path::Path, home_dir: &std::path::Path) -> PathBuf {
    use std::path::Component;
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            expanded
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_original_audit_naming() {
        let config = BackendConfig::default();
        assert_eq!(config.audit_table("people"), "people_audit");
        assert!(config.is_audit_table("people_audit"));
        assert!(!config.is_audit_table("people"));
    }

    #[test]
    fn resolves_tilde_db_path() {
        let path = resolve_db_path(
            std::path::Path::new("/home/tester"),
            std::path::Path::new("/work"),
            "~/data/squril.db",
        )
        .unwrap();
        assert_eq!(path, std::path::PathBuf::from("/home/tester/data/squril.db"));
    }

    #[test]
    fn server_connection_string_includes_password_when_set() {
        let conn = ServerConnection {
            host: "db.internal".into(),
            port: 5432,
            dbname: "squril".into(),
            user: "squril".into(),
            password: Some("secret".into()),
        };
        assert!(conn.connection_string().contains("password=secret"));
    }
}
