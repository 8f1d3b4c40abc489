//! Audit events: every mutation is recorded in an immutable sibling table
//! named `<table>_audit`, shared by one `transaction_id` per logical call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// The separator and suffix used to derive an audit table's name from its
/// source table's name. Configurable only in principle — kept as constants
/// here since every caller in this codebase uses the defaults.
pub const AUDIT_SEPARATOR: &str = "_";
pub const AUDIT_SUFFIX: &str = "audit";

#[must_use]
pub fn audit_table_name(table_name: &str) -> String {
    format!("{table_name}{AUDIT_SEPARATOR}{AUDIT_SUFFIX}")
}

/// Strip a `_audit` suffix back to the source table name, if present.
#[must_use]
pub fn audit_table_source(table_name: &str) -> Option<&str> {
    table_name.strip_suffix(&format!("{AUDIT_SEPARATOR}{AUDIT_SUFFIX}"))
}

/// Name-only check — whether `table_name` has the shape of an audit table.
/// Combine with [`looks_like_audit_event`] on a sample row for a stronger
/// content-based determination.
#[must_use]
pub fn is_audit_table_name(table_name: &str) -> bool {
    table_name.ends_with(&format!("{AUDIT_SEPARATOR}{AUDIT_SUFFIX}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEventKind {
    Update,
    Delete,
    Restore,
    Create,
    Read,
}

impl AuditEventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Restore => "restore",
            Self::Create => "create",
            Self::Read => "read",
        }
    }
}

/// One row of an audit table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub diff: Option<Value>,
    pub previous: Option<Value>,
    pub event: String,
    pub timestamp: String,
    pub identity: Option<String>,
    pub identity_name: Option<String>,
    pub event_id: String,
    pub transaction_id: String,
    pub query: Option<String>,
    pub message: Option<String>,
}

/// Holds the identity/timestamp/transaction-id shared by every audit event
/// produced within one logical library call (e.g. one `table_update`).
pub struct AuditTransaction {
    identity: Option<String>,
    identity_name: Option<String>,
    timestamp: String,
    transaction_id: String,
    message: Option<String>,
}

impl AuditTransaction {
    #[must_use]
    pub fn new(identity: Option<String>, message: Option<String>, identity_name: Option<String>) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.to_string());
        Self {
            identity,
            identity_name,
            timestamp,
            transaction_id: Uuid::new_v4().to_string(),
            message,
        }
    }

    #[must_use]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    fn event(&self, diff: Option<Value>, previous: Option<Value>, kind: AuditEventKind, query: Option<String>) -> AuditEvent {
        AuditEvent {
            diff,
            previous,
            event: kind.as_str().to_string(),
            timestamp: self.timestamp.clone(),
            identity: self.identity.clone(),
            identity_name: self.identity_name.clone(),
            event_id: Uuid::new_v4().to_string(),
            transaction_id: self.transaction_id.clone(),
            query,
            message: self.message.clone(),
        }
    }

    #[must_use]
    pub fn event_update(&self, diff: Value, previous: Value, query: &str) -> AuditEvent {
        self.event(Some(diff), Some(previous), AuditEventKind::Update, Some(query.to_string()))
    }

    #[must_use]
    pub fn event_delete(&self, previous: Value, query: &str) -> AuditEvent {
        self.event(None, Some(previous), AuditEventKind::Delete, Some(query.to_string()))
    }

    #[must_use]
    pub fn event_restore(&self, diff: Value, previous: Option<Value>, query: &str) -> AuditEvent {
        self.event(Some(diff), previous, AuditEventKind::Restore, Some(query.to_string()))
    }

    #[must_use]
    pub fn event_create(&self, diff: Value) -> AuditEvent {
        self.event(Some(diff), None, AuditEventKind::Create, None)
    }

    #[must_use]
    pub fn event_read(&self, query: &str) -> AuditEvent {
        self.event(None, None, AuditEventKind::Read, Some(query.to_string()))
    }
}

/// Keys present in every audit event, used by the content probe to reject
/// rows that merely look schema-compatible by accident.
const AUDIT_EVENT_KEYS: &[&str] = &[
    "diff",
    "previous",
    "event",
    "timestamp",
    "identity",
    "identity_name",
    "event_id",
    "transaction_id",
    "query",
    "message",
];

/// Content probe: does a sample row look like it was produced by
/// [`AuditTransaction`]? Used alongside [`is_audit_table_name`] so that a
/// user table merely named `..._audit` by coincidence is not mistaken for
/// one of ours.
#[must_use]
pub fn looks_like_audit_event(row: &Value) -> bool {
    let Some(object) = row.as_object() else {
        return false;
    };
    if !object.keys().all(|key| AUDIT_EVENT_KEYS.contains(&key.as_str())) {
        return false;
    }
    let Some(event_id) = object.get("event_id").and_then(Value::as_str) else {
        return false;
    };
    let Some(transaction_id) = object.get("transaction_id").and_then(Value::as_str) else {
        return false;
    };
    if Uuid::parse_str(event_id).is_err() || Uuid::parse_str(transaction_id).is_err() {
        return false;
    }
    let known_kind = object
        .get("event")
        .and_then(Value::as_str)
        .map(|event| matches!(event, "update" | "delete" | "restore" | "create" | "read"))
        .unwrap_or(false);
    known_kind && object.get("timestamp").and_then(Value::as_str).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn audit_table_name_appends_suffix() {
        assert_eq!(audit_table_name("people"), "people_audit");
    }

    #[test]
    fn audit_table_source_strips_suffix() {
        assert_eq!(audit_table_source("people_audit"), Some("people"));
        assert_eq!(audit_table_source("people"), None);
    }

    #[test]
    fn transaction_shares_one_id_across_events() {
        let tsc = AuditTransaction::new(Some("alice".into()), None, None);
        let a = tsc.event_update(json!({"a": 1}), json!({"a": 0}), "set=a&where=id=eq.1");
        let b = tsc.event_delete(json!({"a": 1}), "where=id=eq.1");
        assert_eq!(a.transaction_id, b.transaction_id);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn probe_accepts_real_event_and_rejects_plain_row() {
        let tsc = AuditTransaction::new(None, None, None);
        let event = tsc.event_read("select=a");
        let encoded = serde_json::to_value(&event).unwrap();
        assert!(looks_like_audit_event(&encoded));
        assert!(!looks_like_audit_event(&json!({"a": 1, "b": 2})));
    }
}
