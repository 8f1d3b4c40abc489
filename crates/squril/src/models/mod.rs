//! Shared value types that cross the engine boundary.

use serde_json::Value;

/// A document row is a single JSON object. Array/scalar payloads are
/// rejected at the backend boundary — only [`Value::Object`] is insertable.
pub type Document = Value;

/// What a `restore` call actually did, returned to the caller for
/// observability.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RestoreReport {
    pub restored: Vec<Value>,
    pub updated: Vec<Value>,
}

/// What an `alter` (rename) call did.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlterReport {
    pub tables: Vec<String>,
}
