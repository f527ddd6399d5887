//! Change notifications
//!
//! A row-level change reported by the store's notification channel. The
//! listener does not look inside: any event on a watched table means
//! "refetch", but the detail is kept for logging and for consumers that
//! want it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// One change on a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    #[serde(rename = "type", alias = "eventType")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    /// New row (INSERT / UPDATE)
    #[serde(default, alias = "new")]
    pub record: Option<serde_json::Value>,
    /// Previous row (UPDATE / DELETE, primary key only unless replica identity is full)
    #[serde(default, alias = "old")]
    pub old_record: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            kind,
            commit_timestamp: None,
            record: None,
            old_record: None,
        }
    }

    pub fn with_record(mut self, record: serde_json::Value) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_old_record(mut self, old_record: serde_json::Value) -> Self {
        self.old_record = Some(old_record);
        self
    }

    /// `id` of the affected row, when the payload carries one
    pub fn row_id(&self) -> Option<&str> {
        self.record
            .as_ref()
            .or(self.old_record.as_ref())
            .and_then(|row| row.get("id"))
            .and_then(|id| id.as_str())
    }
}
