//! Correlation identifiers and their generators.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier linking a request to its response.
///
/// JSON-RPC allows either a number or a string; both are accepted on the
/// way in and preserved on the way out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    String(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Number(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::String(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::String(value.to_string())
    }
}

/// Source of fresh request identifiers.
///
/// Implementations must not hand out the same identifier twice during the
/// lifetime of a session.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Id;
}

/// Random v4 UUIDs rendered without hyphens
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> Id {
        Id::String(uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Monotonically increasing numeric identifiers, starting at 1
#[derive(Debug, Default)]
pub struct SequentialIds {
    sequence_number: AtomicI64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> Id {
        // Use fetch_add return value to ensure atomicity
        let seq = self.sequence_number.fetch_add(1, Ordering::SeqCst) + 1;
        Id::Number(seq)
    }
}
