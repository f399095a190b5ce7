#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),
    #[error("invalid id {id:?}: {reason}")]
    InvalidId { id: String, reason: &'static str },
    #[error("retention policy violation: {reason} (cutoff={cutoff}, now={now})")]
    RetentionPolicyViolation {
        reason: &'static str,
        cutoff: i64,
        now: i64,
    },
}

impl StoreError {
    /// True for failures raised by the store itself rather than by a
    /// malformed request.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Sql(_))
    }
}
