use thiserror::Error;

/// Errors surfaced by the rank ledger.
///
/// Codec-level normalization never produces one of these: out-of-range
/// counts, degrees and malformed patterns are clamped in place. Only the
/// belt/mode check in the transition engine and the persistence boundary fail.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("member not found: {0}")]
    MemberNotFound(String),

    #[error("member already exists: {0}")]
    MemberExists(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RankError {
    /// True for failures of the storage layer, whatever their origin.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            RankError::PersistenceFailure(_) | RankError::Sqlite(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RankError>;
