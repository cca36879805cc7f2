use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict for session {token}: expected {expected:?}, found {actual:?}")]
    Conflict {
        token: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("invalid session token: {0:?}")]
    InvalidToken(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
