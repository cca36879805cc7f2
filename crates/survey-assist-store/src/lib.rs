//! Session persistence: in-memory and one-JSON-file-per-session stores, both
//! with versioned compare-and-swap writes.

mod error;
mod file;
mod memory;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A stored value with the version it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<S> {
    pub version: u64,
    pub state: S,
}

/// Per-session state storage keyed by an opaque session token.
///
/// `save` only succeeds when the stored version still equals
/// `expected_version` (`None` meaning "no session stored yet"), so two
/// requests racing on one session cannot both commit.
#[async_trait]
pub trait SessionStore<S>: Send + Sync
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self, token: &str) -> Result<Option<Versioned<S>>, StoreError>;

    /// Returns the new version on success.
    async fn save(
        &self,
        token: &str,
        expected_version: Option<u64>,
        state: &S,
    ) -> Result<u64, StoreError>;

    async fn remove(&self, token: &str) -> Result<(), StoreError>;
}

pub(crate) fn check_version(
    token: &str,
    expected: Option<u64>,
    actual: Option<u64>,
) -> Result<u64, StoreError> {
    if expected != actual {
        return Err(StoreError::Conflict {
            token: token.to_string(),
            expected,
            actual,
        });
    }
    Ok(actual.map_or(1, |v| v + 1))
}
