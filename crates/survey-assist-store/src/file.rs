//! File-backed session store: one JSON document per session under a
//! directory. Writes go through a temp file in the same directory and are
//! renamed into place, so readers see either the old or the new state.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{SessionStore, StoreError, Versioned, check_version};

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u64,
    state: serde_json::Value,
}

pub struct FileStore<S> {
    dir: PathBuf,
    // Serialises read-compare-write within this process.
    write_lock: Mutex<()>,
    _state: PhantomData<fn() -> S>,
}

impl<S> FileStore<S> {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        info!(dir = %dir.display(), "opened file session store");
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
            _state: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, token: &str) -> Result<PathBuf, StoreError> {
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidToken(token.to_string()));
        }
        Ok(self.dir.join(format!("{token}.json")))
    }

    async fn read_envelope(path: &Path) -> Result<Option<Envelope>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl<S> SessionStore<S> for FileStore<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self, token: &str) -> Result<Option<Versioned<S>>, StoreError> {
        let path = self.path_for(token)?;
        match Self::read_envelope(&path).await? {
            Some(env) => Ok(Some(Versioned {
                version: env.version,
                state: serde_json::from_value(env.state)?,
            })),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        token: &str,
        expected_version: Option<u64>,
        state: &S,
    ) -> Result<u64, StoreError> {
        let path = self.path_for(token)?;
        let state = serde_json::to_value(state)?;

        let _guard = self.write_lock.lock().await;
        let actual = Self::read_envelope(&path).await?.map(|env| env.version);
        let version = check_version(token, expected_version, actual)?;

        let bytes = serde_json::to_vec_pretty(&Envelope { version, state })?;
        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
            .await
            .map_err(|e| StoreError::Other(format!("session write task failed: {e}")))??;

        debug!(token, version, path = %path.display(), "session saved");
        Ok(version)
    }

    async fn remove(&self, token: &str) -> Result<(), StoreError> {
        let path = self.path_for(token)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Answers {
        items: Vec<String>,
    }

    fn answers(items: &[&str]) -> Answers {
        Answers {
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::<Answers>::open(dir.path()).unwrap();
            store.save("sess-1", None, &answers(&["farmer"])).await.unwrap();
        }
        let store = FileStore::<Answers>::open(dir.path()).unwrap();
        let loaded = store.load("sess-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.state, answers(&["farmer"]));
    }

    #[tokio::test]
    async fn compare_and_swap_rejects_stale_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::<Answers>::open(dir.path()).unwrap();
        store.save("s", None, &answers(&["a"])).await.unwrap();
        assert_eq!(store.save("s", Some(1), &answers(&["a", "b"])).await.unwrap(), 2);

        let err = store.save("s", Some(1), &answers(&["c"])).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.load("s").await.unwrap().unwrap().state.items.len(), 2);
    }

    #[tokio::test]
    async fn rejects_path_like_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::<Answers>::open(dir.path()).unwrap();
        assert!(matches!(
            store.load("../etc/passwd").await,
            Err(StoreError::InvalidToken(_))
        ));
        assert!(matches!(store.load("").await, Err(StoreError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::<Answers>::open(dir.path()).unwrap();
        store.save("s", None, &answers(&[])).await.unwrap();
        store.remove("s").await.unwrap();
        store.remove("s").await.unwrap();
        assert!(store.load("s").await.unwrap().is_none());
        assert!(!dir.path().join("s.json").exists());
    }
}
