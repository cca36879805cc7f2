//! In-process session store. Values are kept serialised so a loaded state
//! never aliases what the caller is still mutating.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{SessionStore, StoreError, Versioned, check_version};

pub struct MemoryStore<S> {
    sessions: RwLock<HashMap<String, (u64, serde_json::Value)>>,
    _state: PhantomData<fn() -> S>,
}

impl<S> MemoryStore<S> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            _state: PhantomData,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl<S> Default for MemoryStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> SessionStore<S> for MemoryStore<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self, token: &str) -> Result<Option<Versioned<S>>, StoreError> {
        let sessions = self.sessions.read().await;
        match sessions.get(token) {
            Some((version, value)) => Ok(Some(Versioned {
                version: *version,
                state: serde_json::from_value(value.clone())?,
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
        let value = serde_json::to_value(state)?;
        let mut sessions = self.sessions.write().await;
        let actual = sessions.get(token).map(|(v, _)| *v);
        let next = check_version(token, expected_version, actual)?;
        sessions.insert(token.to_string(), (next, value));
        debug!(token, version = next, "session saved");
        Ok(next)
    }

    async fn remove(&self, token: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(token);
        Ok(())
    }
}
