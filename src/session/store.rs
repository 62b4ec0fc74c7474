//! Session table.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata recorded by `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Free-form `clientInfo` as sent by the client.
    #[serde(default)]
    pub client_info: Map<String, Value>,
}

impl Session {
    fn new(id: String, client_info: Map<String, Value>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            client_info,
        }
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_info.get("name").and_then(Value::as_str)
    }
}

/// Thread-safe session table.
///
/// Sessions are never expired; they live until [`SessionStore::remove`] or
/// [`SessionStore::clear`].
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the session for `id`.
    pub fn initialize(&self, id: impl Into<String>, client_info: Map<String, Value>) -> Session {
        let session = Session::new(id.into(), client_info);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id.clone(), session.clone());
        session
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Drop every session.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
