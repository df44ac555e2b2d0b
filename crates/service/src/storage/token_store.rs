use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::storage::json_map_store::JsonMapStore;

/// Opaque bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self { Self(token.into()) }

    pub fn expose(&self) -> &str { &self.0 }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Holder of the single persisted bearer credential.
///
/// Implementations are synchronous so logout can clear the credential
/// without suspending.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<Credential>;
    fn save(&self, credential: &Credential) -> Result<(), ServiceError>;
    fn clear(&self) -> Result<(), ServiceError>;
}

/// File-backed credential store; survives process restarts.
/// The credential lives under a well-known key inside a JSON map.
pub struct JsonTokenStore {
    store: Arc<JsonMapStore<String, Credential>>,
    key: String,
}

impl JsonTokenStore {
    /// Open (or create) the store file at `path`, keeping the credential under `key`.
    pub fn open<P: Into<PathBuf>>(path: P, key: impl Into<String>) -> Result<Self, ServiceError> {
        let store = JsonMapStore::<String, Credential>::open(path)?;
        Ok(Self { store, key: key.into() })
    }
}

impl TokenStore for JsonTokenStore {
    fn load(&self) -> Option<Credential> {
        self.store.get(&self.key)
    }

    fn save(&self, credential: &Credential) -> Result<(), ServiceError> {
        self.store.insert(self.key.clone(), credential.clone())
    }

    fn clear(&self) -> Result<(), ServiceError> {
        self.store.remove(&self.key).map(|_| ())
    }
}

/// Process-local store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn with_credential(credential: Credential) -> Self {
        Self { slot: Mutex::new(Some(credential)) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<Credential> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), ServiceError> {
        let mut slot = self.slot.lock().map_err(|_| ServiceError::Storage("token slot poisoned".into()))?;
        *slot = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ServiceError> {
        let mut slot = self.slot.lock().map_err(|_| ServiceError::Storage("token slot poisoned".into()))?;
        *slot = None;
        Ok(())
    }
}
