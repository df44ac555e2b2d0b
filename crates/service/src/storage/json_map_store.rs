use std::{collections::HashMap, fs, hash::Hash, path::PathBuf, sync::{Arc, Mutex}};

use dashmap::DashMap;
use tracing::warn;

use crate::errors::ServiceError;

/// Generic JSON file-backed key-value map store.
///
/// Persists a map to a JSON file after every mutation. Writes go through a
/// temporary file and a rename so a crash never leaves a half-written store.
/// Operations are synchronous: the files involved are tiny and callers such
/// as logout must complete without yielding.
pub struct JsonMapStore<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, V>,
    file_path: PathBuf,
    write_lock: Mutex<()>,
}

impl<K, V> JsonMapStore<K, V>
where
    K: Eq + Hash + serde::Serialize + serde::de::DeserializeOwned + Clone,
    V: serde::Serialize + serde::de::DeserializeOwned + Clone,
{
    /// Open the store at `path`. Creates the file with an empty map if missing;
    /// an unreadable file is treated as empty.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Arc<Self>, ServiceError> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(ServiceError::storage)?;
            }
        }

        let mut inner = DashMap::new();
        match fs::read(&file_path) {
            Ok(bytes) => {
                let map: HashMap<K, V> = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                    warn!(path = %file_path.display(), error = %e, "discarding unreadable store file");
                    HashMap::new()
                });
                inner.extend(map);
            }
            Err(_) => {
                let empty: HashMap<K, V> = HashMap::new();
                fs::write(&file_path, serde_json::to_vec(&empty).map_err(ServiceError::storage)?)
                    .map_err(ServiceError::storage)?;
            }
        }

        Ok(Arc::new(Self { inner, file_path, write_lock: Mutex::new(()) }))
    }

    fn save(&self) -> Result<(), ServiceError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ServiceError::Storage("store write lock poisoned".into()))?;
        let snapshot: HashMap<K, V> = self
            .inner
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let data = serde_json::to_vec(&snapshot).map_err(ServiceError::storage)?;
        let tmp = self.file_path.with_extension("tmp");
        fs::write(&tmp, data).map_err(ServiceError::storage)?;
        fs::rename(&tmp, &self.file_path).map_err(ServiceError::storage)?;
        Ok(())
    }

    /// Get value by key.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|v| v.value().clone())
    }

    /// Insert or update a value by key and persist.
    pub fn insert(&self, key: K, value: V) -> Result<(), ServiceError> {
        self.inner.insert(key, value);
        self.save()
    }

    /// Remove a key and persist; returns whether it existed.
    pub fn remove(&self, key: &K) -> Result<bool, ServiceError> {
        let existed = self.inner.remove(key).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }
}
