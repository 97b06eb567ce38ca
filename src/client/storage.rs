use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

/// Durable client-side key/value storage, scoped per installation.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// JSON object file rewritten on every mutation.
#[derive(Clone)]
pub struct FileKvStore {
    path: PathBuf,
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl FileKvStore {
    pub fn new(path: PathBuf) -> Self {
        let inner = Self::load_from_disk(&path).unwrap_or_default();
        Self {
            path,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn load_from_disk(path: &PathBuf) -> Option<BTreeMap<String, String>> {
        let txt = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&txt) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("client storage {} is unreadable, starting empty: {e}", path.display());
                None
            }
        }
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let txt = serde_json::to_string_pretty(data).map_err(|e| e.to_string())?;
        std::fs::write(&self.path, txt).map_err(|e| e.to_string())?;
        Ok(())
    }

    fn persist_or_warn(&self, data: &BTreeMap<String, String>) {
        if let Err(e) = self.persist(data) {
            log::warn!("client storage persist failed ({}): {e}", self.path.display());
        }
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut data = self.inner.lock();
        data.insert(key.to_string(), value.to_string());
        self.persist_or_warn(&data);
    }

    fn remove(&self, key: &str) {
        let mut data = self.inner.lock();
        if data.remove(key).is_some() {
            self.persist_or_warn(&data);
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.inner.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.inner.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_survives_reopen() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("nested").join("storage.json");

        let store = FileKvStore::new(path.clone());
        store.set("cgpt_thread_id", "thread-1");
        store.set("other", "x");
        store.remove("other");

        let reopened = FileKvStore::new(path);
        assert_eq!(reopened.get("cgpt_thread_id").as_deref(), Some("thread-1"));
        assert_eq!(reopened.get("other"), None);
    }

    #[test]
    fn corrupt_file_loads_empty_and_is_replaced_on_write() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileKvStore::new(path.clone());
        assert_eq!(store.get("anything"), None);
        store.set("k", "v");

        let reopened = FileKvStore::new(path);
        assert_eq!(reopened.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn memory_store_clones_share_state() {
        let a = MemoryKvStore::new();
        let b = a.clone();
        a.set("k", "v");
        assert_eq!(b.get("k").as_deref(), Some("v"));
        b.remove("k");
        assert_eq!(a.get("k"), None);
    }
}
