use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Documents,
    Queries,
    Reports,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Documents, Namespace::Queries, Namespace::Reports];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Documents => "documents",
            Namespace::Queries => "queries",
            Namespace::Reports => "reports",
        }
    }
}

/// Byte-level key/value storage behind the response cache.
pub trait KvStore: Send + Sync {
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<()>;
    fn exists(&self, namespace: Namespace, key: &str) -> Result<bool>;
}

/// One `<root>/<namespace>/<key>.json` file per entry.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Opens the store, creating every namespace directory up front.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let store = Self {
            root: root.as_ref().to_path_buf(),
        };
        for namespace in Namespace::ALL {
            fs::create_dir_all(store.namespace_dir(namespace))?;
        }
        Ok(store)
    }

    pub fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.as_str())
    }

    pub fn entry_path(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.namespace_dir(namespace).join(format!("{key}.json"))
    }
}

impl KvStore for FsStore {
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.entry_path(namespace, key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir)?;
        // Same-directory temp file so the rename stays atomic.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(value)?;
        tmp.flush()?;
        let path = self.entry_path(namespace, key);
        tmp.persist(&path)?;
        debug!(path = %path.display(), bytes = value.len(), "cache entry written");
        Ok(())
    }

    fn exists(&self, namespace: Namespace, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.entry_path(namespace, key).is_file())
    }
}

/// In-process store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(Namespace, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .get(&(namespace, key.to_string()))
            .cloned())
    }

    fn put(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .insert((namespace, key.to_string()), value.to_vec());
        Ok(())
    }

    fn exists(&self, namespace: Namespace, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .contains_key(&(namespace, key.to_string())))
    }
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(namespace, key)
    }

    fn put(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(namespace, key, value)
    }

    fn exists(&self, namespace: Namespace, key: &str) -> Result<bool> {
        (**self).exists(namespace, key)
    }
}

// Keys become file names; only hex digests are expected.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LedgerError::Store(format!("invalid cache key {key:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_namespace_dirs() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path().join("cache")).unwrap();
        for namespace in Namespace::ALL {
            assert!(store.namespace_dir(namespace).is_dir());
        }
        assert!(dir.path().join("cache/documents").is_dir());
        assert!(dir.path().join("cache/queries").is_dir());
        assert!(dir.path().join("cache/reports").is_dir());
    }

    #[test]
    fn fs_store_put_get_exists() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        assert!(!store.exists(Namespace::Queries, "abc123").unwrap());
        assert_eq!(store.get(Namespace::Queries, "abc123").unwrap(), None);

        store.put(Namespace::Queries, "abc123", b"{\"a\":1}").unwrap();
        assert!(store.exists(Namespace::Queries, "abc123").unwrap());
        assert!(!store.exists(Namespace::Reports, "abc123").unwrap());
        assert_eq!(
            store.get(Namespace::Queries, "abc123").unwrap().unwrap(),
            b"{\"a\":1}"
        );
        assert!(dir.path().join("queries/abc123.json").is_file());
    }

    #[test]
    fn fs_store_overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.put(Namespace::Documents, "k1", b"first").unwrap();
        store.put(Namespace::Documents, "k1", b"second").unwrap();
        assert_eq!(
            store.get(Namespace::Documents, "k1").unwrap().unwrap(),
            b"second"
        );
        let entries: Vec<_> = fs::read_dir(store.namespace_dir(Namespace::Documents))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn fs_store_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        assert!(store.put(Namespace::Documents, "../escape", b"x").is_err());
        assert!(store.get(Namespace::Documents, "").is_err());
    }

    #[test]
    fn memory_store_separates_namespaces() {
        let store = MemoryStore::new();
        store.put(Namespace::Documents, "k", b"doc").unwrap();
        store.put(Namespace::Reports, "k", b"report").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(Namespace::Documents, "k").unwrap().unwrap(), b"doc");
        assert!(!store.exists(Namespace::Queries, "k").unwrap());
    }
}
