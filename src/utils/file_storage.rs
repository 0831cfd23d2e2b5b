//! File-backed storage for single-host deployments

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::traits::*;
use crate::types::*;

const TMP_SUFFIX: &str = "tmp";
const LOCK_SUFFIX: &str = "lock";

#[derive(Debug, Default, Serialize, Deserialize)]
struct BindingFile {
    bindings: Vec<Binding>,
}

#[derive(Debug, Default)]
struct BindingTable {
    order: Vec<Binding>,
    index: HashMap<String, String>,
}

/// Binding store kept in one JSON file
///
/// The whole table is loaded on open and the file is rewritten through a
/// temporary file and a rename on every `put`, so a crash leaves either the
/// old or the new table on disk.
///
/// Because `put` rewrites the file from the loaded table, a store that writes
/// must have been opened while its process already held the store's
/// [`FileLease`]. [`JsonBindingStore::open_exclusive`] does both in that order.
#[derive(Debug, Clone)]
pub struct JsonBindingStore {
    path: PathBuf,
    table: Arc<RwLock<BindingTable>>,
    lease: Option<Arc<FileLease>>,
}

impl JsonBindingStore {
    /// Open the store, creating an empty table if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        Self::load(path.into(), None)
    }

    /// Take the cross-process lease, then load the table
    ///
    /// The lease is held for as long as any clone of the store is alive. Fails
    /// with `RunInProgress` when another process holds it.
    pub fn open_exclusive(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let lease = FileLease::acquire(Self::lock_path_for(&path))?;
        Self::load(path, Some(Arc::new(lease)))
    }

    fn load(path: PathBuf, lease: Option<Arc<FileLease>>) -> SyncResult<Self> {
        let file: BindingFile = match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BindingFile::default(),
            Err(e) => return Err(SyncError::StoreUnavailable(format!("{}: {e}", path.display()))),
        };

        let index = file
            .bindings
            .iter()
            .map(|b| (b.source_id.clone(), b.destination_id.clone()))
            .collect();
        debug!(path = %path.display(), count = file.bindings.len(), "opened binding store");

        Ok(Self {
            path,
            table: Arc::new(RwLock::new(BindingTable {
                order: file.bindings,
                index,
            })),
            lease,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All bindings in the order they were written
    pub fn bindings(&self) -> SyncResult<Vec<Binding>> {
        Ok(self
            .table
            .read()
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?
            .order
            .clone())
    }

    /// Path of the lock file guarding this store across processes
    pub fn lock_path(&self) -> PathBuf {
        Self::lock_path_for(&self.path)
    }

    /// Lock file path for a store at `path`, known before the store is opened
    pub fn lock_path_for(path: &Path) -> PathBuf {
        sibling(path, LOCK_SUFFIX)
    }

    /// Whether this store holds the cross-process lease
    pub fn is_exclusive(&self) -> bool {
        self.lease.is_some()
    }
}

#[async_trait]
impl BindingStore for JsonBindingStore {
    fn identity(&self) -> String {
        format!("json:{}", self.path.display())
    }

    async fn contains(&self, source_id: &str) -> SyncResult<bool> {
        Ok(self
            .table
            .read()
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?
            .index
            .contains_key(source_id))
    }

    async fn get(&self, source_id: &str) -> SyncResult<Option<String>> {
        Ok(self
            .table
            .read()
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?
            .index
            .get(source_id)
            .cloned())
    }

    async fn put(&self, source_id: &str, destination_id: &str) -> SyncResult<()> {
        let write_failed = |reason: String| SyncError::StoreWriteFailed {
            source_id: source_id.to_string(),
            reason,
        };

        let mut table = self.table.write().map_err(|e| write_failed(e.to_string()))?;
        if let Some(existing) = table.index.get(source_id) {
            if existing == destination_id {
                return Ok(());
            }
            return Err(write_failed(format!("already bound to {existing}")));
        }

        let mut order = table.order.clone();
        order.push(Binding::new(source_id, destination_id));
        let data = serde_json::to_string_pretty(&BindingFile { bindings: order })
            .map_err(|e| write_failed(e.to_string()))?;
        write_atomic(&self.path, &data).map_err(|e| write_failed(e.to_string()))?;

        // Only visible once durable
        table
            .order
            .push(Binding::new(source_id, destination_id));
        table
            .index
            .insert(source_id.to_string(), destination_id.to_string());
        Ok(())
    }
}

/// Object store keeping one file per blob inside a directory
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    /// Open the store, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> SyncResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| SyncError::ObjectStore(format!("{}: {e}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> SyncResult<PathBuf> {
        validate_blob_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ObjectStore for DirObjectStore {
    async fn put_text(&self, name: &str, text: &str) -> SyncResult<()> {
        let path = self.blob_path(name)?;
        write_atomic(&path, text)
            .map_err(|e| SyncError::ObjectStore(format!("{}: {e}", path.display())))
    }

    async fn get_text(&self, name: &str) -> SyncResult<Option<String>> {
        let path = self.blob_path(name)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::ObjectStore(format!("{}: {e}", path.display()))),
        }
    }

    async fn exists(&self, name: &str) -> SyncResult<bool> {
        Ok(self.blob_path(name)?.is_file())
    }
}

/// Exclusive lock file shared by every process using the same store
///
/// The file is created with create-new semantics and removed on drop. A
/// process killed mid-run leaves the file behind; it has to be removed by
/// hand after checking that no run is active.
#[derive(Debug)]
pub struct FileLease {
    path: PathBuf,
}

impl FileLease {
    pub fn acquire(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SyncError::RunInProgress(path.display().to_string()));
            }
            Err(e) => {
                return Err(SyncError::StoreUnavailable(format!("{}: {e}", path.display())));
            }
        };
        // The pid is informational only
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!(path = %path.display(), error = %e, "could not write pid to lock file");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "could not remove lock file");
        }
    }
}

fn validate_blob_name(name: &str) -> SyncResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(SyncError::Validation(format!("invalid blob name: {name:?}")));
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn write_atomic(path: &Path, data: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = sibling(path, TMP_SUFFIX);
    let mut file = File::create(&tmp)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.json");

        let store = JsonBindingStore::open(&path).unwrap();
        store.put("a", "1").await.unwrap();
        store.put("b", "2").await.unwrap();

        let reopened = JsonBindingStore::open(&path).unwrap();
        assert!(reopened.contains("a").await.unwrap());
        assert_eq!(reopened.get("b").await.unwrap(), Some("2".to_string()));
        assert_eq!(reopened.bindings().unwrap(), store.bindings().unwrap());
        assert_eq!(reopened.identity(), store.identity());
    }

    #[tokio::test]
    async fn test_json_store_rejects_rebinding() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonBindingStore::open(dir.path().join("bindings.json")).unwrap();
        store.put("a", "1").await.unwrap();

        let err = store.put("a", "2").await.unwrap_err();
        assert!(matches!(err, SyncError::StoreWriteFailed { .. }));
    }

    #[tokio::test]
    async fn test_json_store_write_failure_leaves_table_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail
        let path = dir.path().join("bindings.json");
        fs::create_dir(&path).unwrap();
        let store = JsonBindingStore {
            path: path.clone(),
            table: Arc::new(RwLock::new(BindingTable::default())),
            lease: None,
        };

        let err = store.put("a", "1").await.unwrap_err();
        assert!(matches!(err, SyncError::StoreWriteFailed { .. }));
        assert!(!store.contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_exclusive_open_sees_previous_holders_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.json");

        let first = JsonBindingStore::open_exclusive(&path).unwrap();
        assert!(first.is_exclusive());
        // A second process cannot load a snapshot while the first one writes
        assert!(matches!(
            JsonBindingStore::open_exclusive(&path),
            Err(SyncError::RunInProgress(_))
        ));
        first.put("A", "dest-A").await.unwrap();
        drop(first);

        let second = JsonBindingStore::open_exclusive(&path).unwrap();
        assert!(second.contains("A").await.unwrap());
        second.put("B", "dest-B").await.unwrap();
        drop(second);

        let reopened = JsonBindingStore::open(&path).unwrap();
        let ids: Vec<_> = reopened
            .bindings()
            .unwrap()
            .into_iter()
            .map(|b| b.source_id)
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(!JsonBindingStore::lock_path_for(&path).exists());
    }

    #[test]
    fn test_exclusive_open_holds_lease_while_clones_live() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.json");
        let lock = JsonBindingStore::lock_path_for(&path);

        let store = JsonBindingStore::open_exclusive(&path).unwrap();
        let clone = store.clone();
        assert_eq!(store.lock_path(), lock);
        drop(store);
        assert!(lock.exists());
        drop(clone);
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn test_dir_object_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirObjectStore::open(dir.path().join("info")).unwrap();

        assert_eq!(store.get_text("balance").await.unwrap(), None);
        store.put_text("balance", "42.10").await.unwrap();
        assert_eq!(store.get_text("balance").await.unwrap(), Some("42.10".to_string()));
        assert!(store.exists("balance").await.unwrap());

        assert!(matches!(
            store.put_text("../escape", "x").await,
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_file_lease_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.json.lock");

        let lease = FileLease::acquire(&path).unwrap();
        assert!(matches!(
            FileLease::acquire(&path),
            Err(SyncError::RunInProgress(_))
        ));

        drop(lease);
        assert!(!path.exists());
        assert!(FileLease::acquire(&path).is_ok());
    }
}
