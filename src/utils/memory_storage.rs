//! In-memory storage implementations for testing and development

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::traits::*;
use crate::types::*;

/// In-memory binding store
///
/// Clones share the same table and the same identity, so a clone handed to
/// the engine can be inspected from a test afterwards.
#[derive(Debug, Clone)]
pub struct MemoryBindingStore {
    identity: String,
    bindings: Arc<RwLock<HashMap<String, String>>>,
    /// Source ids in the order they were bound
    order: Arc<RwLock<Vec<String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_puts: Arc<AtomicBool>,
}

impl MemoryBindingStore {
    /// Create a new empty store with a unique identity
    pub fn new() -> Self {
        Self::with_identity(format!("memory-{}", uuid::Uuid::new_v4()))
    }

    /// Create a new empty store with a fixed identity
    pub fn with_identity(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            bindings: Arc::new(RwLock::new(HashMap::new())),
            order: Arc::new(RwLock::new(Vec::new())),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_puts: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every `contains`/`get` fail (useful for testing)
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every `put` fail (useful for testing)
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// All bindings in the order they were written
    pub fn bindings(&self) -> Vec<Binding> {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        self.order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|id| bindings.get(id).map(|dest| Binding::new(id.clone(), dest.clone())))
            .collect()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_reads(&self) -> SyncResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::StoreUnavailable(
                "memory store configured to fail reads".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryBindingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BindingStore for MemoryBindingStore {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn contains(&self, source_id: &str) -> SyncResult<bool> {
        self.check_reads()?;
        Ok(self
            .bindings
            .read()
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?
            .contains_key(source_id))
    }

    async fn get(&self, source_id: &str) -> SyncResult<Option<String>> {
        self.check_reads()?;
        Ok(self
            .bindings
            .read()
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?
            .get(source_id)
            .cloned())
    }

    async fn put(&self, source_id: &str, destination_id: &str) -> SyncResult<()> {
        let write_failed = |reason: String| SyncError::StoreWriteFailed {
            source_id: source_id.to_string(),
            reason,
        };

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(write_failed("memory store configured to fail writes".to_string()));
        }

        let mut bindings = self
            .bindings
            .write()
            .map_err(|e| write_failed(e.to_string()))?;
        if let Some(existing) = bindings.get(source_id) {
            // Bindings are write-once
            if existing == destination_id {
                return Ok(());
            }
            return Err(write_failed(format!("already bound to {existing}")));
        }
        bindings.insert(source_id.to_string(), destination_id.to_string());
        self.order
            .write()
            .map_err(|e| write_failed(e.to_string()))?
            .push(source_id.to_string());
        Ok(())
    }
}

/// In-memory object store
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryObjectStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all stored blobs, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_text(&self, name: &str, text: &str) -> SyncResult<()> {
        self.objects
            .write()
            .map_err(|e| SyncError::ObjectStore(e.to_string()))?
            .insert(name.to_string(), text.to_string());
        Ok(())
    }

    async fn get_text(&self, name: &str) -> SyncResult<Option<String>> {
        Ok(self
            .objects
            .read()
            .map_err(|e| SyncError::ObjectStore(e.to_string()))?
            .get(name)
            .cloned())
    }

    async fn exists(&self, name: &str) -> SyncResult<bool> {
        Ok(self
            .objects
            .read()
            .map_err(|e| SyncError::ObjectStore(e.to_string()))?
            .contains_key(name))
    }
}
