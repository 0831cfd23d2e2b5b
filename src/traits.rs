//! Traits at the seams between the engine and the outside world
//!
//! The engine only ever talks to these traits, so any bank, budgeting
//! service or storage backend can be plugged in by implementing them.

use async_trait::async_trait;

use crate::types::*;

/// Read access to the bank
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch every transaction the bank reports, in any order
    async fn fetch_transactions(&self) -> SyncResult<Vec<Transaction>>;

    /// Fetch the current account balance
    async fn fetch_balance(&self) -> SyncResult<Balance>;
}

/// Write access to the budgeting service
///
/// Implementations must send the source transaction id as the destination's
/// import/external reference so that creating the same transaction twice
/// resolves to the first record instead of producing a duplicate.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Create a transaction and return the destination's id for it
    async fn create_transaction(&self, transaction: &Transaction) -> SyncResult<String>;

    /// List transactions already present in the destination
    async fn list_transactions(&self) -> SyncResult<Vec<DestinationTransaction>>;
}

/// Durable mapping from source id to destination id
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Stable name of the underlying table, used to key the run lease
    fn identity(&self) -> String;

    /// Check whether a source transaction has been bound
    async fn contains(&self, source_id: &str) -> SyncResult<bool>;

    /// Get the destination id bound to a source transaction
    async fn get(&self, source_id: &str) -> SyncResult<Option<String>>;

    /// Record a binding; fails with [`SyncError::StoreWriteFailed`]
    async fn put(&self, source_id: &str, destination_id: &str) -> SyncResult<()>;
}

/// Named text blobs for balance snapshots and backups
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a blob, replacing any previous content under that name
    async fn put_text(&self, name: &str, text: &str) -> SyncResult<()>;

    /// Read a blob
    async fn get_text(&self, name: &str) -> SyncResult<Option<String>>;

    /// Check whether a blob exists
    async fn exists(&self, name: &str) -> SyncResult<bool>;
}
