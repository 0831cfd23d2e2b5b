//! # Bank Sync Core
//!
//! Mirrors bank transactions into a budgeting service without ever creating
//! duplicates, publishes the bank's balance and takes full backups of the
//! transaction history.
//!
//! ## Features
//!
//! - **Reconciliation**: push every transaction that has no binding yet, record the binding right after
//! - **Exactly-once delivery**: the source id travels as the destination's import id, so retries dedupe
//! - **Balance snapshots**: the bank's own balance report, published as plain text
//! - **Backups**: timestamped JSON exports of all transactions, never overwritten
//! - **Storage abstraction**: trait-based binding and object stores with in-memory and file backends
//!
//! ## Quick Start
//!
//! ```rust
//! use bank_sync_core::utils::{MemoryBindingStore, MemoryDestination, MemorySource};
//! use bank_sync_core::ReconciliationEngine;
//! use bigdecimal::BigDecimal;
//!
//! # async fn demo() -> bank_sync_core::SyncResult<()> {
//! let source = MemorySource::new(Vec::new(), BigDecimal::from(100), "EUR");
//! let engine = ReconciliationEngine::new(source, MemoryDestination::new(), MemoryBindingStore::new());
//! let balance = engine.run().await?;
//! assert_eq!(balance.amount, BigDecimal::from(100));
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod clients;
pub mod config;
pub mod jobs;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use backup::{BackupDocument, BackupExporter};
pub use reconciliation::ReconciliationEngine;
pub use traits::*;
pub use types::*;
