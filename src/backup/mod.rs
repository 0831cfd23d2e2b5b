//! Point-in-time backup of every source transaction
//!
//! Backups are independent of the binding store; they exist so the full
//! transaction history can be restored if the budget is ever lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::traits::SourceClient;
use crate::types::*;

/// Timestamp layout used in backup names
pub const BACKUP_NAME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
const BACKUP_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct BackupBody {
    exported_at: DateTime<Utc>,
    transactions: Vec<Transaction>,
}

/// Serialized export of all transactions at one moment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDocument {
    /// Name to store the document under, derived from `exported_at`
    pub name: String,
    pub exported_at: DateTime<Utc>,
    /// JSON text of the document
    pub contents: String,
}

impl BackupDocument {
    /// Serialize transactions, keeping their order
    pub fn new(exported_at: DateTime<Utc>, transactions: Vec<Transaction>) -> SyncResult<Self> {
        let body = BackupBody {
            exported_at,
            transactions,
        };
        Ok(Self {
            name: backup_name(exported_at),
            exported_at,
            contents: serde_json::to_string_pretty(&body)?,
        })
    }

    /// Parse a stored document back into its transactions
    pub fn parse(contents: &str) -> SyncResult<Vec<Transaction>> {
        let body: BackupBody = serde_json::from_str(contents)?;
        Ok(body.transactions)
    }

    /// The transactions held by this document
    pub fn transactions(&self) -> SyncResult<Vec<Transaction>> {
        Self::parse(&self.contents)
    }
}

/// Storage name for a backup taken at `at`
pub fn backup_name(at: DateTime<Utc>) -> String {
    format!("{}.{}", at.format(BACKUP_NAME_FORMAT), BACKUP_EXTENSION)
}

/// Exports the full transaction list of a source
pub struct BackupExporter<S: SourceClient> {
    source: S,
    clock: fn() -> DateTime<Utc>,
}

impl<S: SourceClient> BackupExporter<S> {
    /// Create a new exporter using the system clock
    pub fn new(source: S) -> Self {
        Self::with_clock(source, Utc::now)
    }

    /// Create a new exporter with a custom clock
    pub fn with_clock(source: S, clock: fn() -> DateTime<Utc>) -> Self {
        Self { source, clock }
    }

    /// Fetch every transaction once and serialize them
    pub async fn export_all(&self) -> SyncResult<BackupDocument> {
        let transactions = self.source.fetch_transactions().await?;
        let count = transactions.len();
        let document = BackupDocument::new((self.clock)(), transactions)?;
        info!(name = %document.name, count, "exported transactions");
        Ok(document)
    }
}
