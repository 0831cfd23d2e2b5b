//! Core types and data structures for the sync pipeline

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A booked transaction as reported by the bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identifier assigned by the bank, unique per transaction
    pub id: String,
    /// When the bank booked the transaction
    pub booked_at: DateTime<Utc>,
    /// Signed amount, negative for outgoing money
    pub amount: BigDecimal,
    /// ISO 4217 currency code
    pub currency: String,
    /// Free text shown on the statement
    pub description: String,
    /// Merchant or partner name, when the bank knows it
    pub counterparty: Option<String>,
}

impl Transaction {
    /// Create a new transaction without a counterparty
    pub fn new(
        id: String,
        booked_at: DateTime<Utc>,
        amount: BigDecimal,
        currency: String,
        description: String,
    ) -> Self {
        Self {
            id,
            booked_at,
            amount,
            currency,
            description,
            counterparty: None,
        }
    }

    /// Attach a counterparty
    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }
}

/// Proof that a source transaction has been mirrored into the destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    /// Source transaction id (the key)
    pub source_id: String,
    /// Id assigned by the destination on creation
    pub destination_id: String,
}

impl Binding {
    pub fn new(source_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
        }
    }
}

/// Account balance as reported by the bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: BigDecimal,
    pub currency: String,
    pub as_of: DateTime<Utc>,
}

/// A transaction that already exists in the destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationTransaction {
    pub id: String,
    /// External reference the record was created with, if any
    pub import_id: Option<String>,
}

/// A transaction the destination refused permanently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub source_id: String,
    pub reason: String,
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Balance fetched from the bank at the end of the run
    pub balance: Balance,
    /// Bindings written during this run, in source order
    pub created: Vec<Binding>,
    /// Transactions that were already bound
    pub skipped: usize,
    /// Permanent per-item failures
    pub rejected: Vec<Rejection>,
    /// Created in the destination but the binding write failed
    pub unrecorded: Vec<Binding>,
}

impl RunReport {
    /// Number of destination records created by this run, recorded or not
    pub fn mirrored(&self) -> usize {
        self.created.len() + self.unrecorded.len()
    }
}

/// Errors that can occur while syncing
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("Destination rejected transaction {source_id}: {reason}")]
    DestinationRejected { source_id: String, reason: String },
    #[error("Destination unavailable: {0}")]
    DestinationUnavailable(String),
    #[error("Failed to record binding for {source_id}: {reason}")]
    StoreWriteFailed { source_id: String, reason: String },
    #[error("Binding store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Object store error: {0}")]
    ObjectStore(String),
    #[error("Backup already exists: {0}")]
    BackupExists(String),
    #[error("Another run holds the lease: {0}")]
    RunInProgress(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl SyncError {
    /// Whether retrying on the next scheduled run may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::SourceUnavailable(_)
                | SyncError::DestinationUnavailable(_)
                | SyncError::StoreWriteFailed { .. }
                | SyncError::StoreUnavailable(_)
                | SyncError::ObjectStore(_)
                | SyncError::RunInProgress(_)
        )
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_transaction_serde_keeps_exact_amount() {
        let txn = Transaction::new(
            "tx-1".to_string(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            BigDecimal::from_str("-12.345").unwrap(),
            "EUR".to_string(),
            "Coffee".to_string(),
        )
        .with_counterparty("Bean Bar");

        let json = serde_json::to_string(&txn).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(back, txn);
        assert_eq!(back.amount, BigDecimal::from_str("-12.345").unwrap());
    }

    #[test]
    fn test_error_classification() {
        assert!(SyncError::SourceUnavailable("timeout".into()).is_transient());
        assert!(SyncError::DestinationUnavailable("429".into()).is_transient());
        assert!(!SyncError::DestinationRejected {
            source_id: "a".into(),
            reason: "bad date".into()
        }
        .is_transient());
        assert!(!SyncError::Validation("empty id".into()).is_transient());
    }

    #[test]
    fn test_report_counts_unrecorded_as_mirrored() {
        let report = RunReport {
            balance: Balance {
                amount: BigDecimal::from(10),
                currency: "EUR".to_string(),
                as_of: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            },
            created: vec![Binding::new("a", "1")],
            skipped: 3,
            rejected: vec![],
            unrecorded: vec![Binding::new("b", "2")],
        };
        assert_eq!(report.mirrored(), 2);
    }
}
