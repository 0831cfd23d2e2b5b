//! Entry points for whatever schedules the sync
//!
//! A cron job, a timer or a manual trigger calls these; none of them loop or
//! sleep. Each call is one short run.

use tracing::info;

use crate::backup::BackupExporter;
use crate::reconciliation::ReconciliationEngine;
use crate::traits::*;
use crate::types::*;

/// Blob holding the last published balance
pub const BALANCE_BLOB: &str = "balance";

/// Run the engine once and publish the balance as plain text
///
/// On failure nothing is published and readers keep seeing the previous
/// balance until the next successful run. The run lease is held until the
/// balance is written, so overlapping updates publish in run order.
pub async fn update<S, D, B, O>(
    engine: &ReconciliationEngine<S, D, B>,
    info_store: &O,
) -> SyncResult<RunReport>
where
    S: SourceClient,
    D: DestinationClient,
    B: BindingStore,
    O: ObjectStore,
{
    let lease = engine.lease().await;
    let report = engine.run_leased(&lease).await?;
    info_store
        .put_text(BALANCE_BLOB, &report.balance.amount.to_string())
        .await?;
    drop(lease);
    info!(balance = %report.balance.amount, "published balance");
    Ok(report)
}

/// Export every transaction and store the document under its timestamped name
///
/// Existing backups are never overwritten.
pub async fn backup<S, O>(exporter: &BackupExporter<S>, backups: &O) -> SyncResult<String>
where
    S: SourceClient,
    O: ObjectStore,
{
    let document = exporter.export_all().await?;
    if backups.exists(&document.name).await? {
        return Err(SyncError::BackupExists(document.name));
    }
    backups.put_text(&document.name, &document.contents).await?;
    info!(name = %document.name, "stored backup");
    Ok(document.name)
}

/// The last published balance, if any run has succeeded yet
pub async fn read_balance<O: ObjectStore>(info_store: &O) -> SyncResult<Option<String>> {
    info_store.get_text(BALANCE_BLOB).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::lease;
    use crate::utils::{MemoryBindingStore, MemoryDestination, MemoryObjectStore, MemorySource};
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, TimeZone, Utc};
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Object store that records whether the run lease was still held on write
    struct LeaseCheckingStore {
        identity: String,
        inner: MemoryObjectStore,
        held_on_put: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for LeaseCheckingStore {
        async fn put_text(&self, name: &str, text: &str) -> SyncResult<()> {
            self.held_on_put
                .store(lease::try_acquire(&self.identity).is_none(), Ordering::SeqCst);
            self.inner.put_text(name, text).await
        }

        async fn get_text(&self, name: &str) -> SyncResult<Option<String>> {
            self.inner.get_text(name).await
        }

        async fn exists(&self, name: &str) -> SyncResult<bool> {
            self.inner.exists(name).await
        }
    }

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 2, 0).unwrap()
    }

    #[tokio::test]
    async fn test_update_publishes_balance_text() {
        let source = MemorySource::new(vec![], BigDecimal::from_str("1234.56").unwrap(), "EUR");
        let engine =
            ReconciliationEngine::new(source, MemoryDestination::new(), MemoryBindingStore::new());
        let info_store = MemoryObjectStore::new();

        assert_eq!(read_balance(&info_store).await.unwrap(), None);
        update(&engine, &info_store).await.unwrap();
        assert_eq!(
            read_balance(&info_store).await.unwrap(),
            Some("1234.56".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_publishes_while_holding_the_lease() {
        let store = MemoryBindingStore::new();
        let info_store = LeaseCheckingStore {
            identity: store.identity(),
            inner: MemoryObjectStore::new(),
            held_on_put: AtomicBool::new(false),
        };
        let engine = ReconciliationEngine::new(
            MemorySource::new(vec![], BigDecimal::from(5), "EUR"),
            MemoryDestination::new(),
            store.clone(),
        );

        update(&engine, &info_store).await.unwrap();

        assert!(info_store.held_on_put.load(Ordering::SeqCst));
        assert!(lease::try_acquire(&store.identity()).is_some());
        assert_eq!(read_balance(&info_store).await.unwrap(), Some("5".to_string()));
    }

    #[tokio::test]
    async fn test_failed_update_keeps_stale_balance() {
        let source = MemorySource::new(vec![], BigDecimal::from(10), "EUR");
        let engine = ReconciliationEngine::new(
            source.clone(),
            MemoryDestination::new(),
            MemoryBindingStore::new(),
        );
        let info_store = MemoryObjectStore::new();
        update(&engine, &info_store).await.unwrap();

        source.set_balance(BigDecimal::from(20));
        source.fail_transactions(true);
        assert!(update(&engine, &info_store).await.is_err());
        assert_eq!(read_balance(&info_store).await.unwrap(), Some("10".to_string()));
    }

    #[tokio::test]
    async fn test_backup_never_overwrites() {
        let exporter = BackupExporter::with_clock(
            MemorySource::new(vec![], BigDecimal::from(0), "EUR"),
            fixed_clock,
        );
        let backups = MemoryObjectStore::new();

        let name = backup(&exporter, &backups).await.unwrap();
        assert_eq!(name, "2024-06-01T00-02-00.json");

        let err = backup(&exporter, &backups).await.unwrap_err();
        assert!(matches!(err, SyncError::BackupExists(_)));
        assert_eq!(backups.names(), vec![name]);
    }
}
