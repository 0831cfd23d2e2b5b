//! Reconciliation engine that mirrors bank transactions into the budget
//!
//! One run fetches every source transaction, pushes those without a binding
//! to the destination in source order, records a binding after each
//! successful push and finishes with the bank's own balance report.
//!
//! Failure policy:
//! - a permanent rejection of one transaction is recorded and the batch
//!   continues;
//! - a transient destination outage stops the batch, bindings already
//!   written stay;
//! - a failed binding write is logged and reported, the item still counts
//!   as mirrored because the destination deduplicates on the source id.

pub mod lease;

use tracing::{debug, error, info, warn};

use self::lease::RunLease;

use crate::traits::*;
use crate::types::*;

/// Orchestrates source, destination and binding store for one account
pub struct ReconciliationEngine<S, D, B>
where
    S: SourceClient,
    D: DestinationClient,
    B: BindingStore,
{
    source: S,
    destination: D,
    bindings: B,
}

impl<S, D, B> ReconciliationEngine<S, D, B>
where
    S: SourceClient,
    D: DestinationClient,
    B: BindingStore,
{
    /// Create a new engine owning its clients and binding store
    pub fn new(source: S, destination: D, bindings: B) -> Self {
        Self {
            source,
            destination,
            bindings,
        }
    }

    /// The binding store this engine writes to
    pub fn bindings(&self) -> &B {
        &self.bindings
    }

    /// Run once and return the bank's current balance
    pub async fn run(&self) -> SyncResult<Balance> {
        Ok(self.run_with_report().await?.balance)
    }

    /// Run once and return the full per-item accounting
    pub async fn run_with_report(&self) -> SyncResult<RunReport> {
        let lease = self.lease().await;
        self.run_leased(&lease).await
    }

    /// Wait for the single-writer lease on this engine's binding store
    ///
    /// Callers that must do more work inside the same exclusive window, such
    /// as publishing the run's balance, take the lease here and pass it to
    /// [`ReconciliationEngine::run_leased`].
    pub async fn lease(&self) -> RunLease {
        let lease = lease::acquire(&self.bindings.identity()).await;
        debug!(store = lease.identity(), "acquired run lease");
        lease
    }

    /// Run once under a lease the caller already holds
    pub async fn run_leased(&self, lease: &RunLease) -> SyncResult<RunReport> {
        let identity = self.bindings.identity();
        if lease.identity() != identity {
            return Err(SyncError::Validation(format!(
                "lease for {} does not cover binding store {identity}",
                lease.identity()
            )));
        }

        let transactions = self.source.fetch_transactions().await?;
        debug!(count = transactions.len(), "fetched source transactions");

        let mut created = Vec::new();
        let mut rejected = Vec::new();
        let mut unrecorded = Vec::new();
        let mut skipped = 0;

        for transaction in &transactions {
            if self.bindings.contains(&transaction.id).await? {
                skipped += 1;
                continue;
            }

            let destination_id = match self.destination.create_transaction(transaction).await {
                Ok(id) => id,
                Err(SyncError::DestinationRejected { source_id, reason }) => {
                    warn!(source_id = %source_id, reason = %reason, "destination rejected transaction");
                    rejected.push(Rejection { source_id, reason });
                    continue;
                }
                Err(err) => {
                    warn!(
                        source_id = %transaction.id,
                        created = created.len(),
                        error = %err,
                        "aborting remaining batch"
                    );
                    return Err(err);
                }
            };

            let binding = Binding::new(transaction.id.clone(), destination_id);
            match self
                .bindings
                .put(&binding.source_id, &binding.destination_id)
                .await
            {
                Ok(()) => {
                    debug!(
                        source_id = %binding.source_id,
                        destination_id = %binding.destination_id,
                        "mirrored transaction"
                    );
                    created.push(binding);
                }
                Err(err) => {
                    error!(
                        source_id = %binding.source_id,
                        destination_id = %binding.destination_id,
                        error = %err,
                        "transaction mirrored but binding was not recorded"
                    );
                    unrecorded.push(binding);
                }
            }
        }

        let balance = self.source.fetch_balance().await?;

        info!(
            created = created.len(),
            skipped,
            rejected = rejected.len(),
            unrecorded = unrecorded.len(),
            balance = %balance.amount,
            "reconciliation run finished"
        );

        Ok(RunReport {
            balance,
            created,
            skipped,
            rejected,
            unrecorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{MemoryBindingStore, MemoryDestination, MemorySource};
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};

    fn txn(id: &str, amount: i64) -> Transaction {
        Transaction::new(
            id.to_string(),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            BigDecimal::from(amount),
            "EUR".to_string(),
            format!("Payment {id}"),
        )
    }

    fn source(transactions: Vec<Transaction>) -> MemorySource {
        MemorySource::new(transactions, BigDecimal::from(250), "EUR")
    }

    #[tokio::test]
    async fn test_run_skips_bound_and_counts_them() {
        let store = MemoryBindingStore::new();
        store.put("a", "dest-a").await.unwrap();
        let destination = MemoryDestination::new();

        let engine = ReconciliationEngine::new(
            source(vec![txn("a", -5), txn("b", -7)]),
            destination.clone(),
            store.clone(),
        );
        let report = engine.run_with_report().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].source_id, "b");
        assert_eq!(destination.create_calls(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_binding_write_failure_is_reported_not_fatal() {
        let store = MemoryBindingStore::new();
        store.fail_puts(true);
        let destination = MemoryDestination::new();

        let engine =
            ReconciliationEngine::new(source(vec![txn("a", -5)]), destination.clone(), store.clone());
        let report = engine.run_with_report().await.unwrap();

        assert!(report.created.is_empty());
        assert_eq!(report.unrecorded.len(), 1);
        assert_eq!(report.unrecorded[0].source_id, "a");
        assert_eq!(report.mirrored(), 1);
        assert!(!store.contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_read_failure_aborts_before_push() {
        let store = MemoryBindingStore::new();
        store.fail_reads(true);
        let destination = MemoryDestination::new();

        let engine =
            ReconciliationEngine::new(source(vec![txn("a", -5)]), destination.clone(), store);
        let err = engine.run().await.unwrap_err();

        assert!(matches!(err, SyncError::StoreUnavailable(_)));
        assert!(destination.create_calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_leased_requires_the_stores_lease() {
        let destination = MemoryDestination::new();
        let engine = ReconciliationEngine::new(
            source(vec![txn("a", -5)]),
            destination.clone(),
            MemoryBindingStore::new(),
        );

        let other = lease::acquire("some-other-store").await;
        let err = engine.run_leased(&other).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(destination.create_calls().is_empty());

        let own = engine.lease().await;
        assert!(lease::try_acquire(&engine.bindings().identity()).is_none());
        assert_eq!(engine.run_leased(&own).await.unwrap().created.len(), 1);
    }

    #[tokio::test]
    async fn test_balance_failure_keeps_bindings() {
        let store = MemoryBindingStore::new();
        let src = source(vec![txn("a", -5), txn("b", 3)]);
        src.fail_balance(true);

        let engine = ReconciliationEngine::new(src, MemoryDestination::new(), store.clone());
        let err = engine.run().await.unwrap_err();

        assert!(matches!(err, SyncError::SourceUnavailable(_)));
        assert!(store.contains("a").await.unwrap());
        assert!(store.contains("b").await.unwrap());
    }
}
