//! In-memory source and destination for testing and dry runs

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::traits::*;
use crate::types::*;

/// A bank that returns a fixed list of transactions and a fixed balance
#[derive(Debug, Clone)]
pub struct MemorySource {
    transactions: Arc<RwLock<Vec<Transaction>>>,
    balance: Arc<RwLock<(BigDecimal, String)>>,
    fail_transactions: Arc<AtomicBool>,
    fail_balance: Arc<AtomicBool>,
    interleave: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(transactions: Vec<Transaction>, balance: BigDecimal, currency: &str) -> Self {
        Self {
            transactions: Arc::new(RwLock::new(transactions)),
            balance: Arc::new(RwLock::new((balance, currency.to_string()))),
            fail_transactions: Arc::new(AtomicBool::new(false)),
            fail_balance: Arc::new(AtomicBool::new(false)),
            interleave: Arc::new(AtomicBool::new(false)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the transactions returned by the next fetch
    pub fn set_transactions(&self, transactions: Vec<Transaction>) {
        *self
            .transactions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = transactions;
    }

    /// Replace the reported balance
    pub fn set_balance(&self, amount: BigDecimal) {
        self.balance
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .0 = amount;
    }

    pub fn fail_transactions(&self, fail: bool) {
        self.fail_transactions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_balance(&self, fail: bool) {
        self.fail_balance.store(fail, Ordering::SeqCst);
    }

    /// Yield to the scheduler inside every fetch, so concurrent runs interleave
    pub fn set_interleaving(&self, interleave: bool) {
        self.interleave.store(interleave, Ordering::SeqCst);
    }

    /// How many times the transaction list was fetched
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for MemorySource {
    async fn fetch_transactions(&self) -> SyncResult<Vec<Transaction>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.interleave.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.fail_transactions.load(Ordering::SeqCst) {
            return Err(SyncError::SourceUnavailable(
                "transaction list unavailable".to_string(),
            ));
        }
        Ok(self
            .transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn fetch_balance(&self) -> SyncResult<Balance> {
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(SyncError::SourceUnavailable("balance unavailable".to_string()));
        }
        let (amount, currency) = self
            .balance
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(Balance {
            amount,
            currency,
            as_of: Utc::now(),
        })
    }
}

#[derive(Debug, Default)]
struct DestinationState {
    records: Vec<DestinationTransaction>,
    create_calls: Vec<String>,
    rejected: HashSet<String>,
    unavailable: HashSet<String>,
}

/// A budgeting service that deduplicates on import id
///
/// Creating a transaction whose id was already imported returns the id of
/// the existing record, exactly like the real service's import id contract.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    state: Arc<RwLock<DestinationState>>,
    outage: Arc<AtomicBool>,
    interleave: Arc<AtomicBool>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permanently reject this source transaction
    pub fn reject(&self, source_id: &str) {
        self.write().rejected.insert(source_id.to_string());
    }

    /// Report an outage when this source transaction is pushed
    pub fn unavailable_on(&self, source_id: &str) {
        self.write().unavailable.insert(source_id.to_string());
    }

    /// Report an outage for every call
    pub fn set_outage(&self, outage: bool) {
        self.outage.store(outage, Ordering::SeqCst);
    }

    /// Yield to the scheduler before every create, so concurrent runs interleave
    pub fn set_interleaving(&self, interleave: bool) {
        self.interleave.store(interleave, Ordering::SeqCst);
    }

    /// Source ids passed to `create_transaction`, in call order
    pub fn create_calls(&self) -> Vec<String> {
        self.read().create_calls.clone()
    }

    /// Records currently held by the destination
    pub fn records(&self) -> Vec<DestinationTransaction> {
        self.read().records.clone()
    }

    /// Number of records created with this import id
    pub fn count_imported(&self, source_id: &str) -> usize {
        self.read()
            .records
            .iter()
            .filter(|r| r.import_id.as_deref() == Some(source_id))
            .count()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DestinationState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DestinationState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DestinationClient for MemoryDestination {
    async fn create_transaction(&self, transaction: &Transaction) -> SyncResult<String> {
        // Never yield while holding the state lock
        if self.interleave.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let mut state = self.write();
        state.create_calls.push(transaction.id.clone());

        if self.outage.load(Ordering::SeqCst) || state.unavailable.contains(&transaction.id) {
            return Err(SyncError::DestinationUnavailable(format!(
                "service unavailable while creating {}",
                transaction.id
            )));
        }
        if state.rejected.contains(&transaction.id) {
            return Err(SyncError::DestinationRejected {
                source_id: transaction.id.clone(),
                reason: "rejected by memory destination".to_string(),
            });
        }

        if let Some(existing) = state
            .records
            .iter()
            .find(|r| r.import_id.as_deref() == Some(transaction.id.as_str()))
        {
            return Ok(existing.id.clone());
        }

        let id = uuid::Uuid::new_v4().to_string();
        state.records.push(DestinationTransaction {
            id: id.clone(),
            import_id: Some(transaction.id.clone()),
        });
        Ok(id)
    }

    async fn list_transactions(&self) -> SyncResult<Vec<DestinationTransaction>> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(SyncError::DestinationUnavailable(
                "service unavailable".to_string(),
            ));
        }
        Ok(self.records())
    }
}
