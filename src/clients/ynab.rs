//! YNAB destination client
//!
//! Transactions are posted to the budget with the source id as `import_id`.
//! Existing records are listed per account, the scope in which YNAB keeps
//! `import_id` unique.

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::traits::DestinationClient;
use crate::types::*;
use crate::utils::validation::{to_milliunits, truncate_chars, validate_transaction};

const MAX_PAYEE_LEN: usize = 200;
const MAX_MEMO_LEN: usize = 500;

/// Client for the YNAB budgeting API.
///
/// Every transaction is created with the source id as `import_id`. The
/// service refuses a second transaction with the same `import_id` in one
/// account (HTTP 409), in which case the existing record is looked up and
/// its id returned.
#[derive(Clone)]
pub struct YnabClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    budget_id: String,
    account_id: String,
}

#[derive(Debug, Serialize)]
struct SaveTransactionWrapper<'a> {
    transaction: SaveTransaction<'a>,
}

#[derive(Debug, PartialEq, Serialize)]
struct SaveTransaction<'a> {
    account_id: &'a str,
    date: NaiveDate,
    amount: i64,
    payee_name: Option<String>,
    memo: Option<String>,
    cleared: &'static str,
    approved: bool,
    import_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SavedTransaction {
    transaction: TransactionRef,
}

#[derive(Debug, Deserialize)]
struct TransactionList {
    transactions: Vec<TransactionRef>,
}

#[derive(Debug, Deserialize)]
struct TransactionRef {
    id: String,
    #[serde(default)]
    import_id: Option<String>,
}

impl YnabClient {
    pub fn new(
        base_url: &str,
        access_token: &str,
        budget_id: &str,
        account_id: &str,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("YNAB HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            budget_id: budget_id.to_string(),
            account_id: account_id.to_string(),
        })
    }

    fn transactions_url(&self) -> String {
        format!("{}/budgets/{}/transactions", self.base_url, self.budget_id)
    }

    fn account_transactions_url(&self) -> String {
        format!(
            "{}/budgets/{}/accounts/{}/transactions",
            self.base_url, self.budget_id, self.account_id
        )
    }

    fn payload<'a>(&'a self, transaction: &'a Transaction) -> SyncResult<SaveTransaction<'a>> {
        let rejected = |reason: String| SyncError::DestinationRejected {
            source_id: transaction.id.clone(),
            reason,
        };
        validate_transaction(transaction).map_err(|e| rejected(e.to_string()))?;
        let amount = to_milliunits(&transaction.amount).map_err(|e| rejected(e.to_string()))?;

        let payee = transaction
            .counterparty
            .as_deref()
            .unwrap_or(&transaction.description);
        let payee_name = Some(truncate_chars(payee, MAX_PAYEE_LEN)).filter(|p| !p.is_empty());
        let memo = Some(truncate_chars(&transaction.description, MAX_MEMO_LEN))
            .filter(|m| !m.is_empty());

        Ok(SaveTransaction {
            account_id: &self.account_id,
            date: transaction.booked_at.date_naive(),
            amount,
            payee_name,
            memo,
            cleared: "cleared",
            approved: false,
            import_id: &transaction.id,
        })
    }

    async fn find_by_import_id(&self, import_id: &str) -> SyncResult<Option<String>> {
        Ok(self
            .list_transactions()
            .await?
            .into_iter()
            .find(|t| t.import_id.as_deref() == Some(import_id))
            .map(|t| t.id))
    }
}

#[async_trait::async_trait]
impl DestinationClient for YnabClient {
    async fn create_transaction(&self, transaction: &Transaction) -> SyncResult<String> {
        let body = SaveTransactionWrapper {
            transaction: self.payload(transaction)?,
        };
        let url = self.transactions_url();

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::DestinationUnavailable(format!("POST {url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            info!(source_id = %transaction.id, "already imported, resolving existing record");
            return self
                .find_by_import_id(&transaction.id)
                .await?
                .ok_or_else(|| {
                    SyncError::DestinationUnavailable(format!(
                        "import id {} conflicts but is not listed yet",
                        transaction.id
                    ))
                });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(&transaction.id, status, &detail));
        }

        let saved: Envelope<SavedTransaction> = response.json().await.map_err(|e| {
            SyncError::DestinationUnavailable(format!("POST {url}: invalid body: {e}"))
        })?;
        debug!(source_id = %transaction.id, destination_id = %saved.data.transaction.id, "created");
        Ok(saved.data.transaction.id)
    }

    /// List the transactions of the configured account
    async fn list_transactions(&self) -> SyncResult<Vec<DestinationTransaction>> {
        let url = self.account_transactions_url();
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| SyncError::DestinationUnavailable(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::DestinationUnavailable(format!(
                "GET {url}: HTTP {status}"
            )));
        }

        let list: Envelope<TransactionList> = response.json().await.map_err(|e| {
            SyncError::DestinationUnavailable(format!("GET {url}: invalid body: {e}"))
        })?;
        Ok(list
            .data
            .transactions
            .into_iter()
            .map(|t| DestinationTransaction {
                id: t.id,
                import_id: t.import_id,
            })
            .collect())
    }
}

/// Classify a failed creation: client errors about the payload are
/// permanent, everything else may pass on a later run.
fn status_error(source_id: &str, status: StatusCode, detail: &str) -> SyncError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            SyncError::DestinationRejected {
                source_id: source_id.to_string(),
                reason: format!("HTTP {status}: {detail}"),
            }
        }
        _ => SyncError::DestinationUnavailable(format!("HTTP {status}: {detail}")),
    }
}
