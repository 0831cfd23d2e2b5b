//! N26 source client
//!
//! Reads the transaction list and the account balance. Any transport error,
//! non-2xx status or undecodable body is reported as `SourceUnavailable`,
//! which aborts the run before anything is pushed.

use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::traits::SourceClient;
use crate::types::*;

/// Read-only client for the N26 banking API.
#[derive(Clone)]
pub struct N26Client {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    limit: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct N26Transaction {
    id: String,
    #[serde(rename = "visibleTS")]
    visible_ts: i64,
    amount: serde_json::Number,
    currency_code: String,
    reference_text: Option<String>,
    merchant_name: Option<String>,
    partner_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct N26Account {
    available_balance: serde_json::Number,
    currency: String,
}

impl N26Client {
    /// Create a client for the API at `base_url`, authenticating with a bearer token.
    ///
    /// `limit` is the maximum number of transactions requested per fetch.
    pub fn new(
        base_url: &str,
        access_token: &str,
        limit: usize,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("N26 HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            limit,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| SyncError::SourceUnavailable(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SourceUnavailable(format!("GET {url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::SourceUnavailable(format!("GET {url}: invalid body: {e}")))
    }
}

#[async_trait::async_trait]
impl SourceClient for N26Client {
    async fn fetch_transactions(&self) -> SyncResult<Vec<Transaction>> {
        let raw: Vec<N26Transaction> = self
            .get_json("/api/smrt/transactions", &[("limit", self.limit.to_string())])
            .await?;
        debug!(count = raw.len(), "received N26 transactions");

        raw.into_iter().map(N26Transaction::into_transaction).collect()
    }

    async fn fetch_balance(&self) -> SyncResult<Balance> {
        let account: N26Account = self.get_json("/api/accounts", &[]).await?;
        Ok(Balance {
            amount: parse_amount(&account.available_balance)?,
            currency: account.currency,
            as_of: Utc::now(),
        })
    }
}

impl N26Transaction {
    fn into_transaction(self) -> SyncResult<Transaction> {
        let booked_at = Utc
            .timestamp_millis_opt(self.visible_ts)
            .single()
            .ok_or_else(|| {
                SyncError::SourceUnavailable(format!(
                    "transaction {} has invalid timestamp {}",
                    self.id, self.visible_ts
                ))
            })?;
        let amount = parse_amount(&self.amount)?;

        let counterparty = self.merchant_name.or(self.partner_name);
        let description = self
            .reference_text
            .filter(|text| !text.trim().is_empty())
            .or_else(|| counterparty.clone())
            .unwrap_or_default();

        Ok(Transaction {
            id: self.id,
            booked_at,
            amount,
            currency: self.currency_code,
            description,
            counterparty,
        })
    }
}

// JSON numbers are parsed from their shortest decimal text so 12.34 stays 12.34.
fn parse_amount(number: &serde_json::Number) -> SyncResult<BigDecimal> {
    BigDecimal::from_str(&number.to_string())
        .map_err(|e| SyncError::SourceUnavailable(format!("invalid amount {number}: {e}")))
}
