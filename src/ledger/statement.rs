//! Read-only projections over the transaction log

use crate::config::LedgerConfig;
use crate::traits::*;
use crate::types::*;

/// Produces ordered, paginated transaction history.
///
/// Every read is served from a single storage call, so a page never shows
/// one leg of a transfer without the commit that wrote it.
#[derive(Debug)]
pub struct StatementGenerator<S: LedgerStorage> {
    storage: S,
    config: LedgerConfig,
}

impl<S: LedgerStorage> StatementGenerator<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, LedgerConfig::default())
    }

    pub fn with_config(storage: S, config: LedgerConfig) -> Self {
        Self { storage, config }
    }

    /// One page of an account's history, newest first.
    ///
    /// A `limit` of 0 selects the configured default page size; larger
    /// limits are clamped to the configured maximum.
    pub async fn statement(
        &self,
        account_id: &str,
        limit: usize,
        offset: usize,
    ) -> LedgerResult<Vec<Transaction>> {
        self.ensure_account(account_id).await?;
        let limit = self.config.page_size(limit);
        self.storage
            .get_account_transactions(account_id, Some(limit), offset)
            .await
    }

    /// The full history of an account, newest first
    pub async fn all_transactions(&self, account_id: &str) -> LedgerResult<Vec<Transaction>> {
        self.ensure_account(account_id).await?;
        self.storage
            .get_account_transactions(account_id, None, 0)
            .await
    }

    pub async fn transactions_by_type(
        &self,
        account_id: &str,
        transaction_type: TransactionType,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut history = self.all_transactions(account_id).await?;
        history.retain(|txn| txn.transaction_type == transaction_type);
        Ok(history)
    }

    pub async fn transaction_count(&self, account_id: &str) -> LedgerResult<usize> {
        self.ensure_account(account_id).await?;
        self.storage.count_account_transactions(account_id).await
    }

    /// Latest records across all accounts, newest first
    pub async fn recent_transactions(&self, limit: usize) -> LedgerResult<Vec<Transaction>> {
        let limit = self.config.page_size(limit);
        self.storage.recent_transactions(limit).await
    }

    /// Look up a single record by id
    pub async fn transaction(&self, transaction_id: u64) -> LedgerResult<Transaction> {
        self.storage
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))
    }

    async fn ensure_account(&self, account_id: &str) -> LedgerResult<()> {
        match self.storage.get_account(account_id).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::AccountNotFound(account_id.to_string())),
        }
    }
}
