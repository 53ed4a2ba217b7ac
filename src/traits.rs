//! Traits for the collaborators the ledger depends on

use async_trait::async_trait;

use crate::types::*;

/// Everything one atomic commit writes.
///
/// A storage backend must apply the whole batch or none of it, and readers
/// must never observe a partially applied batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    /// Stored state each touched account was loaded with; the commit is
    /// rejected with `Busy` if any of them changed since
    pub expected: Vec<Account>,
    /// New state of every account touched, keyed by `Account::id`
    pub accounts: Vec<Account>,
    /// Pending records to append; storage assigns ids and completes them
    pub transactions: Vec<Transaction>,
    /// Completed records to flip to `Reversed`
    pub reversed: Vec<u64>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.transactions.is_empty() && self.reversed.is_empty()
    }
}

/// Durable storage for accounts and the append-only transaction log
///
/// Implementations are shared between concurrent tasks, so every method
/// takes `&self`. Per-account mutual exclusion is handled by the ledger; the
/// storage has to make [`commit`](LedgerStorage::commit) atomic and reject
/// a batch whose `expected` accounts no longer match what is stored, since
/// ledgers sharing one storage do not share their lock tables.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Persist a newly opened account, failing if the identity is taken
    async fn insert_account(&self, account: &Account) -> LedgerResult<()>;

    /// Get an account by ID
    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>>;

    /// List all accounts, optionally filtered by type
    async fn list_accounts(&self, account_type: Option<AccountType>) -> LedgerResult<Vec<Account>>;

    /// Atomically apply account updates and append records, returning the
    /// appended records as stored
    async fn commit(&self, batch: CommitBatch) -> LedgerResult<Vec<Transaction>>;

    /// Get a transaction by ID
    async fn get_transaction(&self, transaction_id: u64) -> LedgerResult<Option<Transaction>>;

    /// All records sharing a reference number, oldest first
    async fn get_transactions_by_reference(&self, reference: &str)
        -> LedgerResult<Vec<Transaction>>;

    /// Records for one account, newest first, skipping `offset` and
    /// returning at most `limit` (all when `None`)
    async fn get_account_transactions(
        &self,
        account_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Number of records for one account
    async fn count_account_transactions(&self, account_id: &str) -> LedgerResult<usize>;

    /// Most recent records across all accounts, newest first
    async fn recent_transactions(&self, limit: usize) -> LedgerResult<Vec<Transaction>>;

    /// Release the handle; later calls fail with `LedgerError::Storage`
    async fn close(&self) -> LedgerResult<()>;
}

/// Authorization decisions made outside the ledger.
///
/// The calling layer consults this before a mutating request reaches the
/// ledger. The ledger itself never sees raw credentials.
#[async_trait]
pub trait AuthorizationCollaborator: Send + Sync {
    /// Whether `principal` may operate on `account_id`
    async fn is_authorized(&self, principal: &str, account_id: &str) -> bool;

    /// Whether `supplied_key` is the personal key registered for `owner`
    async fn verify_personal_key(&self, owner: &str, supplied_key: &str) -> bool;
}
