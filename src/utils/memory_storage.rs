//! In-memory storage implementation for testing and development

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    /// Append-only log; a record's id is its position + 1
    transactions: Vec<Transaction>,
}

impl State {
    fn transaction_mut(&mut self, transaction_id: u64) -> Option<&mut Transaction> {
        let index = usize::try_from(transaction_id).ok()?.checked_sub(1)?;
        self.transactions.get_mut(index)
    }

    fn transaction(&self, transaction_id: u64) -> Option<&Transaction> {
        let index = usize::try_from(transaction_id).ok()?.checked_sub(1)?;
        self.transactions.get(index)
    }
}

/// In-memory storage implementation for testing and development.
///
/// Accounts and the transaction log live behind a single lock, so a commit
/// is atomic with respect to every reader.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
    closed: Arc<AtomicBool>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            closed: Arc::new(AtomicBool::new(false)),
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        let mut state = self.write()?;
        state.accounts.clear();
        state.transactions.clear();
        Ok(())
    }

    /// Make the next commit fail as if the durable write was rejected
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, State>> {
        if self.is_closed() {
            return Err(LedgerError::Storage("storage handle is closed".to_string()));
        }
        self.state
            .read()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, State>> {
        if self.is_closed() {
            return Err(LedgerError::Storage("storage handle is closed".to_string()));
        }
        self.state
            .write()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject a batch before touching any state
fn check_batch(state: &State, batch: &CommitBatch) -> LedgerResult<()> {
    for expected in &batch.expected {
        match state.accounts.get(&expected.id) {
            Some(stored) if stored == expected => {}
            Some(_) => return Err(LedgerError::Busy(expected.id.clone())),
            None => return Err(LedgerError::AccountNotFound(expected.id.clone())),
        }
    }

    for account in &batch.accounts {
        if !state.accounts.contains_key(&account.id) {
            return Err(LedgerError::AccountNotFound(account.id.clone()));
        }
    }

    for transaction_id in &batch.reversed {
        match state.transaction(*transaction_id) {
            Some(txn) if txn.status == TransactionStatus::Completed => {}
            Some(_) => {
                return Err(LedgerError::NotReversible {
                    transaction_id: *transaction_id,
                    reason: "only completed transactions can be reversed".to_string(),
                })
            }
            None => return Err(LedgerError::TransactionNotFound(transaction_id.to_string())),
        }
    }

    for txn in &batch.transactions {
        if txn.status != TransactionStatus::Pending {
            return Err(LedgerError::Storage(format!(
                "cannot append a {:?} record",
                txn.status
            )));
        }
        if !txn.is_consistent() {
            return Err(LedgerError::Storage(format!(
                "record for {} does not balance: {} + {} != {}",
                txn.account_id,
                txn.balance_before,
                txn.signed_amount(),
                txn.balance_after
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn insert_account(&self, account: &Account) -> LedgerResult<()> {
        let mut state = self.write()?;
        if state.accounts.contains_key(&account.id) {
            return Err(LedgerError::AccountAlreadyExists(account.id.clone()));
        }
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.read()?.accounts.get(account_id).cloned())
    }

    async fn list_accounts(&self, account_type: Option<AccountType>) -> LedgerResult<Vec<Account>> {
        let state = self.read()?;
        let mut filtered: Vec<Account> = state
            .accounts
            .values()
            .filter(|account| account_type.is_none_or(|t| account.account_type == t))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(filtered)
    }

    async fn commit(&self, batch: CommitBatch) -> LedgerResult<Vec<Transaction>> {
        let mut state = self.write()?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Storage(
                "durable write rejected by storage".to_string(),
            ));
        }

        check_batch(&state, &batch)?;

        for account in batch.accounts {
            state.accounts.insert(account.id.clone(), account);
        }

        for transaction_id in batch.reversed {
            if let Some(txn) = state.transaction_mut(transaction_id) {
                txn.status = TransactionStatus::Reversed;
            }
        }

        let mut committed = Vec::with_capacity(batch.transactions.len());
        for mut txn in batch.transactions {
            txn.id = state.transactions.len() as u64 + 1;
            txn.status = TransactionStatus::Completed;
            state.transactions.push(txn.clone());
            committed.push(txn);
        }

        Ok(committed)
    }

    async fn get_transaction(&self, transaction_id: u64) -> LedgerResult<Option<Transaction>> {
        Ok(self.read()?.transaction(transaction_id).cloned())
    }

    async fn get_transactions_by_reference(
        &self,
        reference: &str,
    ) -> LedgerResult<Vec<Transaction>> {
        let state = self.read()?;
        Ok(state
            .transactions
            .iter()
            .filter(|txn| txn.reference == reference)
            .cloned()
            .collect())
    }

    async fn get_account_transactions(
        &self,
        account_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> LedgerResult<Vec<Transaction>> {
        let state = self.read()?;
        let newest_first = state
            .transactions
            .iter()
            .rev()
            .filter(|txn| txn.account_id == account_id)
            .skip(offset)
            .cloned();
        Ok(match limit {
            Some(limit) => newest_first.take(limit).collect(),
            None => newest_first.collect(),
        })
    }

    async fn count_account_transactions(&self, account_id: &str) -> LedgerResult<usize> {
        let state = self.read()?;
        Ok(state
            .transactions
            .iter()
            .filter(|txn| txn.account_id == account_id)
            .count())
    }

    async fn recent_transactions(&self, limit: usize) -> LedgerResult<Vec<Transaction>> {
        let state = self.read()?;
        Ok(state.transactions.iter().rev().take(limit).cloned().collect())
    }

    async fn close(&self) -> LedgerResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
