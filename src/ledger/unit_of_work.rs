//! Staging area for one atomic ledger operation
//!
//! A [`UnitOfWork`] holds private copies of the locked accounts. Balance
//! checks and mutations run against those copies only; nothing shared
//! changes until storage accepts the resulting [`CommitBatch`]. Dropping the
//! unit (on any error) is the rollback.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

use crate::money;
use crate::traits::CommitBatch;
use crate::types::*;

#[derive(Debug)]
pub struct UnitOfWork {
    /// Accounts as loaded, sent with the batch for the stale check
    loaded: BTreeMap<String, Account>,
    accounts: BTreeMap<String, Account>,
    touched: BTreeSet<String>,
    records: Vec<Transaction>,
    reversed: Vec<u64>,
    now: NaiveDateTime,
}

impl UnitOfWork {
    pub(crate) fn new(accounts: Vec<Account>) -> Self {
        let loaded: BTreeMap<String, Account> = accounts
            .into_iter()
            .map(|account| (account.id.clone(), account))
            .collect();
        Self {
            accounts: loaded.clone(),
            loaded,
            touched: BTreeSet::new(),
            records: Vec::new(),
            reversed: Vec::new(),
            now: chrono::Utc::now().naive_utc(),
        }
    }

    /// Working copy of a locked account
    pub fn account(&self, account_id: &str) -> LedgerResult<&Account> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// Fail with `AccountInactive` unless the account is active
    pub fn ensure_active(&self, account_id: &str) -> LedgerResult<()> {
        let account = self.account(account_id)?;
        if account.is_active() {
            Ok(())
        } else {
            Err(LedgerError::AccountInactive {
                account_id: account.id.clone(),
                status: account.status,
            })
        }
    }

    /// Check-and-apply a signed balance change.
    ///
    /// Rejects inactive accounts and any result below `-overdraft_limit`.
    /// Returns `(old_balance, new_balance)`.
    pub fn apply_delta(
        &mut self,
        account_id: &str,
        delta: &BigDecimal,
    ) -> LedgerResult<(BigDecimal, BigDecimal)> {
        self.ensure_active(account_id)?;

        let now = self.now;
        let account = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        if !account.can_absorb(delta) {
            return Err(LedgerError::InsufficientFunds {
                account_id: account.id.clone(),
                balance: account.balance.clone(),
                requested: delta.abs(),
            });
        }

        let old_balance = account.balance.clone();
        let new_balance = money::normalize(&(&old_balance + delta));
        account.balance = new_balance.clone();
        account.updated_at = now;
        self.touched.insert(account.id.clone());

        Ok((old_balance, new_balance))
    }

    /// Move an account forward in the status lattice, returning the updated copy
    pub fn set_status(&mut self, account_id: &str, status: AccountStatus) -> LedgerResult<Account> {
        let now = self.now;
        let account = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        if !account.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                from: account.status,
                to: status,
            });
        }

        account.status = status;
        account.updated_at = now;
        self.touched.insert(account.id.clone());
        Ok(account.clone())
    }

    /// Stage a record for append
    pub fn record(&mut self, transaction: Transaction) {
        self.records.push(transaction);
    }

    /// Stage a completed record to be flipped to `Reversed`
    pub fn mark_reversed(&mut self, transaction_id: u64) {
        self.reversed.push(transaction_id);
    }

    pub(crate) fn into_batch(self) -> CommitBatch {
        let UnitOfWork {
            mut loaded,
            mut accounts,
            touched,
            records,
            reversed,
            ..
        } = self;

        CommitBatch {
            expected: touched
                .iter()
                .filter_map(|id| loaded.remove(id))
                .collect(),
            accounts: touched
                .iter()
                .filter_map(|id| accounts.remove(id))
                .collect(),
            transactions: records,
            reversed,
        }
    }
}
