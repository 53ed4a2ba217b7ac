//! Per-account lock table
//!
//! Every mutation holds the locks of all accounts it touches for the whole
//! check-then-commit sequence. Locks are always taken in ascending account
//! id order, whatever role the account plays in the operation, so two
//! transfers over the same pair in opposite directions cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::types::*;

type LockTable = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Table of one async mutex per account id.
///
/// An entry lives only while some caller holds or waits for it.
#[derive(Debug, Default)]
pub struct AccountLocks {
    table: Arc<LockTable>,
}

/// Locks held on a set of accounts, released on drop
#[derive(Debug)]
pub struct LockSet {
    account_ids: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
}

impl LockSet {
    /// Locked account ids in acquisition order
    pub fn account_ids(&self) -> &[String] {
        &self.account_ids
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        self.guards.clear();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        for account_id in &self.account_ids {
            // the table's own handle is the last one left
            if table
                .get(account_id)
                .is_some_and(|handle| Arc::strong_count(handle) == 1)
            {
                table.remove(account_id);
            }
        }
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts currently locked or waited on
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(account_id.to_string()).or_default().clone()
    }

    /// Lock every listed account, waiting at most `wait` in total.
    ///
    /// Duplicates are collapsed. On timeout the locks taken so far are
    /// released and `LedgerError::Busy` names the account that was contended.
    /// A `wait` too large to form a deadline waits without a bound.
    pub async fn acquire(&self, account_ids: &[&str], wait: Duration) -> LedgerResult<LockSet> {
        let mut ordered: Vec<String> = account_ids.iter().map(|id| id.to_string()).collect();
        ordered.sort();
        ordered.dedup();

        let deadline = Instant::now().checked_add(wait);
        let mut set = LockSet {
            guards: Vec::with_capacity(ordered.len()),
            account_ids: ordered,
            table: self.table.clone(),
        };
        for account_id in &set.account_ids {
            let handle = self.handle(account_id);
            let guard = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, handle.lock_owned()).await,
                None => Ok(handle.lock_owned().await),
            };
            match guard {
                Ok(guard) => set.guards.push(guard),
                Err(_) => {
                    tracing::warn!(
                        account_id = %account_id,
                        wait_ms = wait.as_millis() as u64,
                        "timed out waiting for account lock"
                    );
                    return Err(LedgerError::Busy(account_id.clone()));
                }
            }
        }

        tracing::debug!(accounts = ?set.account_ids, "account locks acquired");
        Ok(set)
    }
}
