//! Account management functionality

use bigdecimal::BigDecimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::ledger::locks::AccountLocks;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::money;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::ValidationEngine;

/// Attempts at drawing a free generated account number
const ACCOUNT_NUMBER_ATTEMPTS: usize = 3;

/// Request to open a new account
#[derive(Debug, Clone)]
pub struct OpenAccount {
    pub customer_id: String,
    pub bank_code: String,
    pub branch_code: String,
    /// Ten digit local number; generated when absent
    pub account_number: Option<String>,
    pub account_type: AccountType,
    /// Decimal string, at least zero
    pub initial_balance: String,
    /// Falls back to the configured default currency
    pub currency: Option<String>,
    /// Decimal string, at least zero
    pub overdraft_limit: String,
    /// Percentage per posting period, at least zero
    pub interest_rate: String,
}

impl OpenAccount {
    pub fn new(
        customer_id: impl Into<String>,
        bank_code: impl Into<String>,
        branch_code: impl Into<String>,
        account_type: AccountType,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            bank_code: bank_code.into(),
            branch_code: branch_code.into(),
            account_number: None,
            account_type,
            initial_balance: "0".to_string(),
            currency: None,
            overdraft_limit: "0".to_string(),
            interest_rate: "0".to_string(),
        }
    }

    pub fn account_number(mut self, account_number: impl Into<String>) -> Self {
        self.account_number = Some(account_number.into());
        self
    }

    pub fn initial_balance(mut self, amount: impl Into<String>) -> Self {
        self.initial_balance = amount.into();
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn overdraft_limit(mut self, amount: impl Into<String>) -> Self {
        self.overdraft_limit = amount.into();
        self
    }

    pub fn interest_rate(mut self, rate: impl Into<String>) -> Self {
        self.interest_rate = rate.into();
        self
    }
}

/// Owns account state and the atomic check-and-apply primitive
#[derive(Debug)]
pub struct AccountStore<S: LedgerStorage> {
    pub(crate) storage: S,
    locks: Arc<AccountLocks>,
    config: LedgerConfig,
    validator: ValidationEngine,
}

impl<S: LedgerStorage> AccountStore<S> {
    /// Create a new account store
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, LedgerConfig::default())
    }

    /// Create a new account store with explicit configuration
    pub fn with_config(storage: S, config: LedgerConfig) -> Self {
        Self {
            storage,
            locks: Arc::new(AccountLocks::new()),
            config,
            validator: ValidationEngine::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    /// Open a new account
    pub async fn open_account(&self, request: OpenAccount) -> LedgerResult<Account> {
        self.validator.require(FieldKind::BankCode, &request.bank_code)?;
        self.validator.require(FieldKind::BranchCode, &request.branch_code)?;
        if let Some(ref number) = request.account_number {
            self.validator.require(FieldKind::AccountNumber, number)?;
        }

        let initial_balance = non_negative(&request.initial_balance)?;
        let overdraft_limit = non_negative(&request.overdraft_limit)?;
        let interest_rate = money::parse_decimal(&request.interest_rate)
            .map_err(|reason| LedgerError::InvalidAmount {
                value: request.interest_rate.clone(),
                reason,
            })?;
        if interest_rate < BigDecimal::from(0) {
            return Err(LedgerError::InvalidAmount {
                value: request.interest_rate.clone(),
                reason: ReasonCode::NotPositive,
            });
        }

        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.config.default_currency.clone())
            .to_ascii_uppercase();

        let attempts = if request.account_number.is_some() {
            1
        } else {
            ACCOUNT_NUMBER_ATTEMPTS
        };

        let mut last_err = None;
        for _ in 0..attempts {
            let number = request
                .account_number
                .clone()
                .unwrap_or_else(generate_account_number);
            let now = chrono::Utc::now().naive_utc();
            let account = Account {
                id: Account::full_number(&request.bank_code, &request.branch_code, &number),
                customer_id: request.customer_id.clone(),
                bank_code: request.bank_code.clone(),
                branch_code: request.branch_code.clone(),
                account_number: number,
                account_type: request.account_type,
                balance: initial_balance.clone(),
                opening_balance: initial_balance.clone(),
                currency: currency.clone(),
                status: AccountStatus::Active,
                overdraft_limit: overdraft_limit.clone(),
                interest_rate: interest_rate.clone(),
                created_at: now,
                updated_at: now,
            };

            match self.storage.insert_account(&account).await {
                Ok(()) => {
                    tracing::info!(
                        account_id = %account.id,
                        customer_id = %account.customer_id,
                        account_type = %account.account_type,
                        balance = %account.balance,
                        "account opened"
                    );
                    return Ok(account);
                }
                Err(err @ LedgerError::AccountAlreadyExists(_)) => last_err = Some(err),
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            LedgerError::Storage("could not allocate an account number".to_string())
        }))
    }

    /// Get an account by ID
    pub async fn find(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.storage.get_account(account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get(&self, account_id: &str) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// List accounts, optionally by type
    pub async fn list(&self, account_type: Option<AccountType>) -> LedgerResult<Vec<Account>> {
        self.storage.list_accounts(account_type).await
    }

    /// Current balance of one account
    pub async fn balance(&self, account_id: &str) -> LedgerResult<BigDecimal> {
        Ok(self.get(account_id).await?.balance)
    }

    /// Sum of all balances
    pub async fn total_balance(&self) -> LedgerResult<BigDecimal> {
        let accounts = self.list(None).await?;
        Ok(accounts.iter().map(|account| &account.balance).sum())
    }

    /// Run `work` against locked working copies of `account_ids` and commit
    /// whatever it staged as one atomic batch.
    ///
    /// Locks are taken in ascending id order and held until the commit
    /// returns. If `work` or the commit fails, the staged changes are
    /// discarded and shared state is exactly as before the call.
    pub(crate) async fn within_transaction<T, F>(
        &self,
        account_ids: &[&str],
        work: F,
    ) -> LedgerResult<(T, Vec<Transaction>)>
    where
        F: FnOnce(&mut UnitOfWork) -> LedgerResult<T> + Send,
        T: Send,
    {
        let _locks = self
            .locks
            .acquire(account_ids, self.config.lock_timeout)
            .await?;

        let mut accounts = Vec::with_capacity(account_ids.len());
        for account_id in account_ids {
            if let Some(account) = self.storage.get_account(account_id).await? {
                accounts.push(account);
            }
        }

        let mut unit = UnitOfWork::new(accounts);
        let value = work(&mut unit)?;

        let batch = unit.into_batch();
        if batch.is_empty() {
            return Ok((value, Vec::new()));
        }

        tracing::debug!(
            accounts = batch.accounts.len(),
            records = batch.transactions.len(),
            reversed = batch.reversed.len(),
            "committing unit of work"
        );
        match self.storage.commit(batch).await {
            Ok(records) => Ok((value, records)),
            Err(err @ LedgerError::Busy(_)) => {
                tracing::warn!(error = %err, accounts = ?account_ids, "account changed concurrently, changes discarded");
                Err(err)
            }
            Err(err) => {
                tracing::error!(error = %err, accounts = ?account_ids, "commit failed, changes discarded");
                Err(err)
            }
        }
    }

    /// Check-and-apply a signed balance change together with its record.
    ///
    /// `record` builds the transaction from `(old_balance, new_balance)`;
    /// both are committed in the same batch or not at all.
    pub(crate) async fn mutate_balance<R>(
        &self,
        account_id: &str,
        delta: &BigDecimal,
        record: R,
    ) -> LedgerResult<Transaction>
    where
        R: FnOnce(BigDecimal, BigDecimal) -> Transaction + Send,
    {
        if !money::fits_scale(delta) {
            return Err(LedgerError::InvalidAmount {
                value: delta.to_string(),
                reason: ReasonCode::ExcessPrecision,
            });
        }
        let (_, records) = self
            .within_transaction(&[account_id], |unit| {
                let (old_balance, new_balance) = unit.apply_delta(account_id, delta)?;
                unit.record(record(old_balance, new_balance));
                Ok(())
            })
            .await?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::Storage("commit returned no record".to_string()))
    }

    /// Move an account forward through `Active -> Suspended -> Closed`
    pub async fn set_status(&self, account_id: &str, status: AccountStatus) -> LedgerResult<Account> {
        let (account, _) = self
            .within_transaction(&[account_id], |unit| unit.set_status(account_id, status))
            .await?;
        tracing::info!(account_id = %account_id, status = %status, "account status changed");
        Ok(account)
    }
}

fn non_negative(value: &str) -> LedgerResult<BigDecimal> {
    money::parse_non_negative(value).map_err(|reason| LedgerError::InvalidAmount {
        value: value.to_string(),
        reason,
    })
}

/// Draw a random ten digit local account number
fn generate_account_number() -> String {
    let draw = Uuid::new_v4().as_u128() % 10_000_000_000;
    format!("{:010}", draw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use std::str::FromStr;
    use std::time::Duration;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    async fn store_with(balance: &str, overdraft: &str) -> (AccountStore<MemoryStorage>, String) {
        let store = AccountStore::new(MemoryStorage::new());
        let account = store
            .open_account(
                OpenAccount::new("CUST001", "123", "4567", AccountType::Checking)
                    .account_number("1234567890")
                    .initial_balance(balance)
                    .overdraft_limit(overdraft),
            )
            .await
            .unwrap();
        (store, account.id)
    }

    async fn adjust(
        store: &AccountStore<MemoryStorage>,
        account_id: &str,
        delta: &str,
    ) -> LedgerResult<Transaction> {
        let delta = dec(delta);
        let (kind, amount) = if delta < BigDecimal::from(0) {
            (TransactionType::Withdrawal, -&delta)
        } else {
            (TransactionType::Deposit, delta.clone())
        };
        store
            .mutate_balance(account_id, &delta, |before, after| {
                Transaction::pending(
                    account_id.to_string(),
                    kind,
                    amount,
                    before,
                    after,
                    "adjustment".to_string(),
                    new_reference(),
                )
            })
            .await
    }

    #[tokio::test]
    async fn test_open_account_defaults() {
        let (store, id) = store_with("100", "0").await;
        assert_eq!(id, "123-4567-1234567890");

        let account = store.get(&id).await.unwrap();
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.balance, dec("100.00"));
        assert_eq!(account.currency, "USD");
    }

    #[tokio::test]
    async fn test_open_account_generates_number() {
        let store = AccountStore::new(MemoryStorage::new());
        let account = store
            .open_account(OpenAccount::new("CUST001", "001", "0002", AccountType::Savings))
            .await
            .unwrap();
        assert_eq!(account.account_number.len(), 10);
        assert!(account.id.starts_with("001-0002-"));
    }

    #[tokio::test]
    async fn test_open_account_validation() {
        let store = AccountStore::new(MemoryStorage::new());

        let err = store
            .open_account(OpenAccount::new("CUST001", "12", "4567", AccountType::Savings))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError {
                field: FieldKind::BankCode,
                reason: ReasonCode::WrongLength,
            })
        ));

        let err = store
            .open_account(
                OpenAccount::new("CUST001", "123", "4567", AccountType::Savings)
                    .initial_balance("-1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }

    #[tokio::test]
    async fn test_identity_is_never_reused() {
        let (store, _) = store_with("0", "0").await;
        let err = store
            .open_account(
                OpenAccount::new("CUST002", "123", "4567", AccountType::Business)
                    .account_number("1234567890"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_mutate_balance_enforces_floor() {
        let (store, id) = store_with("100", "25").await;

        let txn = adjust(&store, &id, "-120").await.unwrap();
        assert_eq!(txn.balance_before, dec("100"));
        assert_eq!(txn.balance_after, dec("-20"));
        assert_eq!(txn.status, TransactionStatus::Completed);

        let err = adjust(&store, &id, "-5.01").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(store.balance(&id).await.unwrap(), dec("-20"));
        // every applied change has exactly one record
        assert_eq!(store.storage.count_account_transactions(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mutate_balance_updates_timestamp() {
        let (store, id) = store_with("1", "0").await;
        let before = store.get(&id).await.unwrap().updated_at;
        tokio::time::sleep(Duration::from_millis(5)).await;
        adjust(&store, &id, "1").await.unwrap();
        assert!(store.get(&id).await.unwrap().updated_at > before);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let (store, id) = store_with("0", "0").await;

        store.set_status(&id, AccountStatus::Suspended).await.unwrap();
        let err = adjust(&store, &id, "1").await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountInactive { .. }));

        let err = store.set_status(&id, AccountStatus::Active).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                from: AccountStatus::Suspended,
                to: AccountStatus::Active,
            }
        ));

        let closed = store.set_status(&id, AccountStatus::Closed).await.unwrap();
        assert_eq!(closed.status, AccountStatus::Closed);
    }

    #[tokio::test]
    async fn test_within_transaction_discards_on_error() {
        let (store, id) = store_with("10", "0").await;
        let result: LedgerResult<((), _)> = store
            .within_transaction(&[id.as_str()], |unit| {
                unit.apply_delta(&id, &dec("5"))?;
                Err(LedgerError::Storage("abandoned".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.balance(&id).await.unwrap(), dec("10"));
    }

    #[tokio::test]
    async fn test_busy_when_lock_is_held() {
        let store = AccountStore::with_config(
            MemoryStorage::new(),
            LedgerConfig::default().with_lock_timeout(Duration::from_millis(20)),
        );
        let account = store
            .open_account(OpenAccount::new("CUST001", "123", "4567", AccountType::Checking))
            .await
            .unwrap();

        let _held = store
            .locks()
            .acquire(&[account.id.as_str()], Duration::from_millis(20))
            .await
            .unwrap();
        let err = adjust(&store, &account.id, "1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Busy(_)));
        assert_eq!(store.balance(&account.id).await.unwrap(), dec("0"));
    }
}
