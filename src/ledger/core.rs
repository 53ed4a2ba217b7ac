//! Main ledger orchestrator that coordinates accounts, transactions and statements

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::ledger::{AccountStore, OpenAccount, StatementGenerator, TransactionLedger};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::ValidationEngine;

/// Main ledger system exposing every banking operation
#[derive(Debug)]
pub struct Ledger<S: LedgerStorage> {
    transactions: TransactionLedger<S>,
    statements: StatementGenerator<S>,
    validator: ValidationEngine,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a new ledger with the given storage backend
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, LedgerConfig::default())
    }

    /// Create a new ledger with explicit configuration
    pub fn with_config(storage: S, config: LedgerConfig) -> Self {
        Self {
            transactions: TransactionLedger::new(AccountStore::with_config(
                storage.clone(),
                config.clone(),
            )),
            statements: StatementGenerator::with_config(storage, config),
            validator: ValidationEngine::new(),
        }
    }
}

impl<S: LedgerStorage> Ledger<S> {
    pub(crate) fn accounts(&self) -> &AccountStore<S> {
        self.transactions.accounts()
    }

    pub fn config(&self) -> &LedgerConfig {
        self.accounts().config()
    }

    // Account operations
    /// Open a new account
    pub async fn open_account(&self, request: OpenAccount) -> LedgerResult<Account> {
        self.accounts().open_account(request).await
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.accounts().find(account_id).await
    }

    /// List accounts, optionally by type
    pub async fn list_accounts(
        &self,
        account_type: Option<AccountType>,
    ) -> LedgerResult<Vec<Account>> {
        self.accounts().list(account_type).await
    }

    /// Current balance of an account
    pub async fn get_balance(&self, account_id: &str) -> LedgerResult<BigDecimal> {
        self.accounts().balance(account_id).await
    }

    /// Suspend or close an account
    pub async fn set_account_status(
        &self,
        account_id: &str,
        status: AccountStatus,
    ) -> LedgerResult<Account> {
        self.accounts().set_status(account_id, status).await
    }

    // Transaction operations
    pub async fn deposit(
        &self,
        account_id: &str,
        amount: &str,
        description: &str,
    ) -> LedgerResult<Transaction> {
        self.transactions.deposit(account_id, amount, description).await
    }

    pub async fn withdraw(
        &self,
        account_id: &str,
        amount: &str,
        description: &str,
    ) -> LedgerResult<Transaction> {
        self.transactions.withdraw(account_id, amount, description).await
    }

    pub async fn transfer(
        &self,
        source_id: &str,
        dest_id: &str,
        amount: &str,
        description: &str,
    ) -> LedgerResult<(Transaction, Transaction)> {
        self.transactions
            .transfer(source_id, dest_id, amount, description)
            .await
    }

    pub async fn charge_fee(
        &self,
        account_id: &str,
        amount: &str,
        description: &str,
    ) -> LedgerResult<Transaction> {
        self.transactions
            .charge_fee(account_id, amount, description)
            .await
    }

    pub async fn post_interest(
        &self,
        account_id: &str,
        description: &str,
    ) -> LedgerResult<Option<Transaction>> {
        self.transactions.post_interest(account_id, description).await
    }

    pub async fn reverse_transaction(
        &self,
        transaction_id: u64,
        description: &str,
    ) -> LedgerResult<Vec<Transaction>> {
        self.transactions.reverse(transaction_id, description).await
    }

    // Statement operations
    pub async fn statement(
        &self,
        account_id: &str,
        limit: usize,
        offset: usize,
    ) -> LedgerResult<Vec<Transaction>> {
        self.statements.statement(account_id, limit, offset).await
    }

    pub async fn all_transactions(&self, account_id: &str) -> LedgerResult<Vec<Transaction>> {
        self.statements.all_transactions(account_id).await
    }

    pub async fn transactions_by_type(
        &self,
        account_id: &str,
        transaction_type: TransactionType,
    ) -> LedgerResult<Vec<Transaction>> {
        self.statements
            .transactions_by_type(account_id, transaction_type)
            .await
    }

    pub async fn transaction_count(&self, account_id: &str) -> LedgerResult<usize> {
        self.statements.transaction_count(account_id).await
    }

    pub async fn recent_transactions(&self, limit: usize) -> LedgerResult<Vec<Transaction>> {
        self.statements.recent_transactions(limit).await
    }

    pub async fn get_transaction(&self, transaction_id: u64) -> LedgerResult<Transaction> {
        self.statements.transaction(transaction_id).await
    }

    /// Classify a raw field value
    pub fn validate(&self, kind: FieldKind, value: &str) -> Classification {
        self.validator.classify(kind, value)
    }

    /// Check an account's balance against its recorded history
    pub async fn verify_integrity(&self, account_id: &str) -> LedgerResult<IntegrityReport> {
        let account = self.accounts().get(account_id).await?;
        let mut history = self.statements.all_transactions(account_id).await?;
        history.reverse();

        let mut issues = Vec::new();

        if account.balance < account.floor() {
            issues.push(format!(
                "Balance {} is below the overdraft floor {}",
                account.balance,
                account.floor()
            ));
        }

        for txn in &history {
            if !txn.is_consistent() {
                issues.push(format!(
                    "Transaction {} does not balance: {} + {} != {}",
                    txn.id,
                    txn.balance_before,
                    txn.signed_amount(),
                    txn.balance_after
                ));
            }
        }

        if let Some(first) = history.first() {
            if first.balance_before != account.opening_balance {
                issues.push(format!(
                    "Transaction {} starts from {} but the account opened with {}",
                    first.id, first.balance_before, account.opening_balance
                ));
            }
        }

        for pair in history.windows(2) {
            if pair[0].balance_after != pair[1].balance_before {
                issues.push(format!(
                    "Gap between transactions {} and {}: {} then {}",
                    pair[0].id, pair[1].id, pair[0].balance_after, pair[1].balance_before
                ));
            }
        }

        let recorded_balance = history.last().map(|txn| txn.balance_after.clone());
        let expected_balance = recorded_balance
            .as_ref()
            .unwrap_or(&account.opening_balance);
        if *expected_balance != account.balance {
            issues.push(format!(
                "Balance {} differs from recorded balance {}",
                account.balance, expected_balance
            ));
        }

        Ok(IntegrityReport {
            account_id: account.id,
            is_valid: issues.is_empty(),
            issues,
            balance: account.balance,
            recorded_balance,
            transaction_count: history.len(),
        })
    }

    /// Close the underlying storage handle
    pub async fn close(&self) -> LedgerResult<()> {
        tracing::info!("closing ledger storage");
        self.accounts().storage.close().await
    }
}

/// Report on one account's consistency with its history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub account_id: String,
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub balance: BigDecimal,
    /// `balance_after` of the newest record; `None` when only the opening
    /// balance is on file
    pub recorded_balance: Option<BigDecimal>,
    pub transaction_count: usize,
}
