//! Core types and data structures for the banking ledger

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kinds of customer account offered by the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Savings,
    Checking,
    Business,
}

impl AccountType {
    /// Parse a case-insensitive account type name such as `"savings"`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SAVINGS" => Some(AccountType::Savings),
            "CHECKING" => Some(AccountType::Checking),
            "BUSINESS" => Some(AccountType::Business),
            _ => None,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountType::Savings => "SAVINGS",
            AccountType::Checking => "CHECKING",
            AccountType::Business => "BUSINESS",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of an account.
///
/// Statuses only move forward: `Active -> Suspended -> Closed`. A closed
/// account is never reopened and its identity is never handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

impl AccountStatus {
    fn rank(self) -> u8 {
        match self {
            AccountStatus::Active => 0,
            AccountStatus::Suspended => 1,
            AccountStatus::Closed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only lattice
    pub fn can_transition_to(self, next: AccountStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Suspended => "SUSPENDED",
            AccountStatus::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Customer account holding a monetary balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Full account number `BBB-RRRR-NNNNNNNNNN`, the immutable identity
    pub id: String,
    /// Owning customer. Lookup only; the account does not own the customer.
    pub customer_id: String,
    /// Three digit bank code
    pub bank_code: String,
    /// Four digit branch code
    pub branch_code: String,
    /// Ten digit local account number
    pub account_number: String,
    pub account_type: AccountType,
    /// Current balance, always at scale 2
    pub balance: BigDecimal,
    /// Balance the account was opened with; the first record starts here
    #[serde(default)]
    pub opening_balance: BigDecimal,
    /// ISO currency code
    pub currency: String,
    pub status: AccountStatus,
    /// How far below zero the balance may go
    pub overdraft_limit: BigDecimal,
    /// Interest rate as a percentage per posting period
    pub interest_rate: BigDecimal,
    /// When the account was created
    pub created_at: NaiveDateTime,
    /// When the account was last modified
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Compose the full account number used as identity
    pub fn full_number(bank_code: &str, branch_code: &str, account_number: &str) -> String {
        format!("{}-{}-{}", bank_code, branch_code, account_number)
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Lowest balance this account may ever hold
    pub fn floor(&self) -> BigDecimal {
        -&self.overdraft_limit
    }

    /// Balance plus the unused overdraft headroom
    pub fn available_funds(&self) -> BigDecimal {
        &self.balance + &self.overdraft_limit
    }

    /// Whether applying `delta` keeps the balance at or above the floor
    pub fn can_absorb(&self, delta: &BigDecimal) -> bool {
        &self.balance + delta >= self.floor()
    }
}

/// Types of balance-affecting transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    Fee,
    Interest,
}

impl TransactionType {
    /// Credits increase the balance, everything else decreases it
    pub fn is_credit(self) -> bool {
        matches!(
            self,
            TransactionType::Deposit | TransactionType::TransferIn | TransactionType::Interest
        )
    }

    /// Apply this type's sign to a positive amount
    pub fn signed(self, amount: &BigDecimal) -> BigDecimal {
        if self.is_credit() {
            amount.clone()
        } else {
            -amount
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::TransferIn => "TRANSFER_IN",
            TransactionType::TransferOut => "TRANSFER_OUT",
            TransactionType::Fee => "FEE",
            TransactionType::Interest => "INTEREST",
        };
        f.write_str(name)
    }
}

/// Status of a transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Staged inside a unit of work, not yet durable
    Pending,
    Completed,
    Failed,
    /// Offset by a later compensating entry
    Reversed,
}

/// Immutable record of a single balance mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sequence assigned by storage at commit time, 0 while pending
    pub id: u64,
    /// Globally unique correlation token
    pub correlation_id: Uuid,
    /// Account whose balance moved
    pub account_id: String,
    pub transaction_type: TransactionType,
    /// Always positive, the sign comes from the transaction type
    pub amount: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub description: String,
    /// Reference number shared by records written in the same operation
    pub reference: String,
    /// Counterparty account for transfer legs
    pub related_account_id: Option<String>,
    /// Id of the record this entry compensates, if any
    pub reversal_of: Option<u64>,
    pub status: TransactionStatus,
    pub created_at: NaiveDateTime,
}

impl Transaction {
    /// Create a pending record; storage completes it on commit
    pub fn pending(
        account_id: String,
        transaction_type: TransactionType,
        amount: BigDecimal,
        balance_before: BigDecimal,
        balance_after: BigDecimal,
        description: String,
        reference: String,
    ) -> Self {
        Self {
            id: 0,
            correlation_id: Uuid::new_v4(),
            account_id,
            transaction_type,
            amount,
            balance_before,
            balance_after,
            description,
            reference,
            related_account_id: None,
            reversal_of: None,
            status: TransactionStatus::Pending,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Link a transfer leg to its counterparty
    pub fn with_related_account(mut self, account_id: String) -> Self {
        self.related_account_id = Some(account_id);
        self
    }

    /// Mark this record as compensating `transaction_id`
    pub fn compensating(mut self, transaction_id: u64) -> Self {
        self.reversal_of = Some(transaction_id);
        self
    }

    /// Amount with the sign of its effect on the balance
    pub fn signed_amount(&self) -> BigDecimal {
        self.transaction_type.signed(&self.amount)
    }

    /// `balance_after == balance_before + signed_amount`, exactly
    pub fn is_consistent(&self) -> bool {
        &self.balance_before + self.signed_amount() == self.balance_after
    }
}

/// Generate a reference number for a new operation
pub fn new_reference() -> String {
    let token = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("TXN-{}", &token[..16])
}

/// Input fields understood by the validation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKind {
    BankCode,
    BranchCode,
    /// Ten digit local part of an account number
    AccountNumber,
    /// `BBB-RRRR-NNNNNNNNNN`
    FullAccountNumber,
    PersonalKey,
    Amount,
    /// Free-text transaction description
    Description,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::BankCode => "bank code",
            FieldKind::BranchCode => "branch code",
            FieldKind::AccountNumber => "account number",
            FieldKind::FullAccountNumber => "full account number",
            FieldKind::PersonalKey => "personal key",
            FieldKind::Amount => "amount",
            FieldKind::Description => "description",
        };
        f.write_str(name)
    }
}

/// Deterministic reason an input falls in an invalid equivalence class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Empty,
    NonNumeric,
    WrongLength,
    MissingUpper,
    MissingLower,
    MissingDigit,
    IllegalChar,
    NotPositive,
    ExcessPrecision,
    Malformed,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::Empty => "EMPTY",
            ReasonCode::NonNumeric => "NON_NUMERIC",
            ReasonCode::WrongLength => "WRONG_LENGTH",
            ReasonCode::MissingUpper => "MISSING_UPPER",
            ReasonCode::MissingLower => "MISSING_LOWER",
            ReasonCode::MissingDigit => "MISSING_DIGIT",
            ReasonCode::IllegalChar => "ILLEGAL_CHAR",
            ReasonCode::NotPositive => "NOT_POSITIVE",
            ReasonCode::ExcessPrecision => "EXCESS_PRECISION",
            ReasonCode::Malformed => "MALFORMED",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one input value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub valid: bool,
    /// Present exactly when `valid` is false
    pub reason: Option<ReasonCode>,
}

impl Classification {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: ReasonCode) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// A field that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{field} is invalid: {reason}")]
pub struct ValidationError {
    pub field: FieldKind,
    pub reason: ReasonCode,
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: ReasonCode },
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Account {account_id} is not active ({status})")]
    AccountInactive {
        account_id: String,
        status: AccountStatus,
    },
    #[error("Insufficient funds in {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: String,
        balance: BigDecimal,
        requested: BigDecimal,
    },
    #[error("Cannot transfer to the same account: {0}")]
    SameAccountTransfer(String),
    #[error("Account {0} is busy, retry later")]
    Busy(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: AccountStatus,
        to: AccountStatus,
    },
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Transaction {transaction_id} cannot be reversed: {reason}")]
    NotReversible { transaction_id: u64, reason: String },
    #[error("Principal {principal} is not authorized for account {account_id}")]
    Unauthorized {
        principal: String,
        account_id: String,
    },
}

impl LedgerError {
    /// Only lock contention is safe to retry unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Busy(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
