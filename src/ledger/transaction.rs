//! Transaction processing: deposits, withdrawals, transfers and their records
//!
//! Every operation follows the same path: validate the request, lock the
//! accounts involved, check and stage the balance changes together with the
//! records in a [`UnitOfWork`], then commit both in a single storage call.
//! A request that fails anywhere before the commit returns has no effect.

use bigdecimal::BigDecimal;

use crate::ledger::account::AccountStore;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::money;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::ValidationEngine;

/// Orchestrates balance mutations and the append-only record log
#[derive(Debug)]
pub struct TransactionLedger<S: LedgerStorage> {
    accounts: AccountStore<S>,
    validator: ValidationEngine,
}

impl<S: LedgerStorage> TransactionLedger<S> {
    /// Create a new transaction ledger over an account store
    pub fn new(accounts: AccountStore<S>) -> Self {
        Self {
            accounts,
            validator: ValidationEngine::new(),
        }
    }

    pub fn accounts(&self) -> &AccountStore<S> {
        &self.accounts
    }

    /// Credit `amount` to an account
    pub async fn deposit(
        &self,
        account_id: &str,
        amount: &str,
        description: &str,
    ) -> LedgerResult<Transaction> {
        let amount = self.validator.amount(amount)?;
        self.post(account_id, TransactionType::Deposit, amount, description)
            .await
    }

    /// Debit `amount` from an account, honoring its overdraft floor
    pub async fn withdraw(
        &self,
        account_id: &str,
        amount: &str,
        description: &str,
    ) -> LedgerResult<Transaction> {
        let amount = self.validator.amount(amount)?;
        self.post(account_id, TransactionType::Withdrawal, amount, description)
            .await
    }

    /// Debit a bank fee, honoring the overdraft floor
    pub async fn charge_fee(
        &self,
        account_id: &str,
        amount: &str,
        description: &str,
    ) -> LedgerResult<Transaction> {
        let amount = self.validator.amount(amount)?;
        self.post(account_id, TransactionType::Fee, amount, description)
            .await
    }

    /// Move `amount` from `source_id` to `dest_id`.
    ///
    /// Both legs commit together or not at all. Returns
    /// `(TRANSFER_OUT, TRANSFER_IN)`, linked by a shared reference.
    pub async fn transfer(
        &self,
        source_id: &str,
        dest_id: &str,
        amount: &str,
        description: &str,
    ) -> LedgerResult<(Transaction, Transaction)> {
        let amount = self.validator.amount(amount)?;
        if source_id == dest_id {
            return Err(LedgerError::SameAccountTransfer(source_id.to_string()));
        }
        self.validator.require(FieldKind::Description, description)?;

        let reference = new_reference();
        let outcome = self
            .accounts
            .within_transaction(&[source_id, dest_id], |unit| {
                // existence, then status, then funds
                unit.account(source_id)?;
                unit.account(dest_id)?;
                unit.ensure_active(source_id)?;
                unit.ensure_active(dest_id)?;

                let (out_before, out_after) = unit.apply_delta(source_id, &-&amount)?;
                let (in_before, in_after) = unit.apply_delta(dest_id, &amount)?;

                unit.record(
                    Transaction::pending(
                        source_id.to_string(),
                        TransactionType::TransferOut,
                        amount.clone(),
                        out_before,
                        out_after,
                        description.to_string(),
                        reference.clone(),
                    )
                    .with_related_account(dest_id.to_string()),
                );
                unit.record(
                    Transaction::pending(
                        dest_id.to_string(),
                        TransactionType::TransferIn,
                        amount.clone(),
                        in_before,
                        in_after,
                        description.to_string(),
                        reference.clone(),
                    )
                    .with_related_account(source_id.to_string()),
                );
                Ok(())
            })
            .await;

        let (_, records) = outcome.inspect_err(|err| log_rejection("transfer", err))?;
        let mut records = records.into_iter();
        match (records.next(), records.next()) {
            (Some(out_leg), Some(in_leg)) => {
                tracing::info!(
                    source = %source_id,
                    destination = %dest_id,
                    amount = %money::format(&amount),
                    reference = %reference,
                    "transfer committed"
                );
                Ok((out_leg, in_leg))
            }
            _ => Err(LedgerError::Storage(
                "commit did not return both transfer legs".to_string(),
            )),
        }
    }

    /// Credit interest of `balance * interest_rate / 100`, rounded half to
    /// even at two digits. Returns `None` when nothing accrues.
    pub async fn post_interest(
        &self,
        account_id: &str,
        description: &str,
    ) -> LedgerResult<Option<Transaction>> {
        self.validator.require(FieldKind::Description, description)?;

        let reference = new_reference();
        let outcome = self
            .accounts
            .within_transaction(&[account_id], |unit| {
                unit.ensure_active(account_id)?;
                let account = unit.account(account_id)?;
                let zero = BigDecimal::from(0);
                if account.balance <= zero || account.interest_rate <= zero {
                    return Ok(None);
                }

                let interest =
                    money::round(&(&account.balance * &account.interest_rate / BigDecimal::from(100)));
                if interest <= zero {
                    return Ok(None);
                }

                stage(
                    unit,
                    account_id,
                    TransactionType::Interest,
                    &interest,
                    description,
                    &reference,
                )?;
                Ok(Some(interest))
            })
            .await;

        let (interest, records) = outcome.inspect_err(|err| log_rejection("interest", err))?;
        match interest {
            None => Ok(None),
            Some(interest) => {
                tracing::info!(
                    account_id = %account_id,
                    amount = %money::format(&interest),
                    "interest posted"
                );
                single(records).map(Some)
            }
        }
    }

    /// Offset a completed record with compensating entries.
    ///
    /// Reversing either leg of a transfer reverses the pair. The originals
    /// are marked `Reversed` in the same commit that appends the
    /// compensating entries.
    pub async fn reverse(
        &self,
        transaction_id: u64,
        description: &str,
    ) -> LedgerResult<Vec<Transaction>> {
        self.validator.require(FieldKind::Description, description)?;

        let original = self
            .accounts
            .storage
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))?;

        if original.reversal_of.is_some() {
            return Err(LedgerError::NotReversible {
                transaction_id,
                reason: "compensating entries cannot be reversed".to_string(),
            });
        }
        if original.status != TransactionStatus::Completed {
            return Err(LedgerError::NotReversible {
                transaction_id,
                reason: format!("status is {:?}", original.status),
            });
        }

        let legs: Vec<Transaction> = match original.transaction_type {
            TransactionType::TransferIn | TransactionType::TransferOut => self
                .accounts
                .storage
                .get_transactions_by_reference(&original.reference)
                .await?
                .into_iter()
                .filter(|txn| txn.reversal_of.is_none())
                .collect(),
            _ => vec![original],
        };

        let account_ids: Vec<&str> = legs.iter().map(|leg| leg.account_id.as_str()).collect();
        let reference = new_reference();
        let outcome = self
            .accounts
            .within_transaction(&account_ids, |unit| {
                for leg in &legs {
                    let kind = compensating_type(leg.transaction_type);
                    let (before, after) =
                        unit.apply_delta(&leg.account_id, &kind.signed(&leg.amount))?;
                    let mut entry = Transaction::pending(
                        leg.account_id.clone(),
                        kind,
                        leg.amount.clone(),
                        before,
                        after,
                        description.to_string(),
                        reference.clone(),
                    )
                    .compensating(leg.id);
                    entry.related_account_id = leg.related_account_id.clone();
                    unit.record(entry);
                    unit.mark_reversed(leg.id);
                }
                Ok(())
            })
            .await;

        let (_, records) = outcome.inspect_err(|err| log_rejection("reversal", err))?;
        tracing::info!(
            transaction_id,
            entries = records.len(),
            reference = %reference,
            "transaction reversed"
        );
        Ok(records)
    }

    /// Single-account posting shared by deposit, withdrawal and fee
    async fn post(
        &self,
        account_id: &str,
        kind: TransactionType,
        amount: BigDecimal,
        description: &str,
    ) -> LedgerResult<Transaction> {
        self.validator.require(FieldKind::Description, description)?;

        let reference = new_reference();
        let txn = self
            .accounts
            .mutate_balance(account_id, &kind.signed(&amount), |before, after| {
                Transaction::pending(
                    account_id.to_string(),
                    kind,
                    amount.clone(),
                    before,
                    after,
                    description.to_string(),
                    reference,
                )
            })
            .await
            .inspect_err(|err| log_rejection(&kind.to_string(), err))?;
        tracing::info!(
            account_id = %account_id,
            kind = %kind,
            amount = %money::format(&amount),
            balance = %money::format(&txn.balance_after),
            "transaction committed"
        );
        Ok(txn)
    }
}

/// Apply one signed posting to the unit and stage its record
fn stage(
    unit: &mut UnitOfWork,
    account_id: &str,
    kind: TransactionType,
    amount: &BigDecimal,
    description: &str,
    reference: &str,
) -> LedgerResult<()> {
    let (before, after) = unit.apply_delta(account_id, &kind.signed(amount))?;
    unit.record(Transaction::pending(
        account_id.to_string(),
        kind,
        amount.clone(),
        before,
        after,
        description.to_string(),
        reference.to_string(),
    ));
    Ok(())
}

fn single(records: Vec<Transaction>) -> LedgerResult<Transaction> {
    records
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::Storage("commit returned no record".to_string()))
}

fn compensating_type(kind: TransactionType) -> TransactionType {
    match kind {
        TransactionType::Deposit | TransactionType::Interest => TransactionType::Withdrawal,
        TransactionType::Withdrawal | TransactionType::Fee => TransactionType::Deposit,
        TransactionType::TransferOut => TransactionType::TransferIn,
        TransactionType::TransferIn => TransactionType::TransferOut,
    }
}

fn log_rejection(operation: &str, err: &LedgerError) {
    match err {
        LedgerError::InsufficientFunds { .. } | LedgerError::AccountInactive { .. } => {
            tracing::warn!(operation, error = %err, "operation rejected")
        }
        LedgerError::Busy(_) | LedgerError::Storage(_) => {}
        _ => tracing::debug!(operation, error = %err, "operation rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::OpenAccount;
    use crate::utils::memory_storage::MemoryStorage;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    async fn open(
        ledger: &TransactionLedger<MemoryStorage>,
        number: &str,
        balance: &str,
        overdraft: &str,
    ) -> String {
        ledger
            .accounts()
            .open_account(
                OpenAccount::new("CUST001", "001", "0001", AccountType::Checking)
                    .account_number(number)
                    .initial_balance(balance)
                    .overdraft_limit(overdraft)
                    .interest_rate("1.5"),
            )
            .await
            .unwrap()
            .id
    }

    fn ledger() -> (TransactionLedger<MemoryStorage>, MemoryStorage) {
        let storage = MemoryStorage::new();
        (
            TransactionLedger::new(AccountStore::new(storage.clone())),
            storage,
        )
    }

    #[tokio::test]
    async fn test_deposit_records_completed_entry() {
        let (ledger, storage) = ledger();
        let id = open(&ledger, "0000000001", "10", "0").await;

        let txn = ledger.deposit(&id, "5.25", "cash").await.unwrap();
        assert_eq!(txn.transaction_type, TransactionType::Deposit);
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.balance_before, dec("10.00"));
        assert_eq!(txn.balance_after, dec("15.25"));
        assert!(txn.id > 0);
        assert_eq!(storage.count_account_transactions(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deposit_rejects_bad_amounts_without_records() {
        let (ledger, storage) = ledger();
        let id = open(&ledger, "0000000001", "10", "0").await;

        for bad in ["-5", "0", "abc", "1.001", ""] {
            let err = ledger.deposit(&id, bad, "x").await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount { .. }), "{bad}");
        }
        assert_eq!(ledger.accounts().balance(&id).await.unwrap(), dec("10"));
        assert_eq!(storage.count_account_transactions(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deposit_to_missing_account() {
        let (ledger, _) = ledger();
        for number in 0..50 {
            let err = ledger
                .deposit(&format!("001-0001-{number:010}"), "1", "x")
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::AccountNotFound(_)));
        }
        assert!(ledger.accounts().locks().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_respects_floor() {
        let (ledger, storage) = ledger();
        let id = open(&ledger, "0000000001", "100", "0").await;

        let err = ledger.withdraw(&id, "150", "atm").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.accounts().balance(&id).await.unwrap(), dec("100"));
        assert_eq!(storage.count_account_transactions(&id).await.unwrap(), 0);

        let txn = ledger.withdraw(&id, "100", "atm").await.unwrap();
        assert_eq!(txn.balance_after, dec("0"));
    }

    #[tokio::test]
    async fn test_withdraw_into_overdraft() {
        let (ledger, _) = ledger();
        let id = open(&ledger, "0000000001", "10", "40").await;

        let txn = ledger.withdraw(&id, "50", "rent").await.unwrap();
        assert_eq!(txn.balance_after, dec("-40"));
        assert!(ledger.withdraw(&id, "0.01", "rent").await.is_err());
    }

    #[tokio::test]
    async fn test_transfer_legs_are_linked() {
        let (ledger, _) = ledger();
        let a = open(&ledger, "0000000001", "50", "0").await;
        let b = open(&ledger, "0000000002", "0", "0").await;

        let (out_leg, in_leg) = ledger.transfer(&a, &b, "50", "rent").await.unwrap();
        assert_eq!(out_leg.transaction_type, TransactionType::TransferOut);
        assert_eq!(in_leg.transaction_type, TransactionType::TransferIn);
        assert_eq!(out_leg.amount, in_leg.amount);
        assert_eq!(out_leg.reference, in_leg.reference);
        assert_eq!(out_leg.related_account_id.as_deref(), Some(b.as_str()));
        assert_eq!(in_leg.related_account_id.as_deref(), Some(a.as_str()));
        assert_eq!(ledger.accounts().balance(&a).await.unwrap(), dec("0"));
        assert_eq!(ledger.accounts().balance(&b).await.unwrap(), dec("50"));
    }

    #[tokio::test]
    async fn test_transfer_failure_modes() {
        let (ledger, storage) = ledger();
        let a = open(&ledger, "0000000001", "50", "0").await;
        let b = open(&ledger, "0000000002", "0", "0").await;

        assert!(matches!(
            ledger.transfer(&a, &a, "1", "x").await,
            Err(LedgerError::SameAccountTransfer(_))
        ));
        assert!(matches!(
            ledger.transfer(&a, "001-0001-0000000009", "1", "x").await,
            Err(LedgerError::AccountNotFound(ref id)) if id == "001-0001-0000000009"
        ));
        assert!(matches!(
            ledger.transfer(&a, &b, "50.01", "x").await,
            Err(LedgerError::InsufficientFunds { .. })
        ));

        ledger
            .accounts()
            .set_status(&b, AccountStatus::Suspended)
            .await
            .unwrap();
        assert!(matches!(
            ledger.transfer(&a, &b, "1", "x").await,
            Err(LedgerError::AccountInactive { ref account_id, .. }) if *account_id == b
        ));

        assert_eq!(ledger.accounts().balance(&a).await.unwrap(), dec("50"));
        assert_eq!(ledger.accounts().balance(&b).await.unwrap(), dec("0"));
        assert_eq!(storage.count_account_transactions(&a).await.unwrap(), 0);
        assert_eq!(storage.count_account_transactions(&b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_reverts_everything() {
        let (ledger, storage) = ledger();
        let a = open(&ledger, "0000000001", "50", "0").await;
        let b = open(&ledger, "0000000002", "0", "0").await;

        storage.fail_next_commit();
        let err = ledger.transfer(&a, &b, "20", "x").await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(ledger.accounts().balance(&a).await.unwrap(), dec("50"));
        assert_eq!(ledger.accounts().balance(&b).await.unwrap(), dec("0"));
        assert_eq!(storage.count_account_transactions(&a).await.unwrap(), 0);

        // the ledger is usable right after
        ledger.transfer(&a, &b, "20", "x").await.unwrap();
        assert_eq!(ledger.accounts().balance(&b).await.unwrap(), dec("20"));
    }

    #[tokio::test]
    async fn test_fee_and_interest() {
        let (ledger, _) = ledger();
        let id = open(&ledger, "0000000001", "200", "0").await;

        let fee = ledger.charge_fee(&id, "2.50", "monthly fee").await.unwrap();
        assert_eq!(fee.transaction_type, TransactionType::Fee);
        assert_eq!(fee.balance_after, dec("197.50"));

        // 197.50 * 1.5% = 2.9625 -> 2.96
        let interest = ledger.post_interest(&id, "interest").await.unwrap().unwrap();
        assert_eq!(interest.transaction_type, TransactionType::Interest);
        assert_eq!(interest.amount, dec("2.96"));
        assert_eq!(interest.balance_after, dec("200.46"));
    }

    #[tokio::test]
    async fn test_no_interest_on_empty_balance() {
        let (ledger, storage) = ledger();
        let id = open(&ledger, "0000000001", "0", "0").await;
        assert!(ledger.post_interest(&id, "interest").await.unwrap().is_none());
        assert_eq!(storage.count_account_transactions(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reverse_deposit() {
        let (ledger, storage) = ledger();
        let id = open(&ledger, "0000000001", "0", "0").await;
        let deposit = ledger.deposit(&id, "30", "paycheck").await.unwrap();

        let entries = ledger.reverse(deposit.id, "bounced").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_type, TransactionType::Withdrawal);
        assert_eq!(entries[0].reversal_of, Some(deposit.id));
        assert_eq!(ledger.accounts().balance(&id).await.unwrap(), dec("0"));

        let original = storage.get_transaction(deposit.id).await.unwrap().unwrap();
        assert_eq!(original.status, TransactionStatus::Reversed);

        assert!(matches!(
            ledger.reverse(deposit.id, "again").await,
            Err(LedgerError::NotReversible { .. })
        ));
        assert!(matches!(
            ledger.reverse(entries[0].id, "undo undo").await,
            Err(LedgerError::NotReversible { .. })
        ));
    }

    #[tokio::test]
    async fn test_reverse_transfer_reverses_both_legs() {
        let (ledger, storage) = ledger();
        let a = open(&ledger, "0000000001", "80", "0").await;
        let b = open(&ledger, "0000000002", "0", "0").await;
        let (_, in_leg) = ledger.transfer(&a, &b, "30", "loan").await.unwrap();

        let entries = ledger.reverse(in_leg.id, "returned").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(ledger.accounts().balance(&a).await.unwrap(), dec("80"));
        assert_eq!(ledger.accounts().balance(&b).await.unwrap(), dec("0"));
        for leg in storage.get_transactions_by_reference(&in_leg.reference).await.unwrap() {
            assert_eq!(leg.status, TransactionStatus::Reversed);
        }
    }

    #[tokio::test]
    async fn test_reverse_deposit_blocked_by_floor() {
        let (ledger, _) = ledger();
        let id = open(&ledger, "0000000001", "0", "0").await;
        let deposit = ledger.deposit(&id, "30", "paycheck").await.unwrap();
        ledger.withdraw(&id, "20", "spent").await.unwrap();

        let err = ledger.reverse(deposit.id, "bounced").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.accounts().balance(&id).await.unwrap(), dec("10"));
    }

    #[tokio::test]
    async fn test_ten_thousand_cents_without_drift() {
        let (ledger, _) = ledger();
        let id = open(&ledger, "0000000001", "0", "0").await;

        let mut expected = dec("0.00");
        for _ in 0..10_000 {
            let txn = ledger.deposit(&id, "0.01", "cent").await.unwrap();
            assert_eq!(txn.balance_before, expected);
            expected = &expected + dec("0.01");
            assert_eq!(txn.balance_after, expected);
            assert!(txn.is_consistent());
        }
        assert_eq!(ledger.accounts().balance(&id).await.unwrap(), dec("100.00"));
    }
}
