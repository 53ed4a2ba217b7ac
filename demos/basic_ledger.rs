//! Basic ledger usage example
//!
//! Run with `RUST_LOG=banking_core=debug` to see lock and commit events.

use banking_core::utils::MemoryStorage;
use banking_core::{
    authorize, AccountType, FieldKind, Ledger, LedgerConfig, LedgerError, MemoryAuthorizer,
    OpenAccount, TransactionType,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banking_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("Banking Core - Basic Ledger Example\n");

    let config = LedgerConfig::new().with_lock_timeout(Duration::from_secs(2));
    let ledger = Ledger::with_config(MemoryStorage::new(), config);

    // 1. Validate customer input
    println!("Validating input...");
    for (kind, value) in [
        (FieldKind::BankCode, "123"),
        (FieldKind::BankCode, "12"),
        (FieldKind::PersonalKey, "Abcd1234"),
        (FieldKind::PersonalKey, "abcd1234"),
    ] {
        let result = ledger.validate(kind, value);
        match result.reason {
            None => println!("  ok   {} {:?}", kind, value),
            Some(reason) => println!("  FAIL {} {:?}: {}", kind, value, reason),
        }
    }
    println!();

    // 2. Open accounts
    println!("Opening accounts...");
    let checking = ledger
        .open_account(
            OpenAccount::new("CUST001", "123", "4567", AccountType::Checking)
                .account_number("1234567890")
                .initial_balance("250.00")
                .overdraft_limit("100.00"),
        )
        .await?;
    let savings = ledger
        .open_account(
            OpenAccount::new("CUST001", "123", "4567", AccountType::Savings)
                .interest_rate("1.25"),
        )
        .await?;
    for account in [&checking, &savings] {
        println!(
            "  {} {} balance {} {}",
            account.id, account.account_type, account.balance, account.currency
        );
    }
    println!();

    // 3. Gate access, then move money
    let authorizer = MemoryAuthorizer::new();
    authorizer.grant("alice", &checking.id)?;
    authorizer.grant("alice", &savings.id)?;
    authorize(&authorizer, "alice", &[checking.id.as_str(), savings.id.as_str()]).await?;

    println!("Recording transactions...");
    ledger.deposit(&checking.id, "1200.00", "salary").await?;
    ledger.withdraw(&checking.id, "80.45", "groceries").await?;
    let (out_leg, in_leg) = ledger
        .transfer(&checking.id, &savings.id, "500.00", "monthly savings")
        .await?;
    println!(
        "  transfer {} -> {} ({} / {})",
        out_leg.account_id, in_leg.account_id, out_leg.reference, in_leg.reference
    );
    let fee = ledger.charge_fee(&checking.id, "2.50", "account fee").await?;
    if let Some(interest) = ledger.post_interest(&savings.id, "monthly interest").await? {
        println!("  interest credited: {}", interest.amount);
    }
    ledger.reverse_transaction(fee.id, "fee waived").await?;
    println!();

    // 4. Rejections leave balances untouched
    println!("Trying invalid operations...");
    let attempts: [(&str, Result<(), LedgerError>); 3] = [
        (
            "negative deposit",
            ledger.deposit(&checking.id, "-5", "x").await.map(|_| ()),
        ),
        (
            "overdraft breach",
            ledger.withdraw(&checking.id, "10000", "x").await.map(|_| ()),
        ),
        (
            "self transfer",
            ledger
                .transfer(&checking.id, &checking.id, "1", "x")
                .await
                .map(|_| ()),
        ),
    ];
    for (label, attempt) in attempts {
        if let Err(err) = attempt {
            println!("  {}: {}", label, err);
        }
    }
    println!();

    // 5. Statements
    println!("Checking statement:");
    for txn in ledger.statement(&checking.id, 0, 0).await? {
        println!(
            "  #{:<3} {:<12} {:>10} -> {:>10}  {}",
            txn.id, txn.transaction_type, txn.amount, txn.balance_after, txn.description
        );
    }
    let deposits = ledger
        .transactions_by_type(&checking.id, TransactionType::Deposit)
        .await?;
    println!("  deposits: {}", deposits.len());
    println!();

    for account in ledger.list_accounts(None).await? {
        let report = ledger.verify_integrity(&account.id).await?;
        println!(
            "{} balance {} integrity {}",
            account.id,
            report.balance,
            if report.is_valid { "ok" } else { "BROKEN" }
        );
    }

    ledger.close().await?;
    Ok(())
}
