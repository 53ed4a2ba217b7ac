//! # Banking Core
//!
//! The transactional heart of a retail banking system: customer accounts
//! with fixed-point balances, an append-only transaction log, and atomic
//! deposits, withdrawals and transfers.
//!
//! ## Features
//!
//! - **Input validation**: one rule per field kind with stable reason codes
//! - **Account management**: opening, status lattice, overdraft floors
//! - **Transactions**: deposits, withdrawals, transfers, fees, interest and reversals
//! - **Statements**: paginated, newest-first history per account
//! - **Concurrency**: per-account locks in a fixed order with a bounded wait
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use banking_core::{AccountType, Ledger, LedgerResult, MemoryStorage, OpenAccount};
//!
//! # #[tokio::main]
//! # async fn main() -> LedgerResult<()> {
//! let ledger = Ledger::new(MemoryStorage::new());
//! let account = ledger
//!     .open_account(OpenAccount::new("CUST001", "123", "4567", AccountType::Savings))
//!     .await?;
//! ledger.deposit(&account.id, "100.00", "opening deposit").await?;
//! assert_eq!(ledger.get_balance(&account.id).await?.to_string(), "100.00");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod ledger;
pub mod money;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use auth::{authorize, KeyHasher, MemoryAuthorizer};
pub use config::LedgerConfig;
pub use ledger::*;
pub use traits::*;
pub use types::*;
pub use utils::*;
