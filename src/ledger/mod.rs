//! Ledger module containing account management, transaction processing and statements

pub mod account;
pub mod core;
pub mod locks;
pub mod statement;
pub mod transaction;
pub mod unit_of_work;

pub use account::*;
pub use core::*;
pub use locks::*;
pub use statement::*;
pub use transaction::*;
pub use unit_of_work::*;
