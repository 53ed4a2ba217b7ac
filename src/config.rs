//! Ledger configuration
//!
//! Built explicitly and handed to [`Ledger::with_config`](crate::Ledger::with_config).
//! Deserializable so a host service can load it from its own config source.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Longest a mutation waits for an account lock before reporting `Busy`
    #[serde(rename = "lock_timeout_ms", with = "duration_ms")]
    pub lock_timeout: Duration,
    /// Currency assigned to new accounts that do not name one
    pub default_currency: String,
    /// Page size used when a statement is requested with limit 0
    pub default_statement_limit: usize,
    /// Upper bound on a single statement page
    pub max_statement_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            default_currency: "USD".to_string(),
            default_statement_limit: 10,
            max_statement_limit: 500,
        }
    }
}

impl LedgerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    pub fn with_statement_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.default_statement_limit = default_limit;
        self.max_statement_limit = max_limit.max(1);
        self
    }

    /// Resolve a caller supplied page size
    pub fn page_size(&self, requested: usize) -> usize {
        let size = if requested == 0 {
            self.default_statement_limit
        } else {
            requested
        };
        size.min(self.max_statement_limit)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
