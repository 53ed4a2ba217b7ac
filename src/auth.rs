//! Authorization gate and personal key hashing
//!
//! The ledger never sees raw credentials. A calling layer checks the
//! principal through an [`AuthorizationCollaborator`] with [`authorize`]
//! and only then invokes a ledger operation.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use crate::traits::AuthorizationCollaborator;
use crate::types::*;
use crate::utils::validation::ValidationEngine;

/// Salted SHA-256 hashing of personal keys, stored as `salt$hex`
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyHasher;

impl KeyHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash `key` under a fresh random salt
    pub fn hash(&self, key: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        format!("{}${}", salt, digest(&salt, key))
    }

    /// Check `key` against a value produced by [`hash`](Self::hash)
    pub fn verify(&self, key: &str, stored: &str) -> bool {
        let Some((salt, expected)) = stored.split_once('$') else {
            return false;
        };
        constant_time_eq(digest(salt, key).as_bytes(), expected.as_bytes())
    }
}

fn digest(salt: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Fail with `Unauthorized` unless `principal` may act on every account
pub async fn authorize(
    authorizer: &dyn AuthorizationCollaborator,
    principal: &str,
    account_ids: &[&str],
) -> LedgerResult<()> {
    for account_id in account_ids {
        if !authorizer.is_authorized(principal, account_id).await {
            tracing::warn!(principal = %principal, account_id = %account_id, "access denied");
            return Err(LedgerError::Unauthorized {
                principal: principal.to_string(),
                account_id: account_id.to_string(),
            });
        }
    }
    Ok(())
}

/// In-memory grants and key hashes for tests and embedded use
#[derive(Debug, Default)]
pub struct MemoryAuthorizer {
    grants: RwLock<HashMap<String, HashSet<String>>>,
    keys: RwLock<HashMap<String, String>>,
    hasher: KeyHasher,
    validator: ValidationEngine,
}

impl MemoryAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `principal` to act on `account_id`
    pub fn grant(&self, principal: &str, account_id: &str) -> LedgerResult<()> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| LedgerError::Storage("grant table poisoned".to_string()))?;
        grants
            .entry(principal.to_string())
            .or_default()
            .insert(account_id.to_string());
        Ok(())
    }

    pub fn revoke(&self, principal: &str, account_id: &str) -> LedgerResult<()> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| LedgerError::Storage("grant table poisoned".to_string()))?;
        if let Some(accounts) = grants.get_mut(principal) {
            accounts.remove(account_id);
        }
        Ok(())
    }

    /// Store a salted hash of an owner's personal key.
    ///
    /// The key must satisfy the personal key rule; only the hash is kept.
    pub fn register_key(&self, owner: &str, key: &str) -> LedgerResult<()> {
        self.validator.require(FieldKind::PersonalKey, key)?;
        let hashed = self.hasher.hash(key);
        let mut keys = self
            .keys
            .write()
            .map_err(|_| LedgerError::Storage("key table poisoned".to_string()))?;
        keys.insert(owner.to_string(), hashed);
        Ok(())
    }
}

#[async_trait]
impl AuthorizationCollaborator for MemoryAuthorizer {
    async fn is_authorized(&self, principal: &str, account_id: &str) -> bool {
        self.grants
            .read()
            .map(|grants| {
                grants
                    .get(principal)
                    .is_some_and(|accounts| accounts.contains(account_id))
            })
            .unwrap_or(false)
    }

    async fn verify_personal_key(&self, owner: &str, supplied_key: &str) -> bool {
        let stored = match self.keys.read() {
            Ok(keys) => keys.get(owner).cloned(),
            Err(_) => None,
        };
        stored.is_some_and(|stored| self.hasher.verify(supplied_key, &stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_salted_and_verifiable() {
        let hasher = KeyHasher::new();
        let first = hasher.hash("Abcd1234");
        let second = hasher.hash("Abcd1234");
        assert_ne!(first, second);
        assert!(!first.contains("Abcd1234"));
        assert!(hasher.verify("Abcd1234", &first));
        assert!(hasher.verify("Abcd1234", &second));
        assert!(!hasher.verify("Abcd1235", &first));
        assert!(!hasher.verify("Abcd1234", "garbage"));
    }

    #[tokio::test]
    async fn test_authorize_checks_every_account() {
        let authorizer = MemoryAuthorizer::new();
        authorizer.grant("alice", "001-0001-0000000001").unwrap();

        authorize(&authorizer, "alice", &["001-0001-0000000001"])
            .await
            .unwrap();
        let err = authorize(
            &authorizer,
            "alice",
            &["001-0001-0000000001", "001-0001-0000000002"],
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Unauthorized { ref account_id, .. } if account_id == "001-0001-0000000002"
        ));

        authorizer.revoke("alice", "001-0001-0000000001").unwrap();
        assert!(authorize(&authorizer, "alice", &["001-0001-0000000001"])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_personal_keys() {
        let authorizer = MemoryAuthorizer::new();
        let err = authorizer.register_key("alice", "abcd1234").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError {
                reason: ReasonCode::MissingUpper,
                ..
            })
        ));

        authorizer.register_key("alice", "Abcd1234").unwrap();
        assert!(authorizer.verify_personal_key("alice", "Abcd1234").await);
        assert!(!authorizer.verify_personal_key("alice", "Abcd12345").await);
        assert!(!authorizer.verify_personal_key("bob", "Abcd1234").await);
    }
}
