//! Validation engine
//!
//! One rule per [`FieldKind`]. Classification is pure: no I/O, no shared
//! state, so it is safe to call from any number of tasks at once.

use bigdecimal::BigDecimal;

use crate::money;
use crate::types::*;

const BANK_CODE_LEN: usize = 3;
const BRANCH_CODE_LEN: usize = 4;
const ACCOUNT_NUMBER_LEN: usize = 10;
const PERSONAL_KEY_MIN_LEN: usize = 8;
const DESCRIPTION_MAX_LEN: usize = 500;

/// Classifies raw inputs into valid / invalid equivalence classes
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationEngine;

impl ValidationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Classify `value` as an instance of `kind`
    pub fn classify(&self, kind: FieldKind, value: &str) -> Classification {
        let outcome = match kind {
            FieldKind::BankCode => check_digits(value, BANK_CODE_LEN),
            FieldKind::BranchCode => check_digits(value, BRANCH_CODE_LEN),
            FieldKind::AccountNumber => check_digits(value, ACCOUNT_NUMBER_LEN),
            FieldKind::FullAccountNumber => check_full_account_number(value),
            FieldKind::PersonalKey => check_personal_key(value),
            FieldKind::Amount => money::parse_amount(value).map(|_| ()),
            FieldKind::Description => check_description(value),
        };

        match outcome {
            Ok(()) => Classification::valid(),
            Err(reason) => Classification::invalid(reason),
        }
    }

    /// Like [`classify`](Self::classify) but as a `Result`
    pub fn require(&self, kind: FieldKind, value: &str) -> LedgerResult<()> {
        match self.classify(kind, value).reason {
            None => Ok(()),
            Some(reason) if kind == FieldKind::Amount => Err(LedgerError::InvalidAmount {
                value: value.to_string(),
                reason,
            }),
            Some(reason) => Err(ValidationError {
                field: kind,
                reason,
            }
            .into()),
        }
    }

    /// Parse a transaction amount, reporting `InvalidAmount` on rejection
    pub fn amount(&self, value: &str) -> LedgerResult<BigDecimal> {
        money::parse_amount(value).map_err(|reason| LedgerError::InvalidAmount {
            value: value.to_string(),
            reason,
        })
    }
}

fn check_digits(value: &str, len: usize) -> Result<(), ReasonCode> {
    if value.is_empty() {
        return Err(ReasonCode::Empty);
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ReasonCode::NonNumeric);
    }
    if value.len() != len {
        return Err(ReasonCode::WrongLength);
    }
    Ok(())
}

fn check_full_account_number(value: &str) -> Result<(), ReasonCode> {
    if value.is_empty() {
        return Err(ReasonCode::Empty);
    }
    let parts: Vec<&str> = value.split('-').collect();
    let [bank, branch, number] = parts.as_slice() else {
        return Err(ReasonCode::Malformed);
    };
    check_digits(bank, BANK_CODE_LEN)?;
    check_digits(branch, BRANCH_CODE_LEN)?;
    check_digits(number, ACCOUNT_NUMBER_LEN)
}

fn check_description(value: &str) -> Result<(), ReasonCode> {
    if value.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(ReasonCode::WrongLength);
    }
    Ok(())
}

fn check_personal_key(value: &str) -> Result<(), ReasonCode> {
    if value.is_empty() {
        return Err(ReasonCode::Empty);
    }
    if value.chars().count() < PERSONAL_KEY_MIN_LEN {
        return Err(ReasonCode::WrongLength);
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ReasonCode::MissingUpper);
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ReasonCode::MissingLower);
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(ReasonCode::MissingDigit);
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ReasonCode::IllegalChar);
    }
    Ok(())
}

impl ValidationError {
    /// Human readable message suitable for an end user
    pub fn message(&self) -> String {
        let field = self.field;
        match (self.field, self.reason) {
            (_, ReasonCode::Empty) => format!("{} is required", capitalize(field)),
            (_, ReasonCode::NonNumeric) => {
                format!("{} must contain only digits", capitalize(field))
            }
            (FieldKind::BankCode, ReasonCode::WrongLength) => {
                "Bank code must be exactly 3 digits".to_string()
            }
            (FieldKind::BranchCode, ReasonCode::WrongLength) => {
                "Branch code must be exactly 4 digits".to_string()
            }
            (FieldKind::AccountNumber, ReasonCode::WrongLength) => {
                "Account number must be exactly 10 digits".to_string()
            }
            (FieldKind::PersonalKey, ReasonCode::WrongLength) => {
                "Personal key must be at least 8 characters".to_string()
            }
            (FieldKind::Description, ReasonCode::WrongLength) => {
                format!("Description cannot exceed {} characters", DESCRIPTION_MAX_LEN)
            }
            (_, ReasonCode::MissingUpper) => {
                "Personal key must contain at least one uppercase letter".to_string()
            }
            (_, ReasonCode::MissingLower) => {
                "Personal key must contain at least one lowercase letter".to_string()
            }
            (_, ReasonCode::MissingDigit) => {
                "Personal key must contain at least one digit".to_string()
            }
            (_, ReasonCode::IllegalChar) => {
                "Personal key must contain only letters and digits".to_string()
            }
            (_, ReasonCode::NotPositive) => "Amount must be positive".to_string(),
            (_, ReasonCode::ExcessPrecision) => {
                "Amount cannot have more than 2 decimal places".to_string()
            }
            (_, ReasonCode::Malformed) => {
                "Account number must look like XXX-XXXX-XXXXXXXXXX".to_string()
            }
            (_, reason) => format!("Invalid {} ({})", field, reason),
        }
    }
}

fn capitalize(field: FieldKind) -> String {
    let text = field.to_string();
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => text,
    }
}
