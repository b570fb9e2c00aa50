//! Input validation for order numbers and amounts
//!
//! Order numbers are digit strings protected by the Luhn checksum. The same
//! check guards order submission and withdrawal requests, and always runs
//! before anything touches persistence.

use thiserror::Error;

use crate::constants::validation::MAX_ORDER_NUMBER_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("order number is required")]
    EmptyOrderNumber,
    #[error("order number is {len} digits long, at most {max} allowed")]
    OrderNumberTooLong { len: usize, max: usize },
    #[error("order number must contain only digits: {0:?}")]
    NonDigitOrderNumber(String),
    #[error("order number fails the Luhn checksum: {0}")]
    LuhnChecksum(String),
    #[error("amount must be a positive integer, got {0}")]
    NonPositiveAmount(i64),
    #[error("accrual must be non-negative, got {0}")]
    NegativeAccrual(i64),
}

/// Luhn checksum over an all-digit string. Empty or non-digit input is invalid.
pub fn luhn_valid(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (position, ch) in number.chars().rev().enumerate() {
        let Some(mut digit) = ch.to_digit(10) else {
            return false;
        };
        if position % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}

/// Trim and validate a user-supplied order number, returning the canonical form
pub fn normalize_order_number(raw: &str) -> Result<String, ValidationError> {
    let number = raw.trim();
    if number.is_empty() {
        return Err(ValidationError::EmptyOrderNumber);
    }
    if !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::NonDigitOrderNumber(number.to_string()));
    }
    if number.len() > MAX_ORDER_NUMBER_LEN {
        return Err(ValidationError::OrderNumberTooLong {
            len: number.len(),
            max: MAX_ORDER_NUMBER_LEN,
        });
    }
    if !luhn_valid(number) {
        return Err(ValidationError::LuhnChecksum(number.to_string()));
    }
    Ok(number.to_string())
}

pub fn validate_withdrawal_amount(amount: i64) -> Result<(), ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(())
}

pub fn validate_accrual(accrual: Option<i64>) -> Result<(), ValidationError> {
    match accrual {
        Some(value) if value < 0 => Err(ValidationError::NegativeAccrual(value)),
        _ => Ok(()),
    }
}
