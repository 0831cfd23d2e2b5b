//! Validation utilities

use bigdecimal::{BigDecimal, ToPrimitive};

use crate::types::*;

/// Longest external reference the budgeting service accepts
pub const MAX_IMPORT_ID_LEN: usize = 36;

/// Validate that a source transaction id can be used as an import id
pub fn validate_import_id(id: &str) -> SyncResult<()> {
    if id.trim().is_empty() {
        return Err(SyncError::Validation(
            "Transaction ID cannot be empty".to_string(),
        ));
    }

    if id.len() > MAX_IMPORT_ID_LEN {
        return Err(SyncError::Validation(format!(
            "Transaction ID cannot exceed {MAX_IMPORT_ID_LEN} characters"
        )));
    }

    Ok(())
}

/// Validate an ISO 4217 currency code
pub fn validate_currency(code: &str) -> SyncResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(SyncError::Validation(format!(
            "Invalid currency code: {code:?}"
        )));
    }
    Ok(())
}

/// Convert an amount to integer milliunits (thousandths of the currency unit)
pub fn to_milliunits(amount: &BigDecimal) -> SyncResult<i64> {
    let scaled = amount.clone() * BigDecimal::from(1000);
    if !scaled.is_integer() {
        return Err(SyncError::Validation(format!(
            "Amount {amount} has more than three decimal places"
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| SyncError::Validation(format!("Amount {amount} is out of range")))
}

/// Validate a transaction before it is pushed to the destination
pub fn validate_transaction(transaction: &Transaction) -> SyncResult<()> {
    validate_import_id(&transaction.id)?;
    validate_currency(&transaction.currency)?;
    to_milliunits(&transaction.amount)?;
    Ok(())
}

/// Truncate to at most `max` characters, on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_milliunits() {
        assert_eq!(to_milliunits(&BigDecimal::from_str("-12.34").unwrap()).unwrap(), -12340);
        assert_eq!(to_milliunits(&BigDecimal::from_str("0.001").unwrap()).unwrap(), 1);
        assert!(to_milliunits(&BigDecimal::from_str("1.0005").unwrap()).is_err());
    }

    #[test]
    fn test_import_id_limits() {
        assert!(validate_import_id("3f2b8c9e-0d7a-4e51-9a5c-6b1f0e2d4c3a").is_ok());
        assert!(validate_import_id("").is_err());
        assert!(validate_import_id(&"x".repeat(37)).is_err());
    }

    #[test]
    fn test_currency_codes() {
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("eur").is_err());
        assert!(validate_currency("EURO").is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("Café Überall", 4), "Café");
        assert_eq!(truncate_chars("short", 200), "short");
    }
}
