use bigdecimal::BigDecimal;
use std::fmt;

pub const EVM_ADDRESS_LEN: usize = 42;
pub const TX_HASH_LEN: usize = 66;
pub const NETWORK_MAX_LEN: usize = 20;
pub const MEMO_MAX_LEN: usize = 500;
pub const AMOUNT_MAX_SCALE: i64 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

fn validate_hex_string(field: &'static str, value: &str, expected_len: usize) -> ValidationResult {
    let value = sanitize_string(value);
    validate_required(field, &value)?;

    if value.len() != expected_len {
        return Err(ValidationError::new(
            field,
            format!("must be exactly {} characters", expected_len),
        ));
    }

    let Some(bare) = value.strip_prefix("0x") else {
        return Err(ValidationError::new(field, "must start with '0x'"));
    };

    if hex::decode(bare).is_err() {
        return Err(ValidationError::new(
            field,
            "must contain only hexadecimal characters",
        ));
    }

    Ok(())
}

pub fn validate_address(field: &'static str, address: &str) -> ValidationResult {
    validate_hex_string(field, address, EVM_ADDRESS_LEN)
}

pub fn validate_tx_hash(tx_hash: &str) -> ValidationResult {
    validate_hex_string("tx_hash", tx_hash, TX_HASH_LEN)
}

pub fn validate_network(network: &str, known: &[&str]) -> ValidationResult {
    let network = sanitize_string(network);
    validate_required("network", &network)?;
    validate_max_len("network", &network, NETWORK_MAX_LEN)?;
    validate_enum("network", &network, known)?;

    Ok(())
}

/// Amounts must be positive and representable in USDC's 6 decimal places.
pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if &amount.with_scale(AMOUNT_MAX_SCALE) != amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ADDR: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn validates_enum_values() {
        assert!(validate_enum("status", "pending", &["pending", "confirmed"]).is_ok());
        assert!(validate_enum("status", "unknown", &["pending", "confirmed"]).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string("single"), "single");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn validates_addresses() {
        assert!(validate_address("from_address", ADDR).is_ok());
        assert!(validate_address("from_address", &format!(" {} ", ADDR)).is_ok());
        assert!(validate_address("from_address", "0x1234").is_err());
        assert!(validate_address("from_address", &ADDR[2..]).is_err());
        assert!(
            validate_address("from_address", "0xzz3589fcd6edb6e08f4c7c32d4f71b54bda02913")
                .is_err()
        );
    }

    #[test]
    fn validates_tx_hashes() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(validate_tx_hash(&hash).is_ok());
        assert!(validate_tx_hash("0xabc").is_err());
    }

    #[test]
    fn validates_networks() {
        assert!(validate_network("base", &["base"]).is_ok());
        assert!(validate_network("polygon", &["base"]).is_err());
        assert!(validate_network("", &["base"]).is_err());
    }

    #[test]
    fn validates_amounts() {
        let valid = BigDecimal::from_str("10.000000").unwrap();
        let zero = BigDecimal::from(0);
        let negative = BigDecimal::from(-1);
        let too_precise = BigDecimal::from_str("1.0000001").unwrap();

        assert!(validate_amount(&valid).is_ok());
        assert!(validate_amount(&zero).is_err());
        assert!(validate_amount(&negative).is_err());
        assert!(validate_amount(&too_precise).is_err());
    }
}
