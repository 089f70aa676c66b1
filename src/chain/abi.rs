//! Minimal ERC-20 ABI plumbing for the USDC contract: fixed selectors and
//! event topic, 32-byte word encoding, and raw-unit conversions. USDC uses
//! 6 decimal places everywhere this service runs.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use super::client::ChainError;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// balanceOf(address)
pub const BALANCE_OF_SELECTOR: &str = "0x70a08231";

/// transfer(address,uint256)
pub const TRANSFER_SELECTOR: &str = "0xa9059cbb";

pub const USDC_DECIMALS: i64 = 6;

/// Calldata for `balanceOf(address)`.
pub fn encode_balance_of(address: &str) -> Result<String, ChainError> {
    Ok(format!("{}{}", BALANCE_OF_SELECTOR, pad_address(address)?))
}

/// Calldata for `transfer(address,uint256)`.
pub fn encode_transfer(to: &str, amount_units: &BigInt) -> Result<String, ChainError> {
    Ok(format!(
        "{}{}{}",
        TRANSFER_SELECTOR,
        pad_address(to)?,
        pad_uint(amount_units)
    ))
}

/// Left-pad a 20-byte hex address into a 32-byte ABI word.
fn pad_address(address: &str) -> Result<String, ChainError> {
    let bare = address
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::InvalidResponse(format!("address missing 0x prefix: {}", address)))?;
    if bare.len() != 40 || hex::decode(bare).is_err() {
        return Err(ChainError::InvalidResponse(format!(
            "malformed address: {}",
            address
        )));
    }
    Ok(format!("{:0>64}", bare.to_lowercase()))
}

fn pad_uint(value: &BigInt) -> String {
    format!("{:0>64}", value.to_str_radix(16))
}

/// Decode a 32-byte hex word (with or without 0x prefix) into an integer.
pub fn decode_uint(word: &str) -> Result<BigInt, ChainError> {
    let bare = word.strip_prefix("0x").unwrap_or(word);
    if bare.is_empty() {
        return Err(ChainError::InvalidResponse("empty integer word".to_string()));
    }
    BigInt::parse_bytes(bare.as_bytes(), 16)
        .ok_or_else(|| ChainError::InvalidResponse(format!("malformed integer word: {}", word)))
}

/// Extract the address from an indexed event topic (a left-padded word).
pub fn topic_to_address(topic: &str) -> Result<String, ChainError> {
    let bare = topic.strip_prefix("0x").unwrap_or(topic);
    if bare.len() != 64 || hex::decode(bare).is_err() {
        return Err(ChainError::InvalidResponse(format!(
            "malformed address topic: {}",
            topic
        )));
    }
    Ok(format!("0x{}", &bare[24..].to_lowercase()))
}

/// Convert raw token units into a decimal token amount (scale 6).
pub fn units_to_amount(units: &BigInt) -> BigDecimal {
    BigDecimal::new(units.clone(), USDC_DECIMALS)
}

/// Convert a decimal token amount into raw token units. Fails when the
/// amount carries more than 6 fractional digits.
pub fn amount_to_units(amount: &BigDecimal) -> Result<BigInt, ChainError> {
    let scaled = amount.with_scale(USDC_DECIMALS);
    if &scaled != amount {
        return Err(ChainError::InvalidResponse(format!(
            "amount {} exceeds {} decimal places",
            amount, USDC_DECIMALS
        )));
    }
    let (digits, _) = scaled.as_bigint_and_exponent();
    Ok(digits)
}
