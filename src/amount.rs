//! Decimal amount conversion using a token's declared precision

use crate::error::{BridgeError, BridgeResult};

use ethers::types::U256;
use ethers::utils::{format_units, parse_units};

/// Parse a decimal string such as `"1.5"` into smallest units
pub fn to_base_units(amount: &str, decimals: u8) -> BridgeResult<U256> {
    let trimmed = amount.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(BridgeError::InvalidAmount(format!("{:?}", amount)));
    }
    // parse_units silently drops digits past the token's precision
    if fraction.len() > usize::from(decimals) {
        return Err(BridgeError::InvalidAmount(format!(
            "{:?} has more than {} decimal places",
            amount, decimals
        )));
    }

    let parsed = parse_units(trimmed, u32::from(decimals))
        .map_err(|e| BridgeError::InvalidAmount(format!("{:?}: {}", amount, e)))?;
    let units: U256 = parsed.into();

    if units.is_zero() {
        return Err(BridgeError::InvalidAmount(format!(
            "{:?} rounds to zero at {} decimals",
            amount, decimals
        )));
    }
    Ok(units)
}

/// Format smallest units as a decimal string without trailing zeros
pub fn from_base_units(units: U256, decimals: u8) -> String {
    let formatted = match format_units(units, u32::from(decimals)) {
        Ok(s) => s,
        Err(_) => return units.to_string(),
    };

    if !formatted.contains('.') {
        return format!("{}.0", formatted);
    }
    let trimmed = formatted.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{}0", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_respects_decimals() {
        assert_eq!(to_base_units("1.0", 6).unwrap(), U256::from(1_000_000u64));
        assert_eq!(to_base_units("2.999", 6).unwrap(), U256::from(2_999_000u64));
        assert_eq!(to_base_units("3", 18).unwrap(), U256::exp10(18) * 3);
    }

    #[test]
    fn test_rejects_garbage_and_zero() {
        assert!(to_base_units("", 6).is_err());
        assert!(to_base_units("abc", 6).is_err());
        assert!(to_base_units("-1", 6).is_err());
        assert!(to_base_units("0.0", 6).is_err());
        assert!(to_base_units("1_000", 6).is_err());
        assert!(to_base_units("1e3", 6).is_err());
        assert!(to_base_units("1.2.3", 6).is_err());
        assert!(to_base_units(".", 6).is_err());
    }

    #[test]
    fn test_excess_precision_is_rejected_not_truncated() {
        assert!(matches!(
            to_base_units("1.0000009", 6),
            Err(BridgeError::InvalidAmount(_))
        ));
        assert_eq!(to_base_units("1.000009", 6).unwrap(), U256::from(1_000_009u64));
        assert_eq!(to_base_units(".5", 6).unwrap(), U256::from(500_000u64));
    }

    #[test]
    fn test_format_trims_trailing_zeros() {
        assert_eq!(from_base_units(U256::from(2_999_000u64), 6), "2.999");
        assert_eq!(from_base_units(U256::from(3_000_000u64), 6), "3.0");
        assert_eq!(from_base_units(U256::zero(), 6), "0.0");
        assert_eq!(from_base_units(U256::from(1u64), 6), "0.000001");
    }
}
