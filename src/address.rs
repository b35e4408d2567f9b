//! Address encoding between the source and destination chains
//!
//! Destination accounts are 32-byte values written as `0x` + 64 hex characters.
//! The same 32 bytes are burned into the source-chain transaction as the
//! `mintRecipient` field, so an address either has exactly the expected width
//! or is rejected. Nothing is padded or truncated.

use crate::error::{BridgeError, BridgeResult};

use sha3::{Digest, Sha3_256};

/// Raw width of a destination-chain address
pub const DESTINATION_ADDRESS_BYTES: usize = 32;

/// Domain separator for derived primary fungible stores
const PRIMARY_STORE_SCHEME: u8 = 0xFC;

/// Authentication scheme byte for single ed25519 keys
const ED25519_SCHEME: u8 = 0x00;

/// Convert a destination-native address into its fixed-width byte form
pub fn to_destination_format(native: &str) -> BridgeResult<[u8; DESTINATION_ADDRESS_BYTES]> {
    let digits = native.strip_prefix("0x").unwrap_or(native);

    if digits.len() != DESTINATION_ADDRESS_BYTES * 2 {
        return Err(BridgeError::InvalidAddressFormat(format!(
            "expected {} hex characters, got {} in {:?}",
            DESTINATION_ADDRESS_BYTES * 2,
            digits.len(),
            native
        )));
    }

    let mut out = [0u8; DESTINATION_ADDRESS_BYTES];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| BridgeError::InvalidAddressFormat(format!("{:?}: {}", native, e)))?;
    Ok(out)
}

/// Render a fixed-width address back into the destination-native form
pub fn from_destination_format(bytes: &[u8; DESTINATION_ADDRESS_BYTES]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Canonical lowercase form of a destination address
pub fn normalize_destination_address(native: &str) -> BridgeResult<String> {
    to_destination_format(native).map(|bytes| from_destination_format(&bytes))
}

/// Address of the primary fungible store `owner` holds for `metadata`
pub fn primary_store_address(
    owner: &[u8; DESTINATION_ADDRESS_BYTES],
    metadata: &[u8; DESTINATION_ADDRESS_BYTES],
) -> [u8; DESTINATION_ADDRESS_BYTES] {
    let mut hasher = Sha3_256::new();
    hasher.update(owner);
    hasher.update(metadata);
    hasher.update([PRIMARY_STORE_SCHEME]);
    hasher.finalize().into()
}

/// Account address of a single-key ed25519 account
pub fn account_address_from_public_key(public_key: &[u8; 32]) -> [u8; DESTINATION_ADDRESS_BYTES] {
    let mut hasher = Sha3_256::new();
    hasher.update(public_key);
    hasher.update([ED25519_SCHEME]);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "0x9f2b4c6d8e0a1b3c5d7e9f0a2b4c6d8e0a1b3c5d7e9f0a2b4c6d8e0a1b3c5d7e";

    #[test]
    fn test_round_trip_is_identity_on_canonical_form() {
        let bytes = to_destination_format(VALID).unwrap();
        assert_eq!(from_destination_format(&bytes), VALID);
        assert_eq!(to_destination_format(&from_destination_format(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn test_prefix_and_case_are_normalized() {
        let upper = VALID.trim_start_matches("0x").to_uppercase();
        assert_eq!(normalize_destination_address(&upper).unwrap(), VALID);
    }

    #[test]
    fn test_short_address_rejected() {
        let short = &VALID[..VALID.len() - 2];
        assert!(matches!(
            to_destination_format(short),
            Err(BridgeError::InvalidAddressFormat(_))
        ));
        // an EVM-width address must not be padded up
        assert!(matches!(
            to_destination_format("0x742d35Cc6634C0532925a3b844Bc9e7595f8fA0d"),
            Err(BridgeError::InvalidAddressFormat(_))
        ));
    }

    #[test]
    fn test_long_address_rejected() {
        let long = format!("{}00", VALID);
        assert!(matches!(
            to_destination_format(&long),
            Err(BridgeError::InvalidAddressFormat(_))
        ));
    }

    #[test]
    fn test_untrimmed_or_uppercase_prefix_rejected() {
        for input in [
            format!(" {}", VALID),
            format!("{}\n", VALID),
            VALID.replacen("0x", "0X", 1),
        ] {
            assert!(
                matches!(
                    to_destination_format(&input),
                    Err(BridgeError::InvalidAddressFormat(_))
                ),
                "{:?}",
                input
            );
        }
    }

    #[test]
    fn test_non_hex_rejected() {
        let bad = format!("0x{}", "zz".repeat(32));
        assert!(matches!(
            to_destination_format(&bad),
            Err(BridgeError::InvalidAddressFormat(_))
        ));
    }

    #[test]
    fn test_derived_addresses_are_deterministic() {
        let owner = to_destination_format(VALID).unwrap();
        let mut metadata = [0u8; 32];
        metadata[31] = 0x0a;

        let store = primary_store_address(&owner, &metadata);
        assert_eq!(store, primary_store_address(&owner, &metadata));
        assert_ne!(store, primary_store_address(&metadata, &owner));
        assert_ne!(account_address_from_public_key(&owner), owner);
    }
}
