//! Error types for the bridge transfer orchestrator

use thiserror::Error;

/// Main error type for transfer operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    #[error("MessageSent event not found in transaction {tx_hash}")]
    MessageEventNotFound { tx_hash: String },

    #[error("Receipt for {tx_hash} unavailable after {attempts} attempts")]
    ReceiptUnavailable { tx_hash: String, attempts: u32 },

    #[error("Attestation service error: {0}")]
    AttestationServiceError(String),

    #[error("Attestation failed for message {message_hash}")]
    AttestationFailed { message_hash: String },

    #[error("Timed out waiting for attestation after {attempts} attempts ({elapsed_secs}s)")]
    AttestationTimeout { attempts: u32, elapsed_secs: u64 },

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Invalid attestation format: {0}")]
    InvalidAttestationFormat(String),

    #[error("Destination transaction reverted")]
    DestinationTransactionReverted { tx_hash: String, vm_status: String },

    #[error("Source transaction {tx_hash} reverted")]
    SourceTransactionReverted { tx_hash: String },

    #[error("Stale nonce: {0}")]
    StaleNonce(String),

    #[error("Chain connection error for {chain}: {message}")]
    ChainConnection { chain: String, message: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl BridgeError {
    /// Nonce collisions are the only condition recovered locally
    pub fn is_stale_nonce(&self) -> bool {
        matches!(self, BridgeError::StaleNonce(_))
    }

    /// Check if a read may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ChainConnection { .. } | BridgeError::ReceiptUnavailable { .. }
        )
    }

    /// Check if the error happened after funds may have left the source chain
    pub fn leaves_funds_in_flight(&self) -> bool {
        matches!(
            self,
            BridgeError::ReceiptUnavailable { .. }
                | BridgeError::AttestationServiceError(_)
                | BridgeError::AttestationFailed { .. }
                | BridgeError::AttestationTimeout { .. }
                | BridgeError::DestinationTransactionReverted { .. }
        )
    }
}

/// Result type for transfer operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_message_is_verbatim() {
        let err = BridgeError::DestinationTransactionReverted {
            tx_hash: "0xabc".to_string(),
            vm_status: "Move abort".to_string(),
        };
        assert_eq!(err.to_string(), "Destination transaction reverted");
    }

    #[test]
    fn test_only_stale_nonce_is_locally_recovered() {
        assert!(BridgeError::StaleNonce("nonce too low".into()).is_stale_nonce());
        assert!(!BridgeError::Transaction("nonce too low".into()).is_stale_nonce());
        assert!(!BridgeError::InsufficientBalance {
            have: "2.0".into(),
            need: "3.0".into()
        }
        .is_stale_nonce());
    }
}
