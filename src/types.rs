//! Data carried between the transfer steps

use crate::chain::DestinationSigner;

use ethers::types::{Bytes, H256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Number of steps in one transfer
pub const TOTAL_STEPS: u8 = 3;

/// A caller's request to move `amount` to `recipient_address`
#[derive(Clone)]
pub struct TransferRequest {
    /// Decimal amount, converted with the token's precision
    pub amount: String,
    /// Destination-native recipient address
    pub recipient_address: String,
    /// Signs and pays for the destination receive
    pub credential: Arc<DestinationSigner>,
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("amount", &self.amount)
            .field("recipient_address", &self.recipient_address)
            .field("credential", &self.credential.address_hex())
            .finish()
    }
}

/// Result of the source-chain burn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSendResult {
    pub transaction_hash: H256,
    pub protocol_nonce: u64,
    pub message: Bytes,
}

/// Attestation lifecycle as reported by the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationStatus {
    #[default]
    Pending,
    PendingConfirmations,
    Complete,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Signed proof for a burned message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationData {
    pub status: AttestationStatus,
    pub message_hash: H256,
    pub message: Bytes,
    pub attestation: Bytes,
}

/// Outcome of the destination-chain receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveResult {
    pub transaction_hash: Option<String>,
    pub success: bool,
    /// Balance delta observed at the mint recipient
    pub amount_received: String,
    pub error: Option<String>,
}

impl ReceiveResult {
    pub fn failed(transaction_hash: Option<String>, error: String) -> Self {
        Self {
            transaction_hash,
            success: false,
            amount_received: "0.0".to_string(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Processing,
    Completed,
    Failed,
}

/// Progress notification handed to the caller's callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub step_index: u8,
    pub total_steps: u8,
    pub status: StepStatus,
    pub message: String,
    pub transaction_hash: Option<String>,
    pub percentage: Option<u8>,
}

/// Terminal result of one transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub success: bool,
    pub source_transaction_hash: Option<H256>,
    pub destination_transaction_hash: Option<String>,
    pub transferred_amount: Option<String>,
    pub error_message: Option<String>,
}
