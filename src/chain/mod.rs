//! Chain module - the two ledgers a transfer touches
//!
//! This module provides:
//! - The `SourceChain` and `DestinationChain` collaborator traits the core drives
//! - An ethers-backed source chain client (token + token messenger contracts)
//! - A REST client for the destination chain (fungible stores, script transactions)
//! - The destination signing credential

pub mod destination;
pub mod provider;

pub use destination::{DestinationSigner, RestDestinationChain};
pub use provider::EvmSourceChain;

use crate::error::BridgeResult;

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, H256, U256};

/// Arguments of a token messenger `depositForBurn` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnRequest {
    /// Amount in token base units
    pub amount: U256,
    /// Protocol domain of the chain that mints
    pub destination_domain: u32,
    /// Recipient on the destination chain, fixed width
    pub mint_recipient: [u8; 32],
}

/// Source-chain operations needed to approve, burn and read back receipts.
///
/// Transaction submitting methods block until the transaction is mined and
/// return its receipt. Nonces are always supplied by the caller.
#[async_trait]
pub trait SourceChain: Send + Sync {
    /// Address that signs source-chain transactions
    fn signer_address(&self) -> Address;

    /// Declared decimal precision of the token
    async fn token_decimals(&self) -> BridgeResult<u8>;

    /// Token balance of `owner` in base units
    async fn token_balance(&self, owner: Address) -> BridgeResult<U256>;

    /// Next nonce of the signer, pending transactions included
    async fn pending_nonce(&self) -> BridgeResult<U256>;

    /// Grant the token messenger an allowance of `amount`
    async fn approve(&self, amount: U256, nonce: U256) -> BridgeResult<TransactionReceipt>;

    /// Burn tokens for minting on the destination chain
    async fn deposit_for_burn(
        &self,
        request: &BurnRequest,
        nonce: U256,
    ) -> BridgeResult<TransactionReceipt>;

    /// Receipt of a mined transaction, `None` if not yet known to the node
    async fn transaction_receipt(&self, tx_hash: H256) -> BridgeResult<Option<TransactionReceipt>>;
}

/// Final status of a destination-chain transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTxStatus {
    pub success: bool,
    pub vm_status: String,
}

/// Destination-chain operations needed to receive a burned message.
#[async_trait]
pub trait DestinationChain: Send + Sync {
    /// Decimal precision of the minted token
    fn token_decimals(&self) -> u8;

    /// Balance of `owner`'s primary store, `None` when the account or store
    /// does not exist yet
    async fn fungible_balance(&self, owner: &[u8; 32]) -> BridgeResult<Option<u64>>;

    /// Submit the bridge receive routine with `(message, attestation)` as its
    /// two arguments; returns the transaction hash
    async fn submit_receive(
        &self,
        message: &[u8],
        attestation: &[u8],
        signer: &DestinationSigner,
    ) -> BridgeResult<String>;

    /// Wait until the transaction is committed
    async fn wait_for_transaction(&self, tx_hash: &str) -> BridgeResult<DestinationTxStatus>;
}
