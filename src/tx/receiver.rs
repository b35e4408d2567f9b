//! Destination-chain receiver: submits the attested message and measures
//! what actually arrived at the mint recipient.

use crate::address::to_destination_format;
use crate::amount::from_base_units;
use crate::chain::{DestinationChain, DestinationSigner};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{decode_prefixed_hex, BurnMessage};
use crate::types::ReceiveResult;

use ethers::types::U256;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Completes transfers on the destination chain
pub struct DestinationReceiver<D: DestinationChain> {
    chain: Arc<D>,
}

impl<D: DestinationChain> DestinationReceiver<D> {
    pub fn new(chain: Arc<D>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<D> {
        &self.chain
    }

    /// Token balance of `address`; accounts without a store hold zero
    pub async fn check_balance(&self, address: &str) -> BridgeResult<String> {
        let owner = to_destination_format(address)?;
        let balance = self.chain.fungible_balance(&owner).await?.unwrap_or(0);
        Ok(from_base_units(U256::from(balance), self.chain.token_decimals()))
    }

    /// Submit `(message, attestation)` to the bridge receive routine.
    ///
    /// Never fails: errors are reported through the returned result.
    pub async fn receive(
        &self,
        message_hex: &str,
        attestation_hex: &str,
        signer: &DestinationSigner,
    ) -> ReceiveResult {
        match self.try_receive(message_hex, attestation_hex, signer).await {
            Ok(result) => result,
            Err(e) => {
                error!("Destination receive failed: {}", e);
                let tx_hash = match &e {
                    BridgeError::DestinationTransactionReverted { tx_hash, .. } => {
                        Some(tx_hash.clone())
                    }
                    _ => None,
                };
                ReceiveResult::failed(tx_hash, e.to_string())
            }
        }
    }

    async fn try_receive(
        &self,
        message_hex: &str,
        attestation_hex: &str,
        signer: &DestinationSigner,
    ) -> BridgeResult<ReceiveResult> {
        let message = decode_prefixed_hex(message_hex).ok_or_else(|| {
            BridgeError::InvalidMessageFormat("message must be non-empty 0x-prefixed hex".into())
        })?;
        let attestation = decode_prefixed_hex(attestation_hex).ok_or_else(|| {
            BridgeError::InvalidAttestationFormat(
                "attestation must be non-empty 0x-prefixed hex".into(),
            )
        })?;
        let recipient = BurnMessage::parse(&message)?.mint_recipient;

        let before = self.balance_of(&recipient).await?;

        let tx_hash = self
            .chain
            .submit_receive(&message, &attestation, signer)
            .await?;
        let status = self.chain.wait_for_transaction(&tx_hash).await?;
        if !status.success {
            warn!("Receive {} reverted: {}", tx_hash, status.vm_status);
            return Err(BridgeError::DestinationTransactionReverted {
                tx_hash,
                vm_status: status.vm_status,
            });
        }

        let after = self.balance_of(&recipient).await?;
        let received = after.checked_sub(before).unwrap_or_else(|| {
            warn!(
                "Recipient balance dropped from {} to {} during receive",
                before, after
            );
            0
        });

        let amount_received = from_base_units(U256::from(received), self.chain.token_decimals());
        info!("Receive {} confirmed, {} credited", tx_hash, amount_received);

        Ok(ReceiveResult {
            transaction_hash: Some(tx_hash),
            success: true,
            amount_received,
            error: None,
        })
    }

    async fn balance_of(&self, owner: &[u8; 32]) -> BridgeResult<u64> {
        Ok(self.chain.fungible_balance(owner).await?.unwrap_or(0))
    }
}
