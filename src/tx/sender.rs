//! Source-chain sender: balance check, approval and burn
//!
//! The approve and burn transactions of one transfer are sent back to back
//! from the same signer. The pending nonce is fetched once per attempt and
//! the burn takes the next one locally, so the burn never races the node's
//! view of the still-pending approval. Nonce state lives only as long as one
//! attempt; transfers sharing a sender never see each other's allocations.

use super::nonce::NonceManager;
use crate::address::to_destination_format;
use crate::amount::{from_base_units, to_base_units};
use crate::chain::{BurnRequest, SourceChain};
use crate::config::TransferConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{extract_message_sent, MessageHeader};
use crate::types::SourceSendResult;

use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sends the source-chain half of a transfer
pub struct SourceSender<C: SourceChain> {
    /// Source chain client
    chain: Arc<C>,
    /// Transfer settings
    config: TransferConfig,
    /// Approve `U256::MAX` instead of the exact amount
    approve_unlimited: bool,
}

impl<C: SourceChain> SourceSender<C> {
    /// Create a new sender
    pub fn new(chain: Arc<C>, config: TransferConfig, approve_unlimited: bool) -> Self {
        Self {
            chain,
            config,
            approve_unlimited,
        }
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    /// Token balance of `address`, as a decimal string
    pub async fn check_balance(&self, address: Address) -> BridgeResult<String> {
        let decimals = self.chain.token_decimals().await?;
        let balance = self.chain.token_balance(address).await?;
        Ok(from_base_units(balance, decimals))
    }

    /// Approve the token messenger to spend `amount`
    pub async fn approve(&self, amount: &str, nonce: Option<U256>) -> BridgeResult<H256> {
        let decimals = self.chain.token_decimals().await?;
        let units = to_base_units(amount, decimals)?;
        let nonce = match nonce {
            Some(n) => n,
            None => self.chain.pending_nonce().await?,
        };
        self.send_approve(units, nonce).await
    }

    /// Burn `amount` for minting to `destination_address`
    pub async fn deposit_for_burn(
        &self,
        amount: &str,
        destination_address: &str,
        nonce: Option<U256>,
    ) -> BridgeResult<SourceSendResult> {
        let decimals = self.chain.token_decimals().await?;
        let units = to_base_units(amount, decimals)?;
        let mint_recipient = to_destination_format(destination_address)?;
        let nonce = match nonce {
            Some(n) => n,
            None => self.chain.pending_nonce().await?,
        };
        self.send_burn(units, mint_recipient, nonce).await
    }

    /// Check the balance, approve and burn, retrying on stale nonces
    pub async fn execute_full_transfer(
        &self,
        amount: &str,
        destination_address: &str,
    ) -> BridgeResult<SourceSendResult> {
        let decimals = self.chain.token_decimals().await?;
        let units = to_base_units(amount, decimals)?;
        let mint_recipient = to_destination_format(destination_address)?;

        let balance = self.chain.token_balance(self.chain.signer_address()).await?;
        if balance < units {
            return Err(BridgeError::InsufficientBalance {
                have: from_base_units(balance, decimals),
                need: from_base_units(units, decimals),
            });
        }

        let max_attempts = self.config.nonce_max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.approve_and_burn(units, mint_recipient).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_stale_nonce() && attempt < max_attempts => {
                    warn!(
                        "Stale nonce on attempt {}/{}: {}. Retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        self.config.nonce_retry_delay()
                    );
                    crate::metrics::record_nonce_retry();
                    tokio::time::sleep(self.config.nonce_retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn approve_and_burn(
        &self,
        units: U256,
        mint_recipient: [u8; 32],
    ) -> BridgeResult<SourceSendResult> {
        let nonces = NonceManager::new(self.chain.signer_address());
        nonces.sync(self.chain.as_ref()).await?;

        let approve_nonce = nonces.allocate().await?;
        self.send_approve(units, approve_nonce).await?;

        let burn_nonce = nonces.allocate().await?;
        self.send_burn(units, mint_recipient, burn_nonce).await
    }

    async fn send_approve(&self, units: U256, nonce: U256) -> BridgeResult<H256> {
        let allowance = if self.approve_unlimited {
            U256::MAX
        } else {
            units
        };

        let receipt = self.chain.approve(allowance, nonce).await?;
        info!("Approval confirmed: {:?}", receipt.transaction_hash);
        Ok(receipt.transaction_hash)
    }

    async fn send_burn(
        &self,
        units: U256,
        mint_recipient: [u8; 32],
        nonce: U256,
    ) -> BridgeResult<SourceSendResult> {
        let request = BurnRequest {
            amount: units,
            destination_domain: self.config.destination_domain,
            mint_recipient,
        };

        let receipt = self.chain.deposit_for_burn(&request, nonce).await?;
        let message = extract_message_sent(&receipt)?;
        let header = MessageHeader::parse(&message)?;

        info!(
            "Burn confirmed: {:?} (protocol nonce {})",
            receipt.transaction_hash, header.nonce
        );
        debug!("MessageSent payload: {} bytes", message.len());

        Ok(SourceSendResult {
            transaction_hash: receipt.transaction_hash,
            protocol_nonce: header.nonce,
            message,
        })
    }
}
