//! Source chain client backed by an ethers signer middleware

use super::{BurnRequest, SourceChain};
use crate::config::SourceChainConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::tx::{classify_send_error, GasEstimator};

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{abigen, ContractCall};
use ethers::middleware::SignerMiddleware;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

abigen!(
    Erc20Token,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
    ]"#
);

abigen!(
    TokenMessenger,
    r#"[
        function depositForBurn(uint256 amount, uint32 destinationDomain, bytes32 mintRecipient, address burnToken) external returns (uint64 nonce)
    ]"#
);

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const CHAIN_LABEL: &str = "source";

/// Source chain client for the token and token messenger contracts
pub struct EvmSourceChain {
    /// Chain configuration
    config: SourceChainConfig,
    /// Signing client
    client: Arc<SignerClient>,
    /// Token contract
    token: Erc20Token<SignerClient>,
    /// Token messenger contract
    messenger: TokenMessenger<SignerClient>,
    /// Gas limit buffering
    gas_estimator: GasEstimator,
    /// Token decimals, read once
    decimals: OnceCell<u8>,
}

impl EvmSourceChain {
    /// Connect to the source chain and load the signing wallet
    pub fn new(config: SourceChainConfig) -> BridgeResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| BridgeError::ChainConnection {
                chain: CHAIN_LABEL.to_string(),
                message: format!("Invalid RPC URL {}: {}", config.rpc_url, e),
            })?
            .interval(Duration::from_millis(500));

        let wallet = Self::load_wallet(&config.private_key_env)?.with_chain_id(config.chain_id);
        info!("Source chain signer: {:?}", wallet.address());

        let token_address = parse_address("token_address", &config.token_address)?;
        let messenger_address =
            parse_address("token_messenger_address", &config.token_messenger_address)?;

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let token = Erc20Token::new(token_address, client.clone());
        let messenger = TokenMessenger::new(messenger_address, client.clone());
        let gas_estimator = GasEstimator::new(config.gas_limit_buffer_percent);

        Ok(Self {
            config,
            client,
            token,
            messenger,
            gas_estimator,
            decimals: OnceCell::new(),
        })
    }

    /// Load wallet from the configured environment variable
    fn load_wallet(key_env: &str) -> BridgeResult<LocalWallet> {
        let key = std::env::var(key_env).map_err(|_| {
            BridgeError::Wallet(format!("No source wallet configured. Set {}", key_env))
        })?;

        key.trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| BridgeError::Wallet(format!("Invalid private key: {}", e)))
    }

    /// Sign, send and wait for a contract call
    async fn submit<D: Detokenize>(
        &self,
        label: &str,
        call: ContractCall<SignerClient, D>,
        nonce: U256,
    ) -> BridgeResult<TransactionReceipt> {
        let mut call = call.nonce(nonce);

        let estimate = call.estimate_gas().await.map_err(classify_send_error)?;
        call = call.gas(self.gas_estimator.buffered_limit(estimate));

        let pending = call.send().await.map_err(classify_send_error)?;
        let tx_hash = pending.tx_hash();
        info!("{} sent: {:?} (nonce {})", label, tx_hash, nonce);
        crate::metrics::record_tx_submitted(CHAIN_LABEL);

        let receipt = pending
            .confirmations(self.config.confirmations)
            .await
            .map_err(|e| BridgeError::ChainConnection {
                chain: CHAIN_LABEL.to_string(),
                message: format!("waiting for {:?}: {}", tx_hash, e),
            })?
            .ok_or_else(|| {
                BridgeError::Transaction(format!("{} {:?} dropped from mempool", label, tx_hash))
            })?;

        if receipt.status == Some(U64::zero()) {
            warn!("{} reverted: {:?}", label, tx_hash);
            return Err(BridgeError::SourceTransactionReverted {
                tx_hash: format!("{:?}", tx_hash),
            });
        }

        debug!(
            "{} mined in block {:?}, gas used {:?}",
            label, receipt.block_number, receipt.gas_used
        );
        Ok(receipt)
    }

    fn connection_error(e: impl std::fmt::Display) -> BridgeError {
        BridgeError::ChainConnection {
            chain: CHAIN_LABEL.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl SourceChain for EvmSourceChain {
    fn signer_address(&self) -> Address {
        self.client.address()
    }

    async fn token_decimals(&self) -> BridgeResult<u8> {
        self.decimals
            .get_or_try_init(|| async {
                self.token
                    .decimals()
                    .call()
                    .await
                    .map_err(Self::connection_error)
            })
            .await
            .copied()
    }

    async fn token_balance(&self, owner: Address) -> BridgeResult<U256> {
        self.token
            .balance_of(owner)
            .call()
            .await
            .map_err(Self::connection_error)
    }

    async fn pending_nonce(&self) -> BridgeResult<U256> {
        self.client
            .get_transaction_count(
                self.client.address(),
                Some(BlockId::Number(BlockNumber::Pending)),
            )
            .await
            .map_err(Self::connection_error)
    }

    async fn approve(&self, amount: U256, nonce: U256) -> BridgeResult<TransactionReceipt> {
        let spender = self.messenger.address();
        let call = self.token.approve(spender, amount);
        self.submit("approve", call, nonce).await
    }

    async fn deposit_for_burn(
        &self,
        request: &BurnRequest,
        nonce: U256,
    ) -> BridgeResult<TransactionReceipt> {
        let call = self.messenger.deposit_for_burn(
            request.amount,
            request.destination_domain,
            request.mint_recipient,
            self.token.address(),
        );
        self.submit("depositForBurn", call, nonce).await
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> BridgeResult<Option<TransactionReceipt>> {
        self.client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(Self::connection_error)
    }
}

fn parse_address(field: &str, value: &str) -> BridgeResult<Address> {
    value
        .parse()
        .map_err(|e| BridgeError::Config(format!("Invalid {} {:?}: {}", field, value, e)))
}
