//! Destination chain REST client and signing credential
//!
//! The destination node exposes a JSON REST API under `/v1`. Receives are
//! submitted as script transactions running the bridge's compiled receive
//! routine with `(message, attestation)` as its two byte-vector arguments.
//! Signing follows the node's two-phase flow: the node BCS-encodes the
//! unsigned transaction, the client signs those bytes with ed25519.

use super::{DestinationChain, DestinationTxStatus};
use crate::address::{
    account_address_from_public_key, from_destination_format, primary_store_address,
    to_destination_format,
};
use crate::config::DestinationChainConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{decode_prefixed_hex, encode_prefixed_hex};

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const CHAIN_LABEL: &str = "destination";
const FUNGIBLE_STORE: &str = "0x1::fungible_asset::FungibleStore";

/// Optional prefix of exported ed25519 private keys
const PRIVATE_KEY_PREFIX: &str = "ed25519-priv-";

/// Ed25519 key that signs and pays for destination transactions
pub struct DestinationSigner {
    key: SigningKey,
    address: [u8; 32],
}

impl DestinationSigner {
    /// Signer for the account derived from the key itself
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        let key = SigningKey::from_bytes(secret);
        let address = account_address_from_public_key(&key.verifying_key().to_bytes());
        Self { key, address }
    }

    /// Parse a hex private key, with or without `0x` and `ed25519-priv-`
    pub fn from_hex(private_key: &str) -> BridgeResult<Self> {
        let trimmed = private_key.trim();
        let trimmed = trimmed.strip_prefix(PRIVATE_KEY_PREFIX).unwrap_or(trimmed);
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let mut secret = [0u8; 32];
        hex::decode_to_slice(digits, &mut secret)
            .map_err(|e| BridgeError::Wallet(format!("Invalid destination private key: {}", e)))?;
        Ok(Self::from_bytes(&secret))
    }

    /// Load the key from an environment variable
    pub fn from_env(key_env: &str) -> BridgeResult<Self> {
        let key = std::env::var(key_env).map_err(|_| {
            BridgeError::Wallet(format!("No destination wallet configured. Set {}", key_env))
        })?;
        Self::from_hex(&key)
    }

    /// Use an explicit account address, for accounts whose key was rotated
    pub fn with_address(mut self, address: [u8; 32]) -> Self {
        self.address = address;
        self
    }

    pub fn address(&self) -> &[u8; 32] {
        &self.address
    }

    pub fn address_hex(&self) -> String {
        from_destination_format(&self.address)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message).to_bytes()
    }
}

impl fmt::Debug for DestinationSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationSigner")
            .field("address", &self.address_hex())
            .finish_non_exhaustive()
    }
}

/// Destination chain client over the node REST API
pub struct RestDestinationChain {
    http: reqwest::Client,
    base_url: String,
    config: DestinationChainConfig,
    /// Token metadata object
    metadata: [u8; 32],
    /// Compiled receive routine
    routine: Vec<u8>,
}

impl RestDestinationChain {
    /// Create a client, loading the receive routine from the configured path
    pub fn new(config: DestinationChainConfig) -> BridgeResult<Self> {
        let routine = load_routine(&config.bridge_routine_path)?;
        Self::with_routine(config, routine)
    }

    pub fn with_routine(config: DestinationChainConfig, routine: Vec<u8>) -> BridgeResult<Self> {
        if routine.is_empty() {
            return Err(BridgeError::Config("Bridge receive routine is empty".to_string()));
        }
        let metadata = to_destination_format(&config.token_metadata_address)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(connection_error)?;

        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            config,
            metadata,
            routine,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// GET a resource; `None` on 404
    async fn get_json(&self, path: &str) -> BridgeResult<Option<Value>> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(connection_error(format!("GET {} returned {}: {}", path, status, body)));
        }

        response.json().await.map(Some).map_err(connection_error)
    }

    async fn post_json(&self, path: &str, body: &Value) -> BridgeResult<Value> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Transaction(format!(
                "POST {} rejected with {}: {}",
                path, status, body
            )));
        }

        response.json().await.map_err(connection_error)
    }

    async fn sequence_number(&self, account: &[u8; 32]) -> BridgeResult<u64> {
        let address = from_destination_format(account);
        let info = self
            .get_json(&format!("accounts/{}", address))
            .await?
            .ok_or_else(|| {
                BridgeError::Wallet(format!("Destination account {} does not exist", address))
            })?;

        info.get("sequence_number")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| connection_error(format!("account {} has no sequence number", address)))
    }

    /// Unsigned script transaction invoking the receive routine
    fn build_transaction(
        &self,
        sender: &[u8; 32],
        sequence_number: u64,
        message: &[u8],
        attestation: &[u8],
        expiration_timestamp_secs: u64,
    ) -> Value {
        json!({
            "sender": from_destination_format(sender),
            "sequence_number": sequence_number.to_string(),
            "max_gas_amount": self.config.max_gas_amount.to_string(),
            "gas_unit_price": self.config.gas_unit_price.to_string(),
            "expiration_timestamp_secs": expiration_timestamp_secs.to_string(),
            "payload": {
                "type": "script_payload",
                "code": { "bytecode": encode_prefixed_hex(&self.routine) },
                "type_arguments": [],
                "arguments": [encode_prefixed_hex(message), encode_prefixed_hex(attestation)],
            },
        })
    }

    fn expiration_timestamp(&self) -> u64 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        now + self.config.expiration_secs
    }
}

#[async_trait]
impl DestinationChain for RestDestinationChain {
    fn token_decimals(&self) -> u8 {
        self.config.token_decimals
    }

    async fn fungible_balance(&self, owner: &[u8; 32]) -> BridgeResult<Option<u64>> {
        let store = from_destination_format(&primary_store_address(owner, &self.metadata));
        let resource = match self
            .get_json(&format!("accounts/{}/resource/{}", store, FUNGIBLE_STORE))
            .await?
        {
            Some(resource) => resource,
            None => return Ok(None),
        };

        resource
            .pointer("/data/balance")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .map(Some)
            .ok_or_else(|| connection_error(format!("store {} has no readable balance", store)))
    }

    async fn submit_receive(
        &self,
        message: &[u8],
        attestation: &[u8],
        signer: &DestinationSigner,
    ) -> BridgeResult<String> {
        let sequence_number = self.sequence_number(signer.address()).await?;
        let mut transaction = self.build_transaction(
            signer.address(),
            sequence_number,
            message,
            attestation,
            self.expiration_timestamp(),
        );

        let encoded = self
            .post_json("transactions/encode_submission", &transaction)
            .await?;
        let signing_message = encoded
            .as_str()
            .and_then(decode_prefixed_hex)
            .ok_or_else(|| {
                BridgeError::Transaction(format!("unexpected signing message: {}", encoded))
            })?;

        transaction["signature"] = json!({
            "type": "ed25519_signature",
            "public_key": encode_prefixed_hex(&signer.public_key()),
            "signature": encode_prefixed_hex(&signer.sign(&signing_message)),
        });

        let submitted = self.post_json("transactions", &transaction).await?;
        let tx_hash = submitted
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BridgeError::Transaction("submission returned no hash".to_string()))?;

        info!(
            "Receive submitted: {} (sender {}, sequence {})",
            tx_hash,
            signer.address_hex(),
            sequence_number
        );
        crate::metrics::record_tx_submitted(CHAIN_LABEL);
        Ok(tx_hash)
    }

    async fn wait_for_transaction(&self, tx_hash: &str) -> BridgeResult<DestinationTxStatus> {
        let deadline = Instant::now() + Duration::from_secs(self.config.confirmation_timeout_secs);
        let poll = Duration::from_millis(self.config.confirmation_poll_ms);

        loop {
            if let Some(tx) = self
                .get_json(&format!("transactions/by_hash/{}", tx_hash))
                .await?
            {
                if tx.get("type").and_then(Value::as_str) != Some("pending_transaction") {
                    let status = DestinationTxStatus {
                        success: tx.get("success").and_then(Value::as_bool).unwrap_or(false),
                        vm_status: tx
                            .get("vm_status")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    };
                    debug!("{} committed: {:?}", tx_hash, status);
                    return Ok(status);
                }
            }

            if Instant::now() >= deadline {
                return Err(BridgeError::Transaction(format!(
                    "{} not committed within {}s",
                    tx_hash, self.config.confirmation_timeout_secs
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Read the compiled routine, stored either raw or as `0x` hex text
fn load_routine(path: &Path) -> BridgeResult<Vec<u8>> {
    let raw = std::fs::read(path).map_err(|e| {
        BridgeError::Config(format!("Cannot read bridge routine {:?}: {}", path, e))
    })?;

    if raw.starts_with(b"0x") {
        let text = String::from_utf8_lossy(&raw);
        return decode_prefixed_hex(&text).ok_or_else(|| {
            BridgeError::Config(format!("Bridge routine {:?} is not valid hex", path))
        });
    }
    Ok(raw)
}

fn connection_error(e: impl fmt::Display) -> BridgeError {
    BridgeError::ChainConnection {
        chain: CHAIN_LABEL.to_string(),
        message: e.to_string(),
    }
}
