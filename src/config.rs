//! Configuration management for the bridge transfer orchestrator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub source: SourceChainConfig,
    pub destination: DestinationChainConfig,
    pub attestation: AttestationConfig,
    pub transfer: TransferConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub token_address: String,
    pub token_messenger_address: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    #[serde(default = "default_source_key_env")]
    pub private_key_env: String,
    #[serde(default)]
    pub approve_unlimited: bool,
    #[serde(default = "default_gas_buffer")]
    pub gas_limit_buffer_percent: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationChainConfig {
    pub rest_url: String,
    /// Compiled receive routine supplied by the destination bridge
    pub bridge_routine_path: PathBuf,
    pub token_metadata_address: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    #[serde(default = "default_max_gas_amount")]
    pub max_gas_amount: u64,
    #[serde(default = "default_gas_unit_price")]
    pub gas_unit_price: u64,
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
    #[serde(default = "default_destination_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttestationConfig {
    pub api_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_receipt_attempts")]
    pub receipt_max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub receipt_retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Protocol domain of the destination chain
    pub destination_domain: u32,
    /// Default amount when the caller does not pass one
    pub amount: Option<String>,
    #[serde(default = "default_nonce_attempts")]
    pub nonce_max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub nonce_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9184,
        }
    }
}

fn default_confirmations() -> usize {
    1
}

fn default_source_key_env() -> String {
    "SOURCE_PRIVATE_KEY".to_string()
}

fn default_destination_key_env() -> String {
    "DESTINATION_PRIVATE_KEY".to_string()
}

fn default_gas_buffer() -> u64 {
    20
}

fn default_token_decimals() -> u8 {
    6
}

fn default_max_gas_amount() -> u64 {
    100_000
}

fn default_gas_unit_price() -> u64 {
    100
}

fn default_expiration_secs() -> u64 {
    600
}

fn default_confirmation_timeout_secs() -> u64 {
    60
}

fn default_confirmation_poll_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    60
}

fn default_max_wait_secs() -> u64 {
    300
}

fn default_receipt_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_nonce_attempts() -> u32 {
    3
}

impl AttestationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn receipt_retry_delay(&self) -> Duration {
        Duration::from_millis(self.receipt_retry_delay_ms)
    }
}

impl TransferConfig {
    pub fn nonce_retry_delay(&self) -> Duration {
        Duration::from_millis(self.nonce_retry_delay_ms)
    }
}

impl Settings {
    /// Load settings from `BRIDGE_CONFIG` or `config/default.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var("BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.source.rpc_url.is_empty() {
            anyhow::bail!("Source chain has no RPC URL configured");
        }
        if self.source.token_address.is_empty() || self.source.token_messenger_address.is_empty() {
            anyhow::bail!("Source chain token and token messenger addresses are required");
        }
        if self.destination.rest_url.is_empty() {
            anyhow::bail!("Destination chain has no REST URL configured");
        }
        crate::address::to_destination_format(&self.destination.token_metadata_address)
            .context("Invalid destination token metadata address")?;
        if self.attestation.api_url.is_empty() {
            anyhow::bail!("Attestation API URL is required");
        }
        if self.attestation.poll_interval_ms == 0 {
            anyhow::bail!("Attestation poll interval must be positive");
        }
        if self.attestation.max_attempts == 0 || self.attestation.receipt_max_attempts == 0 {
            anyhow::bail!("Attempt bounds must be at least 1");
        }
        if self.transfer.nonce_max_attempts == 0 {
            anyhow::bail!("transfer.nonce_max_attempts must be at least 1");
        }
        if let Some(amount) = &self.transfer.amount {
            crate::amount::to_base_units(amount, self.destination.token_decimals)
                .context("Invalid default transfer amount")?;
        }
        if self.source.confirmations == 0 {
            tracing::warn!("source.confirmations is 0 - receipts are read as soon as mined");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static! {
        static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    }

    let mut result = input.to_string();
    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
