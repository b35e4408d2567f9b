//! Attestation module - signed proofs for burned messages
//!
//! This module provides:
//! - The `AttestationProvider` trait over the attestation authority
//! - An HTTP client for the authority's REST API
//! - A poller that turns a burn transaction into a usable attestation

pub mod client;
pub mod poller;

pub use client::IrisAttestationClient;
pub use poller::{AttestationPoller, ExtractedMessage};

use crate::error::BridgeResult;
use crate::types::AttestationStatus;

use async_trait::async_trait;
use ethers::types::H256;
use serde::Deserialize;

/// Body returned by the authority for a known message
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AttestationResponse {
    #[serde(default)]
    pub status: AttestationStatus,
    /// `0x` hex signature once complete; placeholder text before that
    #[serde(default)]
    pub attestation: Option<String>,
    /// `0x` hex message, when the authority echoes it
    #[serde(default)]
    pub message: Option<String>,
}

/// Source of attestations for message hashes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttestationProvider: Send + Sync {
    /// Look up the attestation for `message_hash`; `None` while the
    /// authority has not seen the message yet
    async fn get_attestation(&self, message_hash: H256)
        -> BridgeResult<Option<AttestationResponse>>;
}
