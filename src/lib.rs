//! Bridge Transfer - cross-chain token transfers by burn, attest and mint
//!
//! A transfer runs three sequential steps:
//! 1. Approve and burn the token on the source chain
//! 2. Poll the attestation authority for a signature over the burn message
//! 3. Submit message and attestation to the destination chain's bridge
//!
//! The chains and the attestation authority sit behind traits
//! ([`chain::SourceChain`], [`chain::DestinationChain`],
//! [`attestation::AttestationProvider`]) so the engine can be driven by
//! in-process fakes.

pub mod address;
pub mod amount;
pub mod attestation;
pub mod chain;
pub mod config;
pub mod coordination;
pub mod error;
pub mod events;
pub mod metrics;
pub mod tx;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use coordination::TransferEngine;
pub use error::{BridgeError, BridgeResult};
pub use types::{TransferOutcome, TransferProgress, TransferRequest};
