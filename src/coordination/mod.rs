//! Coordination of a single cross-chain transfer
//!
//! The transfer engine:
//! 1. Burns on the source chain (balance check, approve, depositForBurn)
//! 2. Waits for the attestation of the burn message
//! 3. Receives the message on the destination chain and measures the mint
//!
//! Each step reports progress through the caller's callback.

pub mod engine;
pub mod progress;

pub use engine::TransferEngine;
pub use progress::ProgressReporter;
