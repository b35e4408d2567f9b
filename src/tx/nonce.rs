//! Nonce management for back-to-back source-chain transactions
//!
//! Handles:
//! - Fetching the signer's pending nonce once per transfer attempt
//! - Local allocation for the follow-up transaction
//! - Recognising stale nonce rejections from the node

use crate::chain::SourceChain;
use crate::error::{BridgeError, BridgeResult};

use ethers::types::{Address, U256};
use std::fmt::Display;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Node error fragments meaning the nonce was already consumed or is in use
const STALE_NONCE_PATTERNS: &[&str] = &[
    "nonce too low",
    "nonce has already been used",
    "invalid nonce",
    "replacement transaction underpriced",
    "already known",
];

/// Check whether a node error reports a stale or colliding nonce
pub fn is_stale_nonce_message(message: &str) -> bool {
    let message = message.to_lowercase();
    STALE_NONCE_PATTERNS.iter().any(|p| message.contains(p))
}

/// Map a send failure to the error taxonomy
pub fn classify_send_error(e: impl Display) -> BridgeError {
    let message = e.to_string();
    if is_stale_nonce_message(&message) {
        BridgeError::StaleNonce(message)
    } else {
        BridgeError::Transaction(message)
    }
}

/// Local nonce state of one signer
struct NonceState {
    /// Next nonce to hand out
    next: U256,
    /// Nonces handed out since the last sync
    allocated: Vec<U256>,
}

/// Hands out consecutive nonces without re-querying the node between the
/// transactions of one transfer attempt. Each attempt owns its own manager.
pub struct NonceManager {
    /// Signer the nonces belong to
    signer: Address,
    state: Mutex<Option<NonceState>>,
}

impl NonceManager {
    /// Create a new nonce manager
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            state: Mutex::new(None),
        }
    }

    /// Fetch the pending nonce from the chain and restart local allocation
    pub async fn sync<C: SourceChain + ?Sized>(&self, chain: &C) -> BridgeResult<U256> {
        let on_chain = chain.pending_nonce().await?;
        let mut state = self.state.lock().await;

        if let Some(previous) = state.as_ref() {
            if on_chain < previous.next {
                warn!(
                    "Pending nonce {} for {:?} is behind local nonce {} ({} allocated)",
                    on_chain,
                    self.signer,
                    previous.next,
                    previous.allocated.len()
                );
            }
        }

        *state = Some(NonceState {
            next: on_chain,
            allocated: Vec::new(),
        });
        debug!("Synced nonce for {:?}: {}", self.signer, on_chain);
        Ok(on_chain)
    }

    /// Get the next nonce
    pub async fn allocate(&self) -> BridgeResult<U256> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or_else(|| {
            BridgeError::Unexpected(format!("nonce for {:?} used before sync", self.signer))
        })?;

        let nonce = state.next;
        state.next = nonce + 1;
        state.allocated.push(nonce);
        debug!("Allocated nonce {} for {:?}", nonce, self.signer);
        Ok(nonce)
    }

    /// Nonces handed out since the last sync
    pub async fn allocated(&self) -> Vec<U256> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|s| s.allocated.clone())
            .unwrap_or_default()
    }
}
