//! Attestation poller
//!
//! Turns a confirmed burn into a signed attestation:
//! 1. Read the burn receipt and pull the `MessageSent` payload out of it
//! 2. Poll the authority with the message hash until the attestation is
//!    complete, failed, or the attempt/wall-clock budget runs out
//!
//! Polling state: `NotRequested -> Pending -> {Complete | Failed | TimedOut}`.

use super::{AttestationProvider, AttestationResponse};
use crate::chain::SourceChain;
use crate::config::AttestationConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{decode_prefixed_hex, extract_message_sent, message_hash};
use crate::types::{AttestationData, AttestationStatus};

use ethers::types::{Bytes, H256, U64};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Message payload of a burn and the hash it is attested under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMessage {
    pub message_hash: H256,
    pub message: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollState {
    NotRequested,
    Pending { started: Instant },
    Complete,
    Failed,
    TimedOut,
}

impl PollState {
    fn advance(&mut self, next: PollState, message_hash: H256) {
        debug!("Attestation {:?}: {:?} -> {:?}", message_hash, self, next);
        if let PollState::Pending { started } = *self {
            if !matches!(next, PollState::Pending { .. }) {
                crate::metrics::record_attestation_latency(started.elapsed().as_secs_f64());
            }
        }
        *self = next;
    }
}

/// What one authority answer means for the poll loop
enum PollOutcome {
    Waiting,
    Ready(AttestationData),
}

/// Waits for attestations of source-chain burns
pub struct AttestationPoller<S: SourceChain, A: AttestationProvider> {
    chain: Arc<S>,
    provider: A,
    config: AttestationConfig,
}

impl<S: SourceChain, A: AttestationProvider> AttestationPoller<S, A> {
    pub fn new(chain: Arc<S>, provider: A, config: AttestationConfig) -> Self {
        Self {
            chain,
            provider,
            config,
        }
    }

    /// Read the `MessageSent` payload from the burn transaction's receipt
    pub async fn extract_message(&self, tx_hash: H256) -> BridgeResult<ExtractedMessage> {
        let attempts = self.config.receipt_max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.chain.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status == Some(U64::zero()) {
                        return Err(BridgeError::SourceTransactionReverted {
                            tx_hash: format!("{:?}", tx_hash),
                        });
                    }
                    let message = extract_message_sent(&receipt)?;
                    let message_hash = message_hash(&message);
                    debug!("Message {:?} extracted from {:?}", message_hash, tx_hash);
                    return Ok(ExtractedMessage {
                        message_hash,
                        message,
                    });
                }
                Ok(None) => debug!(
                    "Receipt for {:?} not available ({}/{})",
                    tx_hash, attempt, attempts
                ),
                Err(e) => warn!(
                    "Receipt lookup for {:?} failed ({}/{}): {}",
                    tx_hash, attempt, attempts, e
                ),
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.receipt_retry_delay()).await;
            }
        }

        Err(BridgeError::ReceiptUnavailable {
            tx_hash: format!("{:?}", tx_hash),
            attempts,
        })
    }

    /// Poll the authority until the attestation for `message_hash` is final
    pub async fn poll_attestation(&self, message_hash: H256) -> BridgeResult<AttestationData> {
        let started = Instant::now();
        let deadline = started + self.config.max_wait();
        let max_attempts = self.config.max_attempts.max(1);
        let mut state = PollState::NotRequested;
        let mut attempts = 0u32;

        loop {
            let now = Instant::now();
            if attempts >= max_attempts || now >= deadline {
                state.advance(PollState::TimedOut, message_hash);
                crate::metrics::record_attestation_poll("timeout");
                warn!(
                    "Gave up on attestation {:?} after {} attempts",
                    message_hash, attempts
                );
                return Err(BridgeError::AttestationTimeout {
                    attempts,
                    elapsed_secs: started.elapsed().as_secs(),
                });
            }

            attempts += 1;
            if state == PollState::NotRequested {
                state.advance(PollState::Pending { started: now }, message_hash);
            }

            let response = match tokio::time::timeout(
                deadline - now,
                self.provider.get_attestation(message_hash),
            )
            .await
            {
                Ok(response) => response.map_err(|e| {
                    crate::metrics::record_attestation_poll("error");
                    state.advance(PollState::Failed, message_hash);
                    e
                })?,
                Err(_) => {
                    debug!("Attestation request outlived the deadline");
                    continue;
                }
            };

            let outcome = self
                .interpret(message_hash, response, attempts)
                .map_err(|e| {
                    state.advance(PollState::Failed, message_hash);
                    e
                })?;
            match outcome {
                PollOutcome::Ready(data) => {
                    state.advance(PollState::Complete, message_hash);
                    info!(
                        "Attestation for {:?} complete after {} attempts",
                        message_hash, attempts
                    );
                    return Ok(data);
                }
                PollOutcome::Waiting => {}
            }

            let wake = (Instant::now() + self.config.poll_interval()).min(deadline);
            tokio::time::sleep_until(wake).await;
        }
    }

    fn interpret(
        &self,
        message_hash: H256,
        response: Option<AttestationResponse>,
        attempt: u32,
    ) -> BridgeResult<PollOutcome> {
        let response = match response {
            Some(response) => response,
            None => {
                crate::metrics::record_attestation_poll("not_found");
                debug!("Attestation {:?} not found yet (attempt {})", message_hash, attempt);
                return Ok(PollOutcome::Waiting);
            }
        };

        match response.status {
            AttestationStatus::Complete => {
                let signature = response
                    .attestation
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                let signature = match signature {
                    Some(signature) => signature,
                    None => {
                        crate::metrics::record_attestation_poll("pending");
                        debug!("Attestation {:?} complete without signature", message_hash);
                        return Ok(PollOutcome::Waiting);
                    }
                };

                let attestation = decode_prefixed_hex(signature).ok_or_else(|| {
                    BridgeError::InvalidAttestationFormat(format!(
                        "signature {:?} is not 0x-prefixed hex",
                        signature
                    ))
                })?;
                let message = response
                    .message
                    .as_deref()
                    .and_then(decode_prefixed_hex)
                    .unwrap_or_default();

                crate::metrics::record_attestation_poll("complete");
                Ok(PollOutcome::Ready(AttestationData {
                    status: AttestationStatus::Complete,
                    message_hash,
                    message: message.into(),
                    attestation: attestation.into(),
                }))
            }
            AttestationStatus::Failed => {
                crate::metrics::record_attestation_poll("failed");
                Err(BridgeError::AttestationFailed {
                    message_hash: format!("{:?}", message_hash),
                })
            }
            status => {
                crate::metrics::record_attestation_poll("pending");
                debug!(
                    "Attestation {:?} is {:?} (attempt {})",
                    message_hash, status, attempt
                );
                Ok(PollOutcome::Waiting)
            }
        }
    }

    /// Extract the burn message and wait for its attestation.
    ///
    /// The message read from the source chain is the one returned.
    pub async fn await_attestation(&self, tx_hash: H256) -> BridgeResult<AttestationData> {
        let extracted = self.extract_message(tx_hash).await?;
        let mut data = self.poll_attestation(extracted.message_hash).await?;

        if data.message.is_empty() {
            debug!("Authority omitted the message, using the source payload");
        } else if data.message != extracted.message {
            warn!(
                "Authority message for {:?} differs from the source payload, keeping the source bytes",
                extracted.message_hash
            );
        }
        data.message = extracted.message;
        Ok(data)
    }
}
