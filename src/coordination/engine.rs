//! Transfer engine: burn, attest, mint

use super::progress::ProgressReporter;
use crate::attestation::{AttestationPoller, AttestationProvider};
use crate::chain::{DestinationChain, DestinationSigner, SourceChain};
use crate::error::BridgeError;
use crate::events::encode_prefixed_hex;
use crate::tx::{DestinationReceiver, SourceSender};
use crate::types::{TransferOutcome, TransferProgress, TransferRequest};

use ethers::types::H256;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Error that ended a transfer, surfaced verbatim to the caller
#[derive(Debug)]
struct StepError {
    message: String,
    /// Burned tokens are not minted yet
    funds_in_flight: bool,
}

impl From<BridgeError> for StepError {
    fn from(e: BridgeError) -> Self {
        Self {
            funds_in_flight: e.leaves_funds_in_flight(),
            message: e.to_string(),
        }
    }
}

/// Runs transfers step by step
pub struct TransferEngine<S: SourceChain, A: AttestationProvider, D: DestinationChain> {
    /// Step 1
    sender: SourceSender<S>,
    /// Step 2
    poller: AttestationPoller<S, A>,
    /// Step 3
    receiver: DestinationReceiver<D>,
}

impl<S: SourceChain, A: AttestationProvider, D: DestinationChain> TransferEngine<S, A, D> {
    /// Create a new transfer engine
    pub fn new(
        sender: SourceSender<S>,
        poller: AttestationPoller<S, A>,
        receiver: DestinationReceiver<D>,
    ) -> Self {
        Self {
            sender,
            poller,
            receiver,
        }
    }

    pub fn sender(&self) -> &SourceSender<S> {
        &self.sender
    }

    pub fn receiver(&self) -> &DestinationReceiver<D> {
        &self.receiver
    }

    /// Run a transfer end to end.
    ///
    /// Never fails: errors end up in the outcome and in a final `failed`
    /// progress notification.
    pub async fn run<F>(&self, request: &TransferRequest, on_progress: F) -> TransferOutcome
    where
        F: FnMut(TransferProgress) + Send,
    {
        let span = info_span!("transfer", id = %Uuid::new_v4(), amount = %request.amount);
        async move {
            info!("Transferring {} to {}", request.amount, request.recipient_address);
            crate::metrics::record_transfer_started("transfer");

            let started = Instant::now();
            let mut reporter = ProgressReporter::new(on_progress);
            let mut outcome = TransferOutcome::default();

            let result = self.execute(request, &mut reporter, &mut outcome).await;
            Self::finish(result, &mut reporter, outcome, started)
        }
        .instrument(span)
        .await
    }

    /// Finish a transfer whose burn already confirmed, running steps 2 and 3
    pub async fn resume<F>(
        &self,
        source_tx_hash: H256,
        credential: &DestinationSigner,
        on_progress: F,
    ) -> TransferOutcome
    where
        F: FnMut(TransferProgress) + Send,
    {
        let span = info_span!("resume", id = %Uuid::new_v4(), source_tx = ?source_tx_hash);
        async move {
            info!("Resuming transfer from burn {:?}", source_tx_hash);
            crate::metrics::record_transfer_started("resume");

            let started = Instant::now();
            let mut reporter = ProgressReporter::new(on_progress);
            let mut outcome = TransferOutcome {
                source_transaction_hash: Some(source_tx_hash),
                ..Default::default()
            };
            reporter.completed(
                1,
                "Burn already confirmed",
                Some(format!("{:?}", source_tx_hash)),
            );

            let result = self
                .complete_from_burn(source_tx_hash, credential, &mut reporter, &mut outcome)
                .await;
            Self::finish(result, &mut reporter, outcome, started)
        }
        .instrument(span)
        .await
    }

    async fn execute<F: FnMut(TransferProgress)>(
        &self,
        request: &TransferRequest,
        reporter: &mut ProgressReporter<F>,
        outcome: &mut TransferOutcome,
    ) -> Result<(), StepError> {
        reporter.processing(1, format!("Burning {} on the source chain", request.amount));
        let sent = self
            .sender
            .execute_full_transfer(&request.amount, &request.recipient_address)
            .await?;

        outcome.source_transaction_hash = Some(sent.transaction_hash);
        reporter.completed(
            1,
            format!("Burn confirmed (protocol nonce {})", sent.protocol_nonce),
            Some(format!("{:?}", sent.transaction_hash)),
        );

        self.complete_from_burn(sent.transaction_hash, &request.credential, reporter, outcome)
            .await
    }

    async fn complete_from_burn<F: FnMut(TransferProgress)>(
        &self,
        source_tx_hash: H256,
        credential: &DestinationSigner,
        reporter: &mut ProgressReporter<F>,
        outcome: &mut TransferOutcome,
    ) -> Result<(), StepError> {
        reporter.processing(2, "Waiting for attestation");
        let attestation = self.poller.await_attestation(source_tx_hash).await?;
        reporter.completed(
            2,
            format!("Attestation received for {:?}", attestation.message_hash),
            None,
        );

        reporter.processing(3, "Receiving on the destination chain");
        let received = self
            .receiver
            .receive(
                &encode_prefixed_hex(&attestation.message),
                &encode_prefixed_hex(&attestation.attestation),
                credential,
            )
            .await;
        outcome.destination_transaction_hash = received.transaction_hash.clone();

        if !received.success {
            return Err(StepError {
                message: received
                    .error
                    .unwrap_or_else(|| "Destination receive failed".to_string()),
                funds_in_flight: true,
            });
        }

        reporter.completed(
            3,
            format!("Received {}", received.amount_received),
            received.transaction_hash,
        );
        outcome.transferred_amount = Some(received.amount_received);
        Ok(())
    }

    fn finish<F: FnMut(TransferProgress)>(
        result: Result<(), StepError>,
        reporter: &mut ProgressReporter<F>,
        mut outcome: TransferOutcome,
        started: Instant,
    ) -> TransferOutcome {
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(()) => {
                outcome.success = true;
                crate::metrics::record_transfer_completed(elapsed);
                info!("Transfer complete in {:.1}s", elapsed);
            }
            Err(e) => {
                let step = reporter.current_step();
                let source_hash = outcome.source_transaction_hash.map(|h| format!("{:?}", h));
                let failed_hash = match (step, &outcome.destination_transaction_hash) {
                    (3, Some(hash)) => Some(hash.clone()),
                    _ => source_hash.clone(),
                };
                reporter.failed(e.message.clone(), failed_hash);
                crate::metrics::record_transfer_failed(step, elapsed);
                error!("Transfer failed at step {}: {}", step, e.message);

                if let (true, Some(hash)) = (e.funds_in_flight, source_hash) {
                    warn!("Tokens burned in {} are not minted yet; resume with this hash", hash);
                }
                outcome.error_message = Some(e.message);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{AttestationResponse, MockAttestationProvider};
    use crate::config::test_support::{attestation_config, transfer_config};
    use crate::events::test_support::burn_message;
    use crate::test_utils::{
        burn_receipt, test_signer, units, FakeDestinationChain, FakeSourceChain, RECIPIENT,
    };
    use crate::types::{AttestationStatus, StepStatus};
    use std::sync::Arc;

    type TestEngine = TransferEngine<FakeSourceChain, MockAttestationProvider, FakeDestinationChain>;

    fn signed() -> MockAttestationProvider {
        let mut provider = MockAttestationProvider::new();
        provider.expect_get_attestation().returning(|_| {
            Ok(Some(AttestationResponse {
                status: AttestationStatus::Complete,
                attestation: Some("0xaa55".to_string()),
                message: None,
            }))
        });
        provider
    }

    fn engine(
        source: FakeSourceChain,
        provider: MockAttestationProvider,
        destination: FakeDestinationChain,
    ) -> (Arc<FakeSourceChain>, Arc<FakeDestinationChain>, TestEngine) {
        let source = Arc::new(source);
        let destination = Arc::new(destination);
        let engine = TransferEngine::new(
            SourceSender::new(source.clone(), transfer_config(), false),
            AttestationPoller::new(source.clone(), provider, attestation_config(1_000, 10, 60)),
            DestinationReceiver::new(destination.clone()),
        );
        (source, destination, engine)
    }

    fn request(amount: &str) -> TransferRequest {
        TransferRequest {
            amount: amount.to_string(),
            recipient_address: RECIPIENT.to_string(),
            credential: test_signer(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_transfer_reports_every_step() {
        let (_, destination, engine) =
            engine(FakeSourceChain::new(), signed(), FakeDestinationChain::new());
        let mut events = Vec::new();

        let outcome = engine.run(&request("1.0"), |p| events.push(p)).await;

        assert!(outcome.success, "{:?}", outcome.error_message);
        assert_eq!(outcome.transferred_amount.as_deref(), Some("1.0"));
        assert!(outcome.source_transaction_hash.is_some());
        assert!(outcome.destination_transaction_hash.is_some());
        assert!(outcome.error_message.is_none());

        let percentages: Vec<u8> = events.iter().filter_map(|p| p.percentage).collect();
        assert_eq!(percentages, vec![10, 33, 40, 66, 75, 100]);
        let steps: Vec<u8> = events.iter().map(|p| p.step_index).collect();
        assert_eq!(steps, vec![1, 1, 2, 2, 3, 3]);
        assert!(events.iter().all(|p| p.total_steps == 3));
        assert_eq!(events[5].status, StepStatus::Completed);

        let submissions = destination.submissions.lock().unwrap();
        assert_eq!(submissions[0].1, vec![0xaa, 0x55]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destination_revert_reports_both_hashes() {
        let (_, _, engine) = engine(
            FakeSourceChain::new(),
            signed(),
            FakeDestinationChain::new().reverting(),
        );
        let mut events = Vec::new();

        let outcome = engine.run(&request("1.0"), |p| events.push(p)).await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("Destination transaction reverted")
        );
        assert!(outcome.source_transaction_hash.is_some());
        assert!(outcome.destination_transaction_hash.is_some());
        assert!(outcome.transferred_amount.is_none());

        let last = events.last().unwrap();
        assert_eq!(last.status, StepStatus::Failed);
        assert_eq!(last.step_index, 3);
        assert_eq!(last.message, "Destination transaction reverted");
        assert_eq!(last.transaction_hash, outcome.destination_transaction_hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_balance_fails_first_step() {
        let mut provider = MockAttestationProvider::new();
        provider.expect_get_attestation().never();
        let (source, destination, engine) = engine(
            FakeSourceChain::new().with_balance("2.0"),
            provider,
            FakeDestinationChain::new(),
        );
        let mut events = Vec::new();

        let outcome = engine.run(&request("3.0"), |p| events.push(p)).await;

        assert!(!outcome.success);
        assert!(outcome.source_transaction_hash.is_none());
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("Insufficient balance: have 2.0, need 3.0")
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].step_index, 1);
        assert_eq!(events[1].status, StepStatus::Failed);
        assert_eq!(source.burn_count(), 0);
        assert_eq!(destination.submission_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attestation_timeout_fails_second_step() {
        let mut provider = MockAttestationProvider::new();
        provider.expect_get_attestation().returning(|_| Ok(None));
        let (_, destination, engine) =
            engine(FakeSourceChain::new(), provider, FakeDestinationChain::new());
        let mut events = Vec::new();

        let outcome = engine.run(&request("1.0"), |p| events.push(p)).await;

        assert!(!outcome.success);
        assert!(outcome.source_transaction_hash.is_some());
        assert!(outcome
            .error_message
            .unwrap()
            .starts_with("Timed out waiting for attestation"));
        assert_eq!(events.last().unwrap().step_index, 2);
        assert_eq!(destination.submission_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_finishes_stuck_burn() {
        let tx_hash = H256::repeat_byte(0x42);
        let recipient = crate::address::to_destination_format(RECIPIENT).unwrap();
        let message = burn_message(5, recipient, units("4.5"));
        let (source, _, engine) = engine(
            FakeSourceChain::new().with_receipt(burn_receipt(tx_hash, &message)),
            signed(),
            FakeDestinationChain::new(),
        );
        let mut events = Vec::new();

        let outcome = engine
            .resume(tx_hash, &test_signer(), |p| events.push(p))
            .await;

        assert!(outcome.success, "{:?}", outcome.error_message);
        assert_eq!(outcome.source_transaction_hash, Some(tx_hash));
        assert_eq!(outcome.transferred_amount.as_deref(), Some("4.5"));
        assert_eq!(events[0].status, StepStatus::Completed);
        assert_eq!(events[0].percentage, Some(33));
        assert_eq!(source.burn_count(), 0);
    }
}
