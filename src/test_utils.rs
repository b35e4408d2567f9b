//! In-process chain fakes shared by unit tests

use crate::amount::to_base_units;
use crate::chain::{BurnRequest, DestinationChain, DestinationSigner, DestinationTxStatus, SourceChain};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{encode_message_sent, test_support::burn_message, BurnMessage};

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, H256, U256, U64};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOKEN_DECIMALS: u8 = 6;
pub const PROTOCOL_NONCE: u64 = 77;
pub const RECIPIENT: &str = "0x9f2b4c6d8e0a1b3c5d7e9f0a2b4c6d8e0a1b3c5d7e9f0a2b4c6d8e0a1b3c5d7e";

pub fn test_signer() -> Arc<DestinationSigner> {
    Arc::new(DestinationSigner::from_bytes(&[7u8; 32]))
}

pub fn units(amount: &str) -> U256 {
    to_base_units(amount, TOKEN_DECIMALS).unwrap()
}

/// Source chain that mines everything instantly
pub struct FakeSourceChain {
    signer: Address,
    balance: Mutex<U256>,
    nonce: Mutex<U256>,
    nonce_queries: AtomicU32,
    stale_approvals: AtomicU32,
    approve_error: Mutex<Option<BridgeError>>,
    /// Approvals of this amount revert
    rejected_approval: Option<U256>,
    /// Time an accepted approval takes to mine
    approval_delay: Option<Duration>,
    emit_message: bool,
    receipt_misses: AtomicU32,
    receipt_queries: AtomicU32,
    pub approvals: Mutex<Vec<(U256, U256)>>,
    pub burns: Mutex<Vec<(BurnRequest, U256)>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
}

impl FakeSourceChain {
    pub fn new() -> Self {
        Self {
            signer: Address::repeat_byte(0x5e),
            balance: Mutex::new(units("100.0")),
            nonce: Mutex::new(U256::zero()),
            nonce_queries: AtomicU32::new(0),
            stale_approvals: AtomicU32::new(0),
            approve_error: Mutex::new(None),
            rejected_approval: None,
            approval_delay: None,
            emit_message: true,
            receipt_misses: AtomicU32::new(0),
            receipt_queries: AtomicU32::new(0),
            approvals: Mutex::new(Vec::new()),
            burns: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_balance(self, amount: &str) -> Self {
        *self.balance.lock().unwrap() = units(amount);
        self
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        *self.nonce.lock().unwrap() = U256::from(nonce);
        self
    }

    /// The next `count` approvals are rejected with a stale nonce
    pub fn with_stale_approvals(self, count: u32) -> Self {
        self.stale_approvals.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_approve_error(self, error: BridgeError) -> Self {
        *self.approve_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_rejected_approval(mut self, amount: U256) -> Self {
        self.rejected_approval = Some(amount);
        self
    }

    pub fn with_approval_delay(mut self, delay: Duration) -> Self {
        self.approval_delay = Some(delay);
        self
    }

    pub fn without_message_event(mut self) -> Self {
        self.emit_message = false;
        self
    }

    /// The first `count` receipt lookups find nothing
    pub fn with_receipt_misses(self, count: u32) -> Self {
        self.receipt_misses.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_receipt(self, receipt: TransactionReceipt) -> Self {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, receipt);
        self
    }

    pub fn nonce_queries(&self) -> u32 {
        self.nonce_queries.load(Ordering::SeqCst)
    }

    pub fn receipt_queries(&self) -> u32 {
        self.receipt_queries.load(Ordering::SeqCst)
    }

    pub fn burn_count(&self) -> usize {
        self.burns.lock().unwrap().len()
    }

    pub fn approve_count(&self) -> usize {
        self.approvals.lock().unwrap().len()
    }

    fn mine(&self, nonce: U256) -> TransactionReceipt {
        let mut current = self.nonce.lock().unwrap();
        if nonce >= *current {
            *current = nonce + 1;
        }
        TransactionReceipt {
            transaction_hash: H256::from_low_u64_be(0x1000 + nonce.as_u64()),
            status: Some(U64::one()),
            ..Default::default()
        }
    }
}

/// Receipt carrying a burn message, for chains that only answer lookups
pub fn burn_receipt(tx_hash: H256, message: &[u8]) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: tx_hash,
        status: Some(U64::one()),
        logs: vec![encode_message_sent(message)],
        ..Default::default()
    }
}

#[async_trait]
impl SourceChain for FakeSourceChain {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn token_decimals(&self) -> BridgeResult<u8> {
        Ok(TOKEN_DECIMALS)
    }

    async fn token_balance(&self, _owner: Address) -> BridgeResult<U256> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn pending_nonce(&self) -> BridgeResult<U256> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        Ok(*self.nonce.lock().unwrap())
    }

    async fn approve(&self, amount: U256, nonce: U256) -> BridgeResult<TransactionReceipt> {
        self.approvals.lock().unwrap().push((amount, nonce));

        if let Some(error) = self.approve_error.lock().unwrap().clone() {
            return Err(error);
        }
        if self.rejected_approval == Some(amount) {
            return Err(BridgeError::Transaction("execution reverted".into()));
        }
        let stale = self
            .stale_approvals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Err(BridgeError::StaleNonce(format!("nonce too low: {}", nonce)));
        }

        if let Some(delay) = self.approval_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.mine(nonce))
    }

    async fn deposit_for_burn(
        &self,
        request: &BurnRequest,
        nonce: U256,
    ) -> BridgeResult<TransactionReceipt> {
        self.burns.lock().unwrap().push((request.clone(), nonce));

        let mut receipt = self.mine(nonce);
        if self.emit_message {
            let message = burn_message(PROTOCOL_NONCE, request.mint_recipient, request.amount);
            receipt.logs.push(encode_message_sent(&message));
        }
        *self.balance.lock().unwrap() -= request.amount;
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, receipt.clone());
        Ok(receipt)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> BridgeResult<Option<TransactionReceipt>> {
        self.receipt_queries.fetch_add(1, Ordering::SeqCst);
        let missed = self
            .receipt_misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(None);
        }
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }
}

/// Destination chain crediting the mint recipient on every successful receive
pub struct FakeDestinationChain {
    balances: Mutex<HashMap<[u8; 32], u64>>,
    /// Credited amount; `None` credits the burned amount
    mint_delta: Option<u64>,
    revert: bool,
    pub submissions: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl FakeDestinationChain {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            mint_delta: None,
            revert: false,
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_balance(self, owner: [u8; 32], units: u64) -> Self {
        self.balances.lock().unwrap().insert(owner, units);
        self
    }

    pub fn with_mint_delta(mut self, units: u64) -> Self {
        self.mint_delta = Some(units);
        self
    }

    pub fn reverting(mut self) -> Self {
        self.revert = true;
        self
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl DestinationChain for FakeDestinationChain {
    fn token_decimals(&self) -> u8 {
        TOKEN_DECIMALS
    }

    async fn fungible_balance(&self, owner: &[u8; 32]) -> BridgeResult<Option<u64>> {
        Ok(self.balances.lock().unwrap().get(owner).copied())
    }

    async fn submit_receive(
        &self,
        message: &[u8],
        attestation: &[u8],
        _signer: &DestinationSigner,
    ) -> BridgeResult<String> {
        self.submissions
            .lock()
            .unwrap()
            .push((message.to_vec(), attestation.to_vec()));

        if !self.revert {
            let burn = BurnMessage::parse(message)?;
            let credit = self.mint_delta.unwrap_or_else(|| burn.amount.as_u64());
            *self
                .balances
                .lock()
                .unwrap()
                .entry(burn.mint_recipient)
                .or_insert(0) += credit;
        }
        Ok(format!("0x{}", "de".repeat(32)))
    }

    async fn wait_for_transaction(&self, _tx_hash: &str) -> BridgeResult<DestinationTxStatus> {
        Ok(DestinationTxStatus {
            success: !self.revert,
            vm_status: if self.revert {
                "Move abort in 0x1::message_transmitter: 0x10".to_string()
            } else {
                "Executed successfully".to_string()
            },
        })
    }
}
