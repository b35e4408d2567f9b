//! Source-chain message events and message layout
//!
//! The token messenger emits `MessageSent(bytes message)` from the message
//! transmitter during `depositForBurn`. The message bytes are the payload the
//! destination chain later verifies against the attestation, so they are
//! carried around untouched. Header and burn body fields are read at fixed
//! big-endian offsets.

use crate::error::{BridgeError, BridgeResult};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Bytes, Log, TransactionReceipt, H256, U256};
use ethers::utils::keccak256;

/// Event topic signatures (keccak256 of event signature)
pub mod topics {
    use ethers::types::H256;
    use ethers::utils::keccak256;
    use lazy_static::lazy_static;

    lazy_static! {
        pub static ref MESSAGE_SENT: H256 = H256::from(keccak256("MessageSent(bytes)"));
    }
}

const HEADER_LEN: usize = 116;
const BURN_BODY_LEN: usize = 132;

/// Message header as laid out by the message transmitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u32,
    pub source_domain: u32,
    pub destination_domain: u32,
    pub nonce: u64,
    pub sender: [u8; 32],
    pub recipient: [u8; 32],
    pub destination_caller: [u8; 32],
}

/// Burn body carried by token messenger messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnMessage {
    pub version: u32,
    pub burn_token: [u8; 32],
    pub mint_recipient: [u8; 32],
    pub amount: U256,
    pub message_sender: [u8; 32],
}

impl MessageHeader {
    /// Parse the fixed-size header at the start of a message
    pub fn parse(message: &[u8]) -> BridgeResult<Self> {
        if message.len() < HEADER_LEN {
            return Err(BridgeError::InvalidMessageFormat(format!(
                "message is {} bytes, header needs {}",
                message.len(),
                HEADER_LEN
            )));
        }

        Ok(Self {
            version: read_u32(message, 0),
            source_domain: read_u32(message, 4),
            destination_domain: read_u32(message, 8),
            nonce: read_u64(message, 12),
            sender: read_bytes32(message, 20),
            recipient: read_bytes32(message, 52),
            destination_caller: read_bytes32(message, 84),
        })
    }
}

impl BurnMessage {
    /// Parse the burn body that follows the header
    pub fn parse(message: &[u8]) -> BridgeResult<Self> {
        let body = message.get(HEADER_LEN..).unwrap_or_default();
        if body.len() < BURN_BODY_LEN {
            return Err(BridgeError::InvalidMessageFormat(format!(
                "burn body is {} bytes, expected at least {}",
                body.len(),
                BURN_BODY_LEN
            )));
        }

        Ok(Self {
            version: read_u32(body, 0),
            burn_token: read_bytes32(body, 4),
            mint_recipient: read_bytes32(body, 36),
            amount: U256::from_big_endian(&body[68..100]),
            message_sender: read_bytes32(body, 100),
        })
    }
}

/// Hash identifying a message at the attestation authority
pub fn message_hash(message: &[u8]) -> H256 {
    H256::from(keccak256(message))
}

/// Find the `MessageSent` payload in a transaction receipt
pub fn extract_message_sent(receipt: &TransactionReceipt) -> BridgeResult<Bytes> {
    receipt
        .logs
        .iter()
        .find(|log| log.topics.first() == Some(&*topics::MESSAGE_SENT))
        .map(decode_message_sent)
        .unwrap_or_else(|| {
            Err(BridgeError::MessageEventNotFound {
                tx_hash: format!("{:?}", receipt.transaction_hash),
            })
        })
}

/// Decode the ABI-encoded `bytes` payload of a `MessageSent` log
pub fn decode_message_sent(log: &Log) -> BridgeResult<Bytes> {
    let tokens = abi::decode(&[ParamType::Bytes], &log.data).map_err(|e| {
        BridgeError::InvalidMessageFormat(format!("undecodable MessageSent data: {}", e))
    })?;

    match tokens.into_iter().next() {
        Some(Token::Bytes(bytes)) if !bytes.is_empty() => Ok(Bytes::from(bytes)),
        _ => Err(BridgeError::InvalidMessageFormat(
            "MessageSent carried an empty message".to_string(),
        )),
    }
}

/// Build a `MessageSent` log, used by tests and fakes
pub fn encode_message_sent(message: &[u8]) -> Log {
    Log {
        topics: vec![*topics::MESSAGE_SENT],
        data: abi::encode(&[Token::Bytes(message.to_vec())]).into(),
        ..Default::default()
    }
}

/// Decode `0x`-prefixed, non-empty hex; `None` for anything else
pub fn decode_prefixed_hex(value: &str) -> Option<Vec<u8>> {
    let digits = value.trim().strip_prefix("0x")?;
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    hex::decode(digits).ok()
}

pub fn encode_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(buf)
}

fn read_bytes32(data: &[u8], offset: usize) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&data[offset..offset + 32]);
    buf
}
