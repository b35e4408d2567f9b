//! Transaction submission on both chains
//!
//! The source side approves and burns with locally managed nonces; the
//! destination side submits the receive routine and measures what arrived.

mod gas;
mod nonce;
mod receiver;
mod sender;

pub use gas::GasEstimator;
pub use nonce::{classify_send_error, is_stale_nonce_message, NonceManager};
pub use receiver::DestinationReceiver;
pub use sender::SourceSender;
