//! Gas limit buffering for source-chain contract calls

use ethers::types::U256;
use tracing::debug;

/// Gas estimator for transactions
#[derive(Debug, Clone, Copy)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(gas_limit_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
        }
    }

    /// Pad a node's estimate so small state changes between estimate and
    /// inclusion do not run the transaction out of gas
    pub fn buffered_limit(&self, estimate: U256) -> U256 {
        let buffer = estimate
            .checked_mul(U256::from(self.gas_limit_buffer_percent))
            .map(|scaled| scaled / 100)
            .unwrap_or(U256::MAX);
        let limit = estimate.saturating_add(buffer);
        debug!("Gas estimate {} buffered to {}", estimate, limit);
        limit
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(20)
    }
}
