//! Step progress reporting

use crate::types::{StepStatus, TransferProgress, TOTAL_STEPS};

/// Percentage reported when a step starts
const PROCESSING_PERCENT: [u8; TOTAL_STEPS as usize] = [10, 40, 75];
/// Percentage reported when a step completes
const COMPLETED_PERCENT: [u8; TOTAL_STEPS as usize] = [33, 66, 100];

/// Forwards progress to the caller's callback and remembers the current step
pub struct ProgressReporter<F: FnMut(TransferProgress)> {
    callback: F,
    current_step: u8,
}

impl<F: FnMut(TransferProgress)> ProgressReporter<F> {
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            current_step: 1,
        }
    }

    /// Step that is running, or that ran last
    pub fn current_step(&self) -> u8 {
        self.current_step
    }

    pub fn processing(&mut self, step: u8, message: impl Into<String>) {
        self.current_step = step;
        let percentage = percent(&PROCESSING_PERCENT, step);
        self.emit(step, StepStatus::Processing, message.into(), None, percentage);
    }

    pub fn completed(
        &mut self,
        step: u8,
        message: impl Into<String>,
        transaction_hash: Option<String>,
    ) {
        self.current_step = step;
        let percentage = percent(&COMPLETED_PERCENT, step);
        self.emit(step, StepStatus::Completed, message.into(), transaction_hash, percentage);
    }

    /// Report the current step as failed
    pub fn failed(&mut self, message: impl Into<String>, transaction_hash: Option<String>) {
        let step = self.current_step;
        self.emit(step, StepStatus::Failed, message.into(), transaction_hash, None);
    }

    fn emit(
        &mut self,
        step_index: u8,
        status: StepStatus,
        message: String,
        transaction_hash: Option<String>,
        percentage: Option<u8>,
    ) {
        (self.callback)(TransferProgress {
            step_index,
            total_steps: TOTAL_STEPS,
            status,
            message,
            transaction_hash,
            percentage,
        });
    }
}

fn percent(table: &[u8], step: u8) -> Option<u8> {
    usize::from(step)
        .checked_sub(1)
        .and_then(|i| table.get(i))
        .copied()
}
