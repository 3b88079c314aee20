//! Error kinds raised while building, validating or repairing a design.

use thiserror::Error;

use crate::trial::MissingStimulus;

pub type DesignResult<T> = Result<T, DesignError>;

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("balance violation in `{grouping}` grouping (min {min}, max {max}): {detail}")]
    BalanceViolation {
        grouping: String,
        min: usize,
        max: usize,
        detail: String,
    },

    #[error("missing-stimulus repair did not converge after {iterations} iterations")]
    RepairExhausted { iterations: usize },

    #[error("{} missing-stimulus record(s) match no trial: {}", .unmatched.len(), format_unmatched(.unmatched))]
    InputMismatch { unmatched: Vec<MissingStimulus> },
}

impl DesignError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

fn format_unmatched(unmatched: &[MissingStimulus]) -> String {
    unmatched
        .iter()
        .map(|m| format!("{}/{}", m.talker, m.sentence))
        .collect::<Vec<_>>()
        .join(", ")
}
