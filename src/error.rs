use crate::ledger::{ClientError, ConfirmationState};
use crate::tx_builder::BuildError;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can end a session. None of these cross session boundaries.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("faucet funds never arrived at {address}")]
    FundingTimeout { address: String },

    #[error("no output found at address {address} (index {index}) after {attempts} polls")]
    OutputNotFound {
        address: String,
        index: u64,
        attempts: u32,
    },

    #[error("output {output} at index {index} stuck at {state} after {attempts} polls")]
    OutputNotConfirmed {
        output: String,
        index: u64,
        state: ConfirmationState,
        attempts: u32,
    },

    #[error("{operation} rejected after {attempts} attempts: {reason}")]
    SubmissionRejected {
        operation: &'static str,
        attempts: u32,
        reason: String,
    },

    #[error("node {0} is not synced")]
    NodeNotSynced(String),

    #[error("{available} cannot be split into {count} non-empty outputs")]
    InsufficientFunds { available: u64, count: usize },

    #[error("output set expected {expected} outputs but got {actual}")]
    OutputSetMismatch { expected: usize, actual: usize },

    #[error("session cancelled")]
    Cancelled,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not lock {path:?} after {attempts} attempts")]
    LockAcquisitionFailure { path: PathBuf, attempts: u32 },

    #[error("wallet store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wallet store is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}
