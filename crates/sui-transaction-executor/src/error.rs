// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::base_types::{ObjectID, TransactionDigest};

pub type ExecutorResult<T = ()> = Result<T, ExecutorError>;

/// Errors surfaced by the transaction executors. All of them propagate to
/// the original caller of `execute_transaction`; none are retried
/// internally.
#[derive(Eq, PartialEq, Clone, Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to resolve object {object_id}: {error}")]
    ObjectResolution { object_id: ObjectID, error: String },

    #[error("Transaction {digest:?} failed: {error}")]
    ExecutionFailure {
        digest: Option<TransactionDigest>,
        error: String,
    },

    #[error("No gas coins available and no source coins to refill the pool")]
    NoCoinsAvailable,

    #[error("Invalid transaction: {error}")]
    InvalidTransaction { error: String },

    #[error("Failed to decode transaction effects: {error}")]
    EffectsDecoding { error: String },

    #[error("Failed to sign transaction: {error}")]
    Signature { error: String },

    #[error("Failed to serialize value: {error}")]
    Serialization { error: String },

    #[error("Node error: {error}")]
    Node { error: String },
}

impl ExecutorError {
    pub fn node(error: impl ToString) -> Self {
        Self::Node {
            error: error.to_string(),
        }
    }

    pub fn invalid_transaction(error: impl ToString) -> Self {
        Self::InvalidTransaction {
            error: error.to_string(),
        }
    }
}

impl From<bcs::Error> for ExecutorError {
    fn from(error: bcs::Error) -> Self {
        Self::Serialization {
            error: error.to_string(),
        }
    }
}
