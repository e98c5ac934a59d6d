// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The seam between the executors and a remote fullnode. Transport details
//! (JSON-RPC vs GraphQL) live behind [`NodeApi`]; the executors depend only
//! on these method contracts.

use async_trait::async_trait;

use crate::base_types::{EpochId, ObjectID, ObjectRef, Owner, SuiAddress, TransactionDigest};
use crate::effects::TransactionEffects;
use crate::error::{ExecutorError, ExecutorResult};
use crate::signer::Signature;

/// The slice of `getLatestSuiSystemState` the executors consume.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct SystemStateSummary {
    pub epoch: EpochId,
    pub reference_gas_price: u64,
    pub epoch_start_timestamp_ms: u64,
    pub epoch_duration_ms: u64,
}

/// Last known state of an object, as fetched from the node or recorded from
/// effects. `balance` is populated only for coin objects.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct ObjectSnapshot {
    pub object_ref: ObjectRef,
    pub owner: Owner,
    pub balance: Option<u64>,
}

impl ObjectSnapshot {
    pub fn id(&self) -> ObjectID {
        self.object_ref.0
    }

    pub fn version(&self) -> crate::base_types::SequenceNumber {
        self.object_ref.1
    }
}

/// A SUI coin candidate for gas payment.
#[derive(Eq, PartialEq, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CoinInfo {
    pub object_ref: ObjectRef,
    pub balance: u64,
}

impl CoinInfo {
    pub fn id(&self) -> ObjectID {
        self.object_ref.0
    }
}

#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct ExecuteOptions {
    pub show_effects: bool,
    pub wait_for_local_execution: bool,
}

impl ExecuteOptions {
    pub fn with_effects() -> Self {
        Self {
            show_effects: true,
            wait_for_local_execution: false,
        }
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct ExecuteResponse {
    pub digest: TransactionDigest,
    /// BCS-encoded [`TransactionEffects`].
    pub effects_bcs: Vec<u8>,
}

impl ExecuteResponse {
    pub fn effects(&self) -> ExecutorResult<TransactionEffects> {
        bcs::from_bytes(&self.effects_bcs).map_err(|e| ExecutorError::EffectsDecoding {
            error: e.to_string(),
        })
    }
}

/// Result of a non-committing simulated execution.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct DryRunResult {
    /// BCS-encoded [`TransactionEffects`] the transaction would produce.
    pub effects_bcs: Vec<u8>,
}

impl DryRunResult {
    pub fn effects(&self) -> ExecutorResult<TransactionEffects> {
        bcs::from_bytes(&self.effects_bcs).map_err(|e| ExecutorError::EffectsDecoding {
            error: e.to_string(),
        })
    }
}

/// Fullnode method contracts required by the executors. Implementations are
/// expected to be cheap to clone behind an `Arc` and safe to call
/// concurrently.
#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn get_latest_system_state(&self) -> ExecutorResult<SystemStateSummary>;

    /// Batched object fetch. The result has the same length and order as
    /// `ids`; unknown or deleted objects are `None`.
    async fn multi_get_objects(
        &self,
        ids: &[ObjectID],
    ) -> ExecutorResult<Vec<Option<ObjectSnapshot>>>;

    async fn get_owned_sui_coins(&self, owner: SuiAddress) -> ExecutorResult<Vec<CoinInfo>>;

    async fn dry_run_transaction(&self, tx_bytes: &[u8]) -> ExecutorResult<DryRunResult>;

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signature: &Signature,
        options: &ExecuteOptions,
    ) -> ExecutorResult<ExecuteResponse>;

    /// Resolves once the node has checkpointed the transaction and its
    /// effects are reflected in reads.
    async fn wait_for_transaction(&self, digest: TransactionDigest) -> ExecutorResult<()>;
}
