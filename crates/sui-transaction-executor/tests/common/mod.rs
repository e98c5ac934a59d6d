// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-process mock fullnode with an in-memory object store, a simplified
//! execution model (gas charging, coin splits and transfers, input
//! mutation), and controllable latency for deterministic interleaving
//! tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};

use sui_transaction_executor::base_types::{
    ObjectDigest, ObjectID, ObjectRef, Owner, SequenceNumber, SuiAddress, TransactionDigest,
};
use sui_transaction_executor::client::{
    CoinInfo, DryRunResult, ExecuteOptions, ExecuteResponse, NodeApi, ObjectSnapshot,
    SystemStateSummary,
};
use sui_transaction_executor::effects::{
    EffectsObjectChange, ExecutionStatus, IDOperation, ObjectIn, ObjectOut, TransactionEffects,
    TransactionEffectsV2,
};
use sui_transaction_executor::error::{ExecutorError, ExecutorResult};
use sui_transaction_executor::gas::GasCostSummary;
use sui_transaction_executor::signer::{Signature, Signer};
use sui_transaction_executor::transaction::{
    Argument, CallArg, Command, ObjectArg, TransactionData,
};

pub const MOCK_COMPUTATION_COST: u64 = 1_000_000;
pub const MOCK_STORAGE_COST: u64 = 1_000_000;
pub const MOCK_STORAGE_REBATE: u64 = 500_000;

pub fn mock_gas_summary() -> GasCostSummary {
    GasCostSummary::new(
        MOCK_COMPUTATION_COST,
        MOCK_STORAGE_COST,
        MOCK_STORAGE_REBATE,
        0,
    )
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[derive(Clone)]
struct NodeState {
    objects: HashMap<ObjectID, ObjectSnapshot>,
    system_state: SystemStateSummary,
    executed: Vec<TransactionData>,
    waited: Vec<TransactionDigest>,
    system_state_calls: u64,
    coin_queries: u64,
    object_fetches: u64,
}

pub struct MockFullnode {
    state: SyncMutex<NodeState>,
    /// Count of `execute_transaction` calls that have entered the node.
    entered: watch::Sender<u64>,
    /// While held by a test, all executions block after entering.
    gate: Arc<Mutex<()>>,
    /// Per-execution artificial latency, popped in entry order.
    delays: SyncMutex<VecDeque<u64>>,
    /// Execution sequence numbers (1-based) that should fail on-chain.
    fail_marks: SyncMutex<HashSet<u64>>,
}

impl MockFullnode {
    pub fn new() -> Arc<Self> {
        let (entered, _) = watch::channel(0);
        Arc::new(Self {
            state: SyncMutex::new(NodeState {
                objects: HashMap::new(),
                system_state: SystemStateSummary {
                    epoch: 1,
                    reference_gas_price: 1_000,
                    epoch_start_timestamp_ms: now_ms(),
                    epoch_duration_ms: 3_600_000,
                },
                executed: Vec::new(),
                waited: Vec::new(),
                system_state_calls: 0,
                coin_queries: 0,
                object_fetches: 0,
            }),
            entered,
            gate: Arc::new(Mutex::new(())),
            delays: SyncMutex::new(VecDeque::new()),
            fail_marks: SyncMutex::new(HashSet::new()),
        })
    }

    pub fn add_coin(&self, owner: SuiAddress, balance: u64) -> ObjectRef {
        let object_ref = (
            ObjectID::random(),
            SequenceNumber::new(1),
            ObjectDigest::random(),
        );
        self.state.lock().objects.insert(
            object_ref.0,
            ObjectSnapshot {
                object_ref,
                owner: Owner::AddressOwner(owner),
                balance: Some(balance),
            },
        );
        object_ref
    }

    pub fn add_object(&self, owner: SuiAddress) -> ObjectRef {
        let object_ref = (
            ObjectID::random(),
            SequenceNumber::new(1),
            ObjectDigest::random(),
        );
        self.state.lock().objects.insert(
            object_ref.0,
            ObjectSnapshot {
                object_ref,
                owner: Owner::AddressOwner(owner),
                balance: None,
            },
        );
        object_ref
    }

    pub fn object(&self, id: &ObjectID) -> Option<ObjectSnapshot> {
        self.state.lock().objects.get(id).cloned()
    }

    pub fn set_system_state(&self, summary: SystemStateSummary) {
        self.state.lock().system_state = summary;
    }

    pub fn system_state_calls(&self) -> u64 {
        self.state.lock().system_state_calls
    }

    pub fn coin_queries(&self) -> u64 {
        self.state.lock().coin_queries
    }

    /// Number of `multi_get_objects` calls served.
    pub fn object_fetches(&self) -> u64 {
        self.state.lock().object_fetches
    }

    pub fn executed(&self) -> Vec<TransactionData> {
        self.state.lock().executed.clone()
    }

    /// Executed transactions that split coins off the gas payment, i.e.
    /// pool refills.
    pub fn refill_transactions(&self) -> Vec<TransactionData> {
        self.executed()
            .into_iter()
            .filter(|data| {
                data.commands
                    .iter()
                    .any(|command| matches!(command, Command::SplitCoins(Argument::GasCoin, _)))
            })
            .collect()
    }

    pub fn entered_count(&self) -> u64 {
        *self.entered.subscribe().borrow()
    }

    pub async fn wait_for_entered(&self, count: u64) {
        let mut rx = self.entered.subscribe();
        while *rx.borrow_and_update() < count {
            rx.changed().await.unwrap();
        }
    }

    /// Blocks every execution (after it has entered) until the guard drops.
    pub async fn hold_executions(&self) -> OwnedMutexGuard<()> {
        self.gate.clone().lock_owned().await
    }

    pub fn push_delay(&self, millis: u64) {
        self.delays.lock().push_back(millis);
    }

    /// Makes the `seq`-th execution (1-based, in entry order) fail
    /// on-chain. Gas is still charged.
    pub fn fail_execution(&self, seq: u64) {
        self.fail_marks.lock().insert(seq);
    }

    fn simulate(
        state: &mut NodeState,
        data: &TransactionData,
        fail: bool,
    ) -> ExecutorResult<TransactionEffects> {
        let payment_ids: HashSet<ObjectID> =
            data.gas_data.payment.iter().map(|r| r.0).collect();

        // Gas payment and owned inputs must match the node's current
        // versions exactly, like a real validator's lock check.
        for gas_ref in &data.gas_data.payment {
            Self::check_version(state, gas_ref)?;
        }
        let mut owned_inputs = Vec::new();
        for input in &data.inputs {
            if let CallArg::Object(
                ObjectArg::ImmOrOwnedObject(object_ref) | ObjectArg::Receiving(object_ref),
            ) = input
            {
                Self::check_version(state, object_ref)?;
                if !payment_ids.contains(&object_ref.0) {
                    owned_inputs.push(*object_ref);
                }
            }
        }

        let lamport = SequenceNumber::lamport_increment(
            data.gas_data
                .payment
                .iter()
                .map(|r| r.1)
                .chain(owned_inputs.iter().map(|r| r.1)),
        );
        let summary = mock_gas_summary();
        let mut changed: Vec<(ObjectID, EffectsObjectChange)> = Vec::new();

        // Merge all payment coins into the first one.
        let primary = data.gas_data.payment[0];
        let mut gas_balance: u64 = data
            .gas_data
            .payment
            .iter()
            .filter_map(|r| state.objects.get(&r.0).and_then(|o| o.balance))
            .sum();
        for merged in &data.gas_data.payment[1..] {
            let previous = state.objects.remove(&merged.0);
            changed.push((
                merged.0,
                EffectsObjectChange {
                    input_state: input_state_of(previous.as_ref()),
                    output_state: ObjectOut::NotExist,
                    id_operation: IDOperation::Deleted,
                },
            ));
        }

        let mut gas_owner = Owner::AddressOwner(data.gas_data.owner);
        if !fail {
            for object_ref in owned_inputs {
                let previous = state.objects.get(&object_ref.0).cloned();
                let owner = previous
                    .as_ref()
                    .map(|o| o.owner.clone())
                    .unwrap_or(Owner::AddressOwner(data.sender));
                let new_digest = ObjectDigest::random();
                state.objects.insert(
                    object_ref.0,
                    ObjectSnapshot {
                        object_ref: (object_ref.0, lamport, new_digest),
                        owner: owner.clone(),
                        balance: previous.as_ref().and_then(|o| o.balance),
                    },
                );
                changed.push((
                    object_ref.0,
                    EffectsObjectChange {
                        input_state: input_state_of(previous.as_ref()),
                        output_state: ObjectOut::ObjectWrite((new_digest, owner)),
                        id_operation: IDOperation::None,
                    },
                ));
            }

            // Interpret the command list far enough to support coin splits
            // and transfers; everything else is treated as an opaque call
            // that only mutates its inputs.
            let mut split_results: HashMap<(u16, u16), (ObjectID, u64)> = HashMap::new();
            for (index, command) in data.commands.iter().enumerate() {
                match command {
                    Command::SplitCoins(Argument::GasCoin, amounts) => {
                        for (nested, amount_arg) in amounts.iter().enumerate() {
                            let amount = pure_u64(data, amount_arg)?;
                            gas_balance = gas_balance.saturating_sub(amount);
                            split_results.insert(
                                (index as u16, nested as u16),
                                (ObjectID::random(), amount),
                            );
                        }
                    }
                    Command::TransferObjects(objects, recipient_arg) => {
                        let recipient = pure_address(data, recipient_arg)?;
                        for object in objects {
                            match object {
                                Argument::NestedResult(command_index, nested) => {
                                    if let Some((id, amount)) =
                                        split_results.get(&(*command_index, *nested))
                                    {
                                        let digest = ObjectDigest::random();
                                        state.objects.insert(
                                            *id,
                                            ObjectSnapshot {
                                                object_ref: (*id, lamport, digest),
                                                owner: Owner::AddressOwner(recipient),
                                                balance: Some(*amount),
                                            },
                                        );
                                        changed.push((
                                            *id,
                                            EffectsObjectChange {
                                                input_state: ObjectIn::NotExist,
                                                output_state: ObjectOut::ObjectWrite((
                                                    digest,
                                                    Owner::AddressOwner(recipient),
                                                )),
                                                id_operation: IDOperation::Created,
                                            },
                                        ));
                                    }
                                }
                                Argument::GasCoin => {
                                    gas_owner = Owner::AddressOwner(recipient);
                                }
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        // Charge gas on the primary payment coin.
        let net = summary.net_gas_usage().max(0) as u64;
        gas_balance = gas_balance.saturating_sub(net);
        let previous_gas = state.objects.get(&primary.0).cloned();
        let gas_digest = ObjectDigest::random();
        state.objects.insert(
            primary.0,
            ObjectSnapshot {
                object_ref: (primary.0, lamport, gas_digest),
                owner: gas_owner.clone(),
                balance: Some(gas_balance),
            },
        );
        changed.insert(
            0,
            (
                primary.0,
                EffectsObjectChange {
                    input_state: input_state_of(previous_gas.as_ref()),
                    output_state: ObjectOut::ObjectWrite((gas_digest, gas_owner)),
                    id_operation: IDOperation::None,
                },
            ),
        );

        let status = if fail {
            ExecutionStatus::Failure {
                error: "MoveAbort in mock execution".to_string(),
            }
        } else {
            ExecutionStatus::Success
        };
        Ok(TransactionEffects::V2(TransactionEffectsV2 {
            status,
            executed_epoch: state.system_state.epoch,
            gas_used: summary,
            transaction_digest: TransactionDigest::random(),
            lamport_version: lamport,
            changed_objects: changed,
            gas_object_index: Some(0),
        }))
    }

    fn check_version(state: &NodeState, object_ref: &ObjectRef) -> ExecutorResult<()> {
        match state.objects.get(&object_ref.0) {
            Some(snapshot) if snapshot.object_ref == *object_ref => Ok(()),
            Some(snapshot) => Err(ExecutorError::node(format!(
                "object {} not available for consumption, current version {:?}",
                object_ref.0,
                snapshot.version()
            ))),
            None => Err(ExecutorError::node(format!(
                "object {} not found",
                object_ref.0
            ))),
        }
    }
}

fn input_state_of(previous: Option<&ObjectSnapshot>) -> ObjectIn {
    match previous {
        Some(snapshot) => ObjectIn::Exist((
            (snapshot.object_ref.1, snapshot.object_ref.2),
            snapshot.owner.clone(),
        )),
        None => ObjectIn::NotExist,
    }
}

fn pure_u64(data: &TransactionData, arg: &Argument) -> ExecutorResult<u64> {
    let Argument::Input(index) = arg else {
        return Err(ExecutorError::node("expected pure input argument"));
    };
    match data.inputs.get(*index as usize) {
        Some(CallArg::Pure(bytes)) => {
            bcs::from_bytes(bytes).map_err(|e| ExecutorError::node(e.to_string()))
        }
        _ => Err(ExecutorError::node("argument is not a pure input")),
    }
}

fn pure_address(data: &TransactionData, arg: &Argument) -> ExecutorResult<SuiAddress> {
    let Argument::Input(index) = arg else {
        return Err(ExecutorError::node("expected pure input argument"));
    };
    match data.inputs.get(*index as usize) {
        Some(CallArg::Pure(bytes)) => {
            bcs::from_bytes(bytes).map_err(|e| ExecutorError::node(e.to_string()))
        }
        _ => Err(ExecutorError::node("argument is not a pure input")),
    }
}

#[async_trait]
impl NodeApi for MockFullnode {
    async fn get_latest_system_state(&self) -> ExecutorResult<SystemStateSummary> {
        let mut state = self.state.lock();
        state.system_state_calls += 1;
        Ok(state.system_state.clone())
    }

    async fn multi_get_objects(
        &self,
        ids: &[ObjectID],
    ) -> ExecutorResult<Vec<Option<ObjectSnapshot>>> {
        let mut state = self.state.lock();
        state.object_fetches += 1;
        Ok(ids.iter().map(|id| state.objects.get(id).cloned()).collect())
    }

    async fn get_owned_sui_coins(&self, owner: SuiAddress) -> ExecutorResult<Vec<CoinInfo>> {
        let mut state = self.state.lock();
        state.coin_queries += 1;
        Ok(state
            .objects
            .values()
            .filter(|snapshot| snapshot.owner == Owner::AddressOwner(owner))
            .filter_map(|snapshot| {
                snapshot.balance.map(|balance| CoinInfo {
                    object_ref: snapshot.object_ref,
                    balance,
                })
            })
            .collect())
    }

    async fn dry_run_transaction(&self, tx_bytes: &[u8]) -> ExecutorResult<DryRunResult> {
        let data: TransactionData =
            bcs::from_bytes(tx_bytes).map_err(|e| ExecutorError::node(e.to_string()))?;
        let mut scratch = self.state.lock().clone();
        let effects = Self::simulate(&mut scratch, &data, false)?;
        Ok(DryRunResult {
            effects_bcs: bcs::to_bytes(&effects).map_err(|e| ExecutorError::node(e.to_string()))?,
        })
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        _signature: &Signature,
        _options: &ExecuteOptions,
    ) -> ExecutorResult<ExecuteResponse> {
        let data: TransactionData =
            bcs::from_bytes(tx_bytes).map_err(|e| ExecutorError::node(e.to_string()))?;

        let mut seq = 0;
        self.entered.send_modify(|count| {
            *count += 1;
            seq = *count;
        });
        let delay = self.delays.lock().pop_front();
        if let Some(millis) = delay {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        let _gate = self.gate.clone().lock_owned().await;

        let fail = self.fail_marks.lock().remove(&seq);
        let mut state = self.state.lock();
        let effects = Self::simulate(&mut state, &data, fail)?;
        state.executed.push(data);
        Ok(ExecuteResponse {
            digest: effects.transaction_digest(),
            effects_bcs: bcs::to_bytes(&effects).map_err(|e| ExecutorError::node(e.to_string()))?,
        })
    }

    async fn wait_for_transaction(&self, digest: TransactionDigest) -> ExecutorResult<()> {
        self.state.lock().waited.push(digest);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TestSigner {
    address: SuiAddress,
}

impl TestSigner {
    pub fn random() -> Self {
        Self {
            address: SuiAddress::random(),
        }
    }
}

#[async_trait]
impl Signer for TestSigner {
    fn address(&self) -> SuiAddress {
        self.address
    }

    async fn sign_transaction(&self, _tx_bytes: &[u8]) -> ExecutorResult<Signature> {
        Ok(Signature(self.address.to_vec()))
    }
}
