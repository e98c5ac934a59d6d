// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A mutable transaction draft and its BCS wire form. The executors enrich
//! drafts with resolved object references and gas data before serializing.

use serde::{Deserialize, Serialize};

use crate::base_types::{EpochId, ObjectID, ObjectRef, SequenceNumber, SuiAddress};
use crate::error::{ExecutorError, ExecutorResult};

#[derive(Eq, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum ObjectArg {
    /// A Move object, either immutable or owned by the sender, pinned to an
    /// exact version.
    ImmOrOwnedObject(ObjectRef),
    SharedObject {
        id: ObjectID,
        initial_shared_version: SequenceNumber,
        mutable: bool,
    },
    /// An object sent to the sender but not yet claimed. Not shared, so it
    /// participates in conflict tracking like an owned object.
    Receiving(ObjectRef),
}

impl ObjectArg {
    pub fn id(&self) -> ObjectID {
        match self {
            ObjectArg::ImmOrOwnedObject((id, _, _)) | ObjectArg::Receiving((id, _, _)) => *id,
            ObjectArg::SharedObject { id, .. } => *id,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ObjectArg::SharedObject { .. })
    }
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum CallArg {
    Pure(Vec<u8>),
    Object(ObjectArg),
    /// An object input known only by id. Must be resolved to an
    /// [`ObjectArg`] before the transaction can be serialized.
    UnresolvedObject(ObjectID),
}

/// A reference to a value produced earlier in the transaction.
#[derive(Eq, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum Argument {
    /// The gas coin, usable by-reference (or by value in `TransferObjects`).
    GasCoin,
    /// An input in the `inputs` list.
    Input(u16),
    /// The result of another command.
    Result(u16),
    /// A value nested within the result of another command.
    NestedResult(u16, u16),
}

/// Commands are carried opaquely through BCS; the executors never interpret
/// them beyond their argument references.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum Command {
    MoveCall {
        package: ObjectID,
        module: String,
        function: String,
        arguments: Vec<Argument>,
    },
    TransferObjects(Vec<Argument>, Argument),
    SplitCoins(Argument, Vec<Argument>),
    MergeCoins(Argument, Vec<Argument>),
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct GasData {
    pub payment: Vec<ObjectRef>,
    pub owner: SuiAddress,
    pub price: u64,
    pub budget: u64,
}

#[derive(Eq, PartialEq, Clone, Debug, Default, Serialize, Deserialize)]
pub enum TransactionExpiration {
    #[default]
    None,
    /// Validators refuse to sign past the end of the given epoch.
    Epoch(EpochId),
}

/// The signable wire form of a transaction.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct TransactionData {
    pub sender: SuiAddress,
    pub gas_data: GasData,
    pub inputs: Vec<CallArg>,
    pub commands: Vec<Command>,
    pub expiration: TransactionExpiration,
}

/// Mutable transaction draft. Object inputs may start unresolved (id only);
/// the caching executor fills in exact references before `build`.
#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct TransactionBuilder {
    inputs: Vec<CallArg>,
    commands: Vec<Command>,
    sender: Option<SuiAddress>,
    gas_payment: Vec<ObjectRef>,
    gas_owner: Option<SuiAddress>,
    gas_price: Option<u64>,
    gas_budget: Option<u64>,
    expiration: TransactionExpiration,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a BCS-serialized pure value input.
    pub fn pure<T: Serialize>(&mut self, value: &T) -> ExecutorResult<Argument> {
        let bytes = bcs::to_bytes(value)?;
        Ok(self.push_input(CallArg::Pure(bytes)))
    }

    /// Adds a fully resolved object input.
    pub fn obj(&mut self, arg: ObjectArg) -> Argument {
        self.push_input(CallArg::Object(arg))
    }

    /// Adds an object input by id, to be resolved against the cache or the
    /// node before building.
    pub fn unresolved_object(&mut self, id: ObjectID) -> Argument {
        self.push_input(CallArg::UnresolvedObject(id))
    }

    fn push_input(&mut self, arg: CallArg) -> Argument {
        let index = self.inputs.len() as u16;
        self.inputs.push(arg);
        Argument::Input(index)
    }

    /// Appends a command, returning the argument that refers to its result.
    pub fn command(&mut self, command: Command) -> Argument {
        let index = self.commands.len() as u16;
        self.commands.push(command);
        Argument::Result(index)
    }

    /// Splits `amounts` off `coin`, yielding one nested result per amount.
    pub fn split_coins(
        &mut self,
        coin: Argument,
        amounts: Vec<u64>,
    ) -> ExecutorResult<Vec<Argument>> {
        let amount_args = amounts
            .iter()
            .map(|amount| self.pure(amount))
            .collect::<ExecutorResult<Vec<_>>>()?;
        let count = amounts.len() as u16;
        let result = self.command(Command::SplitCoins(coin, amount_args));
        let Argument::Result(index) = result else {
            unreachable!()
        };
        Ok((0..count)
            .map(|i| Argument::NestedResult(index, i))
            .collect())
    }

    pub fn transfer_objects(&mut self, objects: Vec<Argument>, recipient: SuiAddress) {
        let recipient = self
            .pure(&recipient)
            .expect("address serialization cannot fail");
        self.command(Command::TransferObjects(objects, recipient));
    }

    pub fn set_sender(&mut self, sender: SuiAddress) {
        self.sender = Some(sender);
    }

    pub fn sender(&self) -> Option<SuiAddress> {
        self.sender
    }

    pub fn set_gas_payment(&mut self, payment: Vec<ObjectRef>) {
        self.gas_payment = payment;
    }

    pub fn gas_payment(&self) -> &[ObjectRef] {
        &self.gas_payment
    }

    pub fn set_gas_owner(&mut self, owner: SuiAddress) {
        self.gas_owner = Some(owner);
    }

    pub fn set_gas_price(&mut self, price: u64) {
        self.gas_price = Some(price);
    }

    pub fn gas_price(&self) -> Option<u64> {
        self.gas_price
    }

    pub fn set_gas_budget(&mut self, budget: u64) {
        self.gas_budget = Some(budget);
    }

    pub fn gas_budget(&self) -> Option<u64> {
        self.gas_budget
    }

    pub fn set_expiration(&mut self, expiration: TransactionExpiration) {
        self.expiration = expiration;
    }

    /// Ids of object inputs still waiting for resolution, deduplicated in
    /// first-appearance order.
    pub fn unresolved_input_ids(&self) -> Vec<ObjectID> {
        let mut seen = Vec::new();
        for input in &self.inputs {
            if let CallArg::UnresolvedObject(id) = input {
                if !seen.contains(id) {
                    seen.push(*id);
                }
            }
        }
        seen
    }

    /// Replaces every unresolved occurrence of `id` with the given argument.
    pub fn resolve_input(&mut self, id: ObjectID, arg: ObjectArg) {
        for input in &mut self.inputs {
            if matches!(input, CallArg::UnresolvedObject(i) if *i == id) {
                *input = CallArg::Object(arg);
            }
        }
    }

    pub fn is_fully_resolved(&self) -> bool {
        !self
            .inputs
            .iter()
            .any(|input| matches!(input, CallArg::UnresolvedObject(_)))
    }

    /// Owned-object ids this transaction will touch: explicit owned inputs
    /// and receiving objects. Shared objects are excluded; the network
    /// serializes access to those itself. Requires a fully resolved draft.
    pub fn owned_input_ids(&self) -> Vec<ObjectID> {
        let mut ids = Vec::new();
        for input in &self.inputs {
            let id = match input {
                CallArg::Object(ObjectArg::ImmOrOwnedObject((id, _, _)))
                | CallArg::Object(ObjectArg::Receiving((id, _, _))) => *id,
                _ => continue,
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Whether any command takes the gas coin itself as an argument (e.g.
    /// transferring it away or splitting it directly). Such a coin may be
    /// spent or merged and cannot be reused for gas afterwards.
    pub fn uses_gas_coin_argument(&self) -> bool {
        fn args(command: &Command) -> Vec<&Argument> {
            match command {
                Command::MoveCall { arguments, .. } => arguments.iter().collect(),
                Command::TransferObjects(objects, recipient) => {
                    objects.iter().chain([recipient]).collect()
                }
                Command::SplitCoins(coin, amounts) => amounts.iter().chain([coin]).collect(),
                Command::MergeCoins(target, coins) => coins.iter().chain([target]).collect(),
            }
        }
        self.commands
            .iter()
            .flat_map(args)
            .any(|arg| matches!(arg, Argument::GasCoin))
    }

    /// Whether the object is referenced as an explicit input.
    pub fn references_object(&self, id: ObjectID) -> bool {
        self.inputs.iter().any(|input| match input {
            CallArg::Object(arg) => arg.id() == id,
            CallArg::UnresolvedObject(unresolved) => *unresolved == id,
            CallArg::Pure(_) => false,
        })
    }

    /// Assembles the wire form. Malformed drafts (missing sender, gas data,
    /// or unresolved inputs) are rejected here, before any network call.
    pub fn transaction_data(&self) -> ExecutorResult<TransactionData> {
        let sender = self
            .sender
            .ok_or_else(|| ExecutorError::invalid_transaction("missing sender"))?;
        if !self.is_fully_resolved() {
            return Err(ExecutorError::invalid_transaction(format!(
                "unresolved object inputs: {:?}",
                self.unresolved_input_ids()
            )));
        }
        if self.gas_payment.is_empty() {
            return Err(ExecutorError::invalid_transaction("missing gas payment"));
        }
        let price = self
            .gas_price
            .ok_or_else(|| ExecutorError::invalid_transaction("missing gas price"))?;
        let budget = self
            .gas_budget
            .ok_or_else(|| ExecutorError::invalid_transaction("missing gas budget"))?;
        Ok(TransactionData {
            sender,
            gas_data: GasData {
                payment: self.gas_payment.clone(),
                owner: self.gas_owner.unwrap_or(sender),
                price,
                budget,
            },
            inputs: self.inputs.clone(),
            commands: self.commands.clone(),
            expiration: self.expiration.clone(),
        })
    }

    /// BCS bytes of the wire form, ready for signing.
    pub fn build(&self) -> ExecutorResult<Vec<u8>> {
        Ok(bcs::to_bytes(&self.transaction_data()?)?)
    }
}
