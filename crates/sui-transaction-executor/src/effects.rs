// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The node's authoritative record of what a transaction changed, consumed
//! read-only by the object cache. Wire format is BCS with a version tag.

use serde::{Deserialize, Serialize};

use crate::base_types::{
    EpochId, ObjectDigest, ObjectID, ObjectRef, Owner, SequenceNumber, TransactionDigest,
    VersionDigest,
};
use crate::gas::GasCostSummary;

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Failure { error: String },
}

impl ExecutionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }
}

/// Whether this object ID was created or deleted by the transaction, as
/// opposed to mutated in place.
#[derive(Eq, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum IDOperation {
    None,
    Created,
    Deleted,
}

/// State of an object in the store prior to the transaction. Objects that
/// did not exist at root level (e.g. wrapped objects) are `NotExist`.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum ObjectIn {
    NotExist,
    /// The old version, digest and owner.
    Exist((VersionDigest, Owner)),
}

/// State of an object in the store after the transaction. Every written
/// object carries the transaction's lamport version, so only the digest and
/// owner appear here.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum ObjectOut {
    NotExist,
    ObjectWrite((ObjectDigest, Owner)),
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct EffectsObjectChange {
    /// State of the object in the store prior to this transaction.
    pub input_state: ObjectIn,
    /// State of the object in the store after this transaction.
    pub output_state: ObjectOut,
    /// Whether this object ID is created or deleted in this transaction.
    pub id_operation: IDOperation,
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct TransactionEffectsV2 {
    pub status: ExecutionStatus,
    pub executed_epoch: EpochId,
    pub gas_used: GasCostSummary,
    pub transaction_digest: TransactionDigest,
    /// The version assigned to all objects written by this transaction.
    pub lamport_version: SequenceNumber,
    /// Objects whose state is changed by this transaction.
    pub changed_objects: Vec<(ObjectID, EffectsObjectChange)>,
    /// Index of the gas object in `changed_objects`. None for system
    /// transactions that have no gas payment.
    pub gas_object_index: Option<u32>,
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum TransactionEffects {
    V2(TransactionEffectsV2),
}

impl TransactionEffects {
    pub fn status(&self) -> &ExecutionStatus {
        match self {
            Self::V2(e) => &e.status,
        }
    }

    pub fn executed_epoch(&self) -> EpochId {
        match self {
            Self::V2(e) => e.executed_epoch,
        }
    }

    pub fn gas_used(&self) -> &GasCostSummary {
        match self {
            Self::V2(e) => &e.gas_used,
        }
    }

    pub fn transaction_digest(&self) -> TransactionDigest {
        match self {
            Self::V2(e) => e.transaction_digest,
        }
    }

    pub fn lamport_version(&self) -> SequenceNumber {
        match self {
            Self::V2(e) => e.lamport_version,
        }
    }

    pub fn changed_objects(&self) -> &[(ObjectID, EffectsObjectChange)] {
        match self {
            Self::V2(e) => &e.changed_objects,
        }
    }

    /// The post-execution reference and owner of the gas payment object.
    pub fn gas_object_ref(&self) -> Option<(ObjectRef, Owner)> {
        let Self::V2(e) = self;
        let index = e.gas_object_index? as usize;
        let (id, change) = e.changed_objects.get(index)?;
        match &change.output_state {
            ObjectOut::ObjectWrite((digest, owner)) => {
                Some(((*id, e.lamport_version, *digest), owner.clone()))
            }
            ObjectOut::NotExist => None,
        }
    }

    /// References of all objects that exist after this transaction, at their
    /// new version.
    pub fn written_refs(&self) -> impl Iterator<Item = (ObjectRef, Owner)> + '_ {
        let Self::V2(e) = self;
        e.changed_objects
            .iter()
            .filter_map(move |(id, change)| match &change.output_state {
                ObjectOut::ObjectWrite((digest, owner)) => {
                    Some(((*id, e.lamport_version, *digest), owner.clone()))
                }
                ObjectOut::NotExist => None,
            })
    }

    /// Ids of objects that no longer exist after this transaction (deleted
    /// or wrapped).
    pub fn removed_ids(&self) -> impl Iterator<Item = ObjectID> + '_ {
        let Self::V2(e) = self;
        e.changed_objects
            .iter()
            .filter(|(_, change)| matches!(change.output_state, ObjectOut::NotExist))
            .map(|(id, _)| *id)
    }

    /// References of objects created by this transaction, excluding the gas
    /// object. Used by the coin pool to collect freshly minted coins.
    pub fn created_refs_excluding_gas(&self) -> Vec<ObjectRef> {
        let gas_id = self.gas_object_ref().map(|(r, _)| r.0);
        let Self::V2(e) = self;
        e.changed_objects
            .iter()
            .filter(|(id, change)| {
                change.id_operation == IDOperation::Created && Some(id) != gas_id.as_ref()
            })
            .filter_map(|(id, change)| match &change.output_state {
                ObjectOut::ObjectWrite((digest, _)) => Some((*id, e.lamport_version, *digest)),
                ObjectOut::NotExist => None,
            })
            .collect()
    }
}
