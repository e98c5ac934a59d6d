// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const OBJECT_ID_LENGTH: usize = 32;
pub const ADDRESS_LENGTH: usize = 32;
pub const DIGEST_LENGTH: usize = 32;

pub type EpochId = u64;

/// Identifier of an on-chain object, stable across versions.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Serialize, Deserialize)]
pub struct ObjectID([u8; OBJECT_ID_LENGTH]);

impl ObjectID {
    pub const ZERO: Self = Self([0u8; OBJECT_ID_LENGTH]);

    pub const fn new(bytes: [u8; OBJECT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for ObjectID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectID(0x{})", hex::encode(&self.0[..8]))
    }
}

/// Version of an object. Every transaction that writes an object assigns it a
/// version strictly greater than the versions of all of the transaction's
/// inputs (lamport timestamping).
#[derive(
    Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Default, Debug, Serialize, Deserialize,
)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub const MIN: Self = Self(u64::MIN);
    pub const MAX: Self = Self(0x7fff_ffff_ffff_ffff);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        debug_assert_ne!(self.0, u64::MAX);
        Self(self.0 + 1)
    }

    /// The smallest version strictly greater than every input version.
    pub fn lamport_increment(inputs: impl IntoIterator<Item = SequenceNumber>) -> Self {
        let max_input = inputs.into_iter().max().unwrap_or_default();
        max_input.next()
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Serialize, Deserialize)]
pub struct ObjectDigest([u8; DIGEST_LENGTH]);

impl ObjectDigest {
    pub const fn new(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }
}

impl fmt::Debug for ObjectDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o#{}", hex::encode(&self.0[..8]))
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Serialize, Deserialize)]
pub struct TransactionDigest([u8; DIGEST_LENGTH]);

impl TransactionDigest {
    pub const fn new(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }
}

impl fmt::Debug for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t#{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Default, Serialize, Deserialize)]
pub struct SuiAddress([u8; ADDRESS_LENGTH]);

impl SuiAddress {
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

/// Reference to an exact historical state of an object.
pub type ObjectRef = (ObjectID, SequenceNumber, ObjectDigest);

pub fn random_object_ref() -> ObjectRef {
    (
        ObjectID::random(),
        SequenceNumber::new(1),
        ObjectDigest::random(),
    )
}

pub type VersionDigest = (SequenceNumber, ObjectDigest);

/// Who an object belongs to, as reported by the node and by effects.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Debug, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// Owned by a single address, usable as a transaction input by that address only.
    AddressOwner(SuiAddress),
    /// Owned by another object (dynamic fields).
    ObjectOwner(SuiAddress),
    /// Accessible by everyone; the network serializes access itself.
    Shared {
        /// The version at which the object most recently became shared.
        initial_shared_version: SequenceNumber,
    },
    Immutable,
}

impl Owner {
    pub fn is_shared(&self) -> bool {
        matches!(self, Owner::Shared { .. })
    }

    pub fn is_address_owned(&self) -> bool {
        matches!(self, Owner::AddressOwner(_))
    }
}
