// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Client-side cache of last-known object state, keyed by object id. A miss
//! is not an error; callers fall back to a batched remote fetch. All
//! mutation is serialized behind a single async lock, so concurrent effect
//! applications never interleave.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::base_types::ObjectID;
use crate::client::ObjectSnapshot;
use crate::effects::TransactionEffects;
use crate::error::ExecutorResult;

#[derive(Default)]
struct CacheState {
    objects: HashMap<ObjectID, ObjectSnapshot>,
    /// Auxiliary slots for executor bookkeeping (e.g. the serial executor's
    /// reusable gas coin), stored as BCS bytes.
    custom: HashMap<String, Vec<u8>>,
}

pub struct ObjectCache {
    state: Mutex<CacheState>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
        }
    }

    pub async fn get_object(&self, id: &ObjectID) -> Option<ObjectSnapshot> {
        self.state.lock().await.objects.get(id).cloned()
    }

    /// Batched lookup, same length and order as `ids`.
    pub async fn get_objects(&self, ids: &[ObjectID]) -> Vec<Option<ObjectSnapshot>> {
        let state = self.state.lock().await;
        ids.iter().map(|id| state.objects.get(id).cloned()).collect()
    }

    /// Records fetched snapshots. A fetch can race a concurrent commit, so
    /// a snapshot never overwrites a cached entry at an equal or newer
    /// version.
    pub async fn insert_objects(&self, objects: impl IntoIterator<Item = ObjectSnapshot>) {
        let mut state = self.state.lock().await;
        for object in objects {
            if let Some(existing) = state.objects.get(&object.id()) {
                if existing.version() >= object.version() {
                    continue;
                }
            }
            state.objects.insert(object.id(), object);
        }
    }

    /// Records the post-transaction state of every changed object: written
    /// objects get their new version and digest, removed objects are
    /// evicted. Idempotent, and monotonic in the lamport version: effects
    /// older than a cached entry never regress it.
    pub async fn apply_effects(&self, effects: &TransactionEffects) {
        let lamport = effects.lamport_version();
        let mut state = self.state.lock().await;
        for (object_ref, owner) in effects.written_refs() {
            let id = object_ref.0;
            if let Some(existing) = state.objects.get(&id) {
                if existing.version() >= lamport {
                    continue;
                }
            }
            let balance = state.objects.get(&id).and_then(|o| o.balance);
            state.objects.insert(
                id,
                ObjectSnapshot {
                    object_ref,
                    owner,
                    balance,
                },
            );
        }
        for id in effects.removed_ids() {
            if let Some(existing) = state.objects.get(&id) {
                if existing.version() >= lamport {
                    continue;
                }
            }
            state.objects.remove(&id);
        }
        debug!(
            digest = ?effects.transaction_digest(),
            version = lamport.value(),
            "applied effects to object cache"
        );
    }

    /// Explicit invalidation, used after an execution failure so the next
    /// resolution refetches from the node.
    pub async fn delete_objects(&self, ids: &[ObjectID]) {
        let mut state = self.state.lock().await;
        for id in ids {
            state.objects.remove(id);
        }
    }

    pub async fn set_custom<T: Serialize>(&self, key: &str, value: &T) -> ExecutorResult {
        let bytes = bcs::to_bytes(value)?;
        self.state.lock().await.custom.insert(key.to_string(), bytes);
        Ok(())
    }

    pub async fn get_custom<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.state.lock().await;
        let bytes = state.custom.get(key)?;
        bcs::from_bytes(bytes).ok()
    }

    pub async fn delete_custom(&self, key: &str) {
        self.state.lock().await.custom.remove(key);
    }

    /// Clears everything, forcing clean resolution on the next transaction.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.objects.clear();
        state.custom.clear();
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new()
    }
}
