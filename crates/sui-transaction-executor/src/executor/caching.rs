// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The single choke point through which every transaction is built and
//! executed. Enriches the stateless draft builder with cache-aware object
//! resolution, and keeps the cache in sync with execution effects.

use std::sync::Arc;

use tap::TapFallible;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::base_types::{ObjectID, Owner, TransactionDigest};
use crate::cache::ObjectCache;
use crate::client::{ExecuteOptions, ExecuteResponse, NodeApi, ObjectSnapshot};
use crate::error::{ExecutorError, ExecutorResult};
use crate::signer::Signature;
use crate::transaction::{ObjectArg, TransactionBuilder};

pub struct CachingTransactionExecutor {
    client: Arc<dyn NodeApi>,
    cache: ObjectCache,
    /// Digest of the most recently submitted transaction, kept so callers
    /// can synchronize with in-flight work before reading cache state.
    last_digest: Mutex<Option<TransactionDigest>>,
}

impl CachingTransactionExecutor {
    pub fn new(client: Arc<dyn NodeApi>) -> Self {
        Self {
            client,
            cache: ObjectCache::new(),
            last_digest: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<dyn NodeApi> {
        &self.client
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Resolves all unresolved object inputs in the draft: cached entries
    /// are used as-is, misses are fetched from the node in one batch and
    /// recorded in the cache.
    pub async fn resolve_transaction(&self, tx: &mut TransactionBuilder) -> ExecutorResult {
        let unresolved = tx.unresolved_input_ids();
        if unresolved.is_empty() {
            return Ok(());
        }

        let cached = self.cache.get_objects(&unresolved).await;
        let misses: Vec<ObjectID> = unresolved
            .iter()
            .zip(&cached)
            .filter(|(_, cached)| cached.is_none())
            .map(|(id, _)| *id)
            .collect();

        if !misses.is_empty() {
            debug!(count = misses.len(), "fetching unresolved objects");
            let fetched = self
                .client
                .multi_get_objects(&misses)
                .await
                .tap_err(|err| warn!("object fetch failed: {err}"))?;
            let mut found = Vec::with_capacity(fetched.len());
            for (id, snapshot) in misses.iter().zip(fetched) {
                match snapshot {
                    Some(snapshot) => found.push(snapshot),
                    None => {
                        return Err(ExecutorError::ObjectResolution {
                            object_id: *id,
                            error: "object does not exist or was deleted".to_string(),
                        })
                    }
                }
            }
            self.cache.insert_objects(found).await;
        }

        for id in unresolved {
            let snapshot = self.cache.get_object(&id).await.ok_or_else(|| {
                ExecutorError::ObjectResolution {
                    object_id: id,
                    error: "object missing from cache after fetch".to_string(),
                }
            })?;
            let arg = object_arg_for(&snapshot);
            tx.resolve_input(id, arg);
        }
        Ok(())
    }

    /// Resolves and serializes the draft to signable wire bytes.
    pub async fn build_transaction(&self, tx: &mut TransactionBuilder) -> ExecutorResult<Vec<u8>> {
        self.resolve_transaction(tx).await?;
        tx.build()
    }

    /// Submits signed bytes. On success the returned effects are applied to
    /// the cache, so it reflects the exact post-transaction state of every
    /// object touched. On failure the cache is left untouched; callers must
    /// invalidate conflicting ids themselves before retrying.
    pub async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signature: &Signature,
        options: &ExecuteOptions,
    ) -> ExecutorResult<ExecuteResponse> {
        let response = self
            .client
            .execute_transaction(tx_bytes, signature, options)
            .await?;
        *self.last_digest.lock().await = Some(response.digest);

        let effects = response.effects()?;
        if effects.status().is_ok() {
            self.cache.apply_effects(&effects).await;
            Ok(response)
        } else {
            let error = match effects.status() {
                crate::effects::ExecutionStatus::Failure { error } => error.clone(),
                crate::effects::ExecutionStatus::Success => unreachable!(),
            };
            warn!(digest = ?response.digest, %error, "transaction execution failed");
            Err(ExecutorError::ExecutionFailure {
                digest: Some(response.digest),
                error,
            })
        }
    }

    pub async fn apply_effects(&self, effects: &crate::effects::TransactionEffects) {
        self.cache.apply_effects(effects).await;
    }

    pub async fn delete_objects(&self, ids: &[ObjectID]) {
        self.cache.delete_objects(ids).await;
    }

    /// Waits until the most recently submitted transaction is finalized on
    /// the node, so subsequent reads observe its writes.
    pub async fn wait_for_last_transaction(&self) -> ExecutorResult {
        let digest = *self.last_digest.lock().await;
        if let Some(digest) = digest {
            self.client.wait_for_transaction(digest).await?;
        }
        Ok(())
    }

    /// Clears the entire cache; used after unrecoverable errors to force a
    /// clean resolution on the next transaction.
    pub async fn reset(&self) {
        self.cache.reset().await;
        *self.last_digest.lock().await = None;
    }
}

fn object_arg_for(snapshot: &ObjectSnapshot) -> ObjectArg {
    match &snapshot.owner {
        Owner::Shared {
            initial_shared_version,
        } => ObjectArg::SharedObject {
            id: snapshot.id(),
            initial_shared_version: *initial_shared_version,
            mutable: true,
        },
        _ => ObjectArg::ImmOrOwnedObject(snapshot.object_ref),
    }
}
