// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Strictly ordered submission for a single signer. Back-to-back
//! transactions reuse the gas coin produced by the previous transaction's
//! effects, trading throughput for never having to fetch or lock multiple
//! coins. Intended for low-frequency signer usage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::base_types::Owner;
use crate::client::{CoinInfo, ExecuteOptions, ExecuteResponse, NodeApi};
use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{CachingTransactionExecutor, GasPriceCache, DEFAULT_GAS_BUDGET};
use crate::gas::balance_after;
use crate::signer::Signer;
use crate::transaction::TransactionBuilder;

/// Custom cache slot holding the reusable gas coin between submissions.
const GAS_COIN_SLOT: &str = "gasCoin";

pub struct SerialTransactionExecutor<S> {
    executor: CachingTransactionExecutor,
    gas_price: GasPriceCache,
    signer: S,
    /// Fair FIFO admission lock: one transaction in flight at a time, the
    /// rest queue in arrival order.
    queue: Mutex<()>,
    default_gas_budget: u64,
}

impl<S: Signer> SerialTransactionExecutor<S> {
    pub fn new(client: Arc<dyn NodeApi>, signer: S) -> Self {
        let gas_price = GasPriceCache::new(client.clone(), Duration::from_millis(1_000));
        Self {
            executor: CachingTransactionExecutor::new(client),
            gas_price,
            signer,
            queue: Mutex::new(()),
            default_gas_budget: DEFAULT_GAS_BUDGET,
        }
    }

    pub fn with_gas_budget(mut self, budget: u64) -> Self {
        self.default_gas_budget = budget;
        self
    }

    pub fn cache(&self) -> &crate::cache::ObjectCache {
        self.executor.cache()
    }

    /// Builds, signs, and submits the draft, after all previously enqueued
    /// submissions have resolved. On failure the cache is reset so the next
    /// task refetches object state and the gas coin from the node.
    pub async fn execute_transaction(
        &self,
        tx: &mut TransactionBuilder,
    ) -> ExecutorResult<ExecuteResponse> {
        let _guard = self.queue.lock().await;
        let result = self.execute_locked(tx).await;
        if result.is_err() {
            self.executor.reset().await;
        }
        result
    }

    async fn execute_locked(&self, tx: &mut TransactionBuilder) -> ExecutorResult<ExecuteResponse> {
        tx.set_sender(self.signer.address());

        let coin = match self.executor.cache().get_custom::<CoinInfo>(GAS_COIN_SLOT).await {
            Some(coin) => {
                debug!(coin = %coin.id(), "reusing gas coin from previous transaction");
                coin
            }
            None => self.select_gas_coin().await?,
        };
        tx.set_gas_payment(vec![coin.object_ref]);
        if tx.gas_price().is_none() {
            tx.set_gas_price(self.gas_price.reference_gas_price().await?);
        }
        if tx.gas_budget().is_none() {
            tx.set_gas_budget(self.default_gas_budget);
        }

        let tx_bytes = self.executor.build_transaction(tx).await?;
        let signature = self.signer.sign_transaction(&tx_bytes).await?;
        let response = self
            .executor
            .execute_transaction(&tx_bytes, &signature, &ExecuteOptions::with_effects())
            .await?;

        let effects = response.effects()?;
        match effects.gas_object_ref() {
            Some((gas_ref, Owner::AddressOwner(owner)))
                if owner == self.signer.address() && !tx.uses_gas_coin_argument() =>
            {
                let next_coin = CoinInfo {
                    object_ref: gas_ref,
                    balance: balance_after(coin.balance, effects.gas_used()),
                };
                self.executor
                    .cache()
                    .set_custom(GAS_COIN_SLOT, &next_coin)
                    .await?;
            }
            // The coin was consumed, merged, or transferred away; force a
            // fresh selection for the next submission.
            _ => {
                debug!(coin = %coin.id(), "gas coin no longer reusable");
                self.executor.cache().delete_custom(GAS_COIN_SLOT).await;
            }
        }
        Ok(response)
    }

    /// First-use coin selection: the largest owned SUI coin.
    async fn select_gas_coin(&self) -> ExecutorResult<CoinInfo> {
        let coins = self
            .executor
            .client()
            .get_owned_sui_coins(self.signer.address())
            .await?;
        coins
            .into_iter()
            .max_by_key(|coin| coin.balance)
            .ok_or(ExecutorError::NoCoinsAvailable)
    }

    pub async fn wait_for_last_transaction(&self) -> ExecutorResult {
        self.executor.wait_for_last_transaction().await
    }

    pub async fn reset(&self) {
        self.executor.reset().await;
    }
}
