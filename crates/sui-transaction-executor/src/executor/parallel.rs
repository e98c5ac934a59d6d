// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Concurrent submission for a single signer without gas-object or
//! owned-object collisions. A fixed-size pool of gas coins bounds the number
//! of in-flight transactions, and per-object FIFO queues keep two
//! transactions from touching the same owned object at the same time.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{oneshot, watch, Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::base_types::{ObjectID, ObjectRef};
use crate::client::{CoinInfo, ExecuteOptions, ExecuteResponse, NodeApi};
use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{CachingTransactionExecutor, GasPriceCache, DEFAULT_GAS_BUDGET};
use crate::gas::balance_after;
use crate::signer::Signer;
use crate::transaction::{Argument, TransactionBuilder};

#[derive(Clone, Debug)]
pub struct ParallelExecutorOptions {
    /// Number of gas coins minted per pool-refill transaction.
    pub coin_batch_size: usize,
    /// Balance assigned to each newly minted pool coin.
    pub initial_coin_balance: u64,
    /// A returned coin below this balance is queued for consolidation
    /// instead of reuse.
    pub minimum_coin_balance: u64,
    /// Upper bound on coins in circulation, and therefore on concurrent
    /// in-flight transactions.
    pub max_pool_size: usize,
    /// Safety margin around epoch transitions during which gas-price
    /// lookups pause and refresh.
    pub epoch_boundary_window: Duration,
    /// Budget applied to transactions that don't specify their own.
    pub default_gas_budget: u64,
    /// Explicit coins funding the initial pool. Defaults to discovering all
    /// SUI coins owned by the signer.
    pub source_coins: Option<Vec<ObjectID>>,
}

impl Default for ParallelExecutorOptions {
    fn default() -> Self {
        Self {
            coin_batch_size: 20,
            initial_coin_balance: 200_000_000,
            minimum_coin_balance: 50_000_000,
            max_pool_size: 50,
            epoch_boundary_window: Duration::from_millis(1_000),
            default_gas_budget: DEFAULT_GAS_BUDGET,
            source_coins: None,
        }
    }
}

/// Per-object wait queues. An id present in the map is locked; its queue
/// holds the transactions waiting for it, in arrival order. Registration of
/// a whole id set is atomic, so the wait-for graph follows arrival order
/// and cannot form cycles.
struct ObjectLocks {
    queues: SyncMutex<HashMap<ObjectID, VecDeque<oneshot::Sender<()>>>>,
}

impl ObjectLocks {
    fn new() -> Self {
        Self {
            queues: SyncMutex::new(HashMap::new()),
        }
    }

    /// Locks every free id immediately and enqueues behind the rest.
    /// Returns the handoffs to await before all ids are held.
    fn register(&self, ids: &[ObjectID]) -> Vec<oneshot::Receiver<()>> {
        let mut queues = self.queues.lock();
        let mut pending = Vec::new();
        for id in ids {
            match queues.entry(*id) {
                Entry::Occupied(mut entry) => {
                    let (tx, rx) = oneshot::channel();
                    entry.get_mut().push_back(tx);
                    pending.push(rx);
                }
                Entry::Vacant(entry) => {
                    entry.insert(VecDeque::new());
                }
            }
        }
        pending
    }

    async fn acquire(&self, ids: &[ObjectID]) {
        let pending = self.register(ids);
        if !pending.is_empty() {
            debug!(conflicts = pending.len(), "transaction queued on busy objects");
        }
        // A dropped sender means the lock holder released through `release`,
        // which only drops senders whose receiver is gone.
        let _ = futures::future::join_all(pending).await;
    }

    /// Hands each id to its next waiter, or unlocks it if nobody waits.
    fn release(&self, ids: &[ObjectID]) {
        let mut queues = self.queues.lock();
        for id in ids {
            let Some(queue) = queues.get_mut(id) else {
                continue;
            };
            loop {
                match queue.pop_front() {
                    Some(next) => {
                        if next.send(()).is_ok() {
                            break;
                        }
                        // Waiter gave up (future dropped); try the next one.
                    }
                    None => {
                        queues.remove(id);
                        break;
                    }
                }
            }
        }
    }
}

/// Pool funding state: coin ids usable to mint fresh pool coins. A `None`
/// reference marks a coin whose exact version is unknown (e.g. it paid for
/// a failed transaction) and must be refetched before use.
type SourceCoins = Option<HashMap<ObjectID, Option<ObjectRef>>>;

pub struct ParallelTransactionExecutor<S> {
    executor: CachingTransactionExecutor,
    gas_price: GasPriceCache,
    signer: S,
    options: ParallelExecutorOptions,
    /// Sole admission-control mechanism bounding concurrent outstanding
    /// node calls to `max_pool_size`.
    concurrency: Semaphore,
    coin_pool: Mutex<VecDeque<CoinInfo>>,
    source_coins: Mutex<SourceCoins>,
    /// One refill in flight at a time; it races with nothing on the source
    /// coins.
    refill_lock: Mutex<()>,
    object_locks: ObjectLocks,
    inflight: watch::Sender<usize>,
}

impl<S: Signer> ParallelTransactionExecutor<S> {
    pub fn new(client: Arc<dyn NodeApi>, signer: S) -> Self {
        Self::new_with_options(client, signer, ParallelExecutorOptions::default())
    }

    pub fn new_with_options(
        client: Arc<dyn NodeApi>,
        signer: S,
        options: ParallelExecutorOptions,
    ) -> Self {
        let gas_price = GasPriceCache::new(client.clone(), options.epoch_boundary_window);
        let source_coins = options
            .source_coins
            .as_ref()
            .map(|ids| ids.iter().map(|id| (*id, None)).collect());
        let (inflight, _) = watch::channel(0);
        Self {
            executor: CachingTransactionExecutor::new(client),
            gas_price,
            signer,
            concurrency: Semaphore::new(options.max_pool_size),
            coin_pool: Mutex::new(VecDeque::new()),
            source_coins: Mutex::new(source_coins),
            refill_lock: Mutex::new(()),
            object_locks: ObjectLocks::new(),
            inflight,
            options,
        }
    }

    pub fn cache(&self) -> &crate::cache::ObjectCache {
        self.executor.cache()
    }

    /// Builds, signs, and submits the draft once every owned object it
    /// touches is free and a pool coin is available.
    ///
    /// The used-object set is discovered from the draft as submitted; object
    /// references added to the draft afterwards are not conflict-tracked.
    ///
    /// The returned future must be polled to completion. Dropping it while
    /// it waits on busy objects (e.g. under a timeout) can leave object
    /// locks it already holds unreleased, wedging later transactions on the
    /// same objects.
    pub async fn execute_transaction(
        &self,
        tx: &mut TransactionBuilder,
    ) -> ExecutorResult<ExecuteResponse> {
        tx.set_sender(self.signer.address());
        let used_objects = self.discover_used_objects(tx).await?;

        self.object_locks.acquire(&used_objects).await;
        self.inflight.send_modify(|n| *n += 1);
        let result = self.execute_admitted(tx, &used_objects).await;
        self.object_locks.release(&used_objects);
        self.inflight.send_modify(|n| *n -= 1);
        result
    }

    /// Resolves once every transaction admitted before this call has
    /// finished, successfully or not.
    pub async fn wait_for_all_transactions(&self) {
        let mut rx = self.inflight.subscribe();
        while *rx.borrow_and_update() > 0 {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Dry resolution pass over a clone of the draft, extracting the owned
    /// object ids it will touch. The real draft is resolved only after
    /// admission, so it sees cache state as left by conflicting
    /// predecessors.
    async fn discover_used_objects(
        &self,
        tx: &TransactionBuilder,
    ) -> ExecutorResult<Vec<ObjectID>> {
        let mut probe = tx.clone();
        self.executor.resolve_transaction(&mut probe).await?;
        Ok(probe.owned_input_ids())
    }

    async fn execute_admitted(
        &self,
        tx: &mut TransactionBuilder,
        used_objects: &[ObjectID],
    ) -> ExecutorResult<ExecuteResponse> {
        let _permit = self
            .concurrency
            .acquire()
            .await
            .expect("semaphore is never closed");

        let coin = self.checkout_coin().await?;
        let result = self.execute_with_coin(tx, &coin).await;
        match result {
            Ok(response) => {
                let effects = response.effects()?;
                if tx.uses_gas_coin_argument() || tx.references_object(coin.id()) {
                    // The transaction spent or merged its own gas coin; it
                    // cannot be reused and leaves tracking entirely.
                    debug!(coin = %coin.id(), "gas coin consumed as transaction argument");
                } else if let Some((gas_ref, _)) = effects.gas_object_ref() {
                    let balance = balance_after(coin.balance, effects.gas_used());
                    if balance >= self.options.minimum_coin_balance {
                        self.coin_pool.lock().await.push_back(CoinInfo {
                            object_ref: gas_ref,
                            balance,
                        });
                    } else {
                        debug!(coin = %coin.id(), balance, "gas coin depleted, queuing for consolidation");
                        self.add_source_coin(coin.id(), Some(gas_ref)).await;
                    }
                }
                Ok(response)
            }
            Err(error) => {
                warn!(coin = %coin.id(), %error, "transaction failed, evicting used objects");
                // The coin's version is unknown after a failure; consolidate
                // it instead of reusing it directly.
                self.add_source_coin(coin.id(), None).await;
                self.executor.delete_objects(used_objects).await;
                // Let in-flight work settle before the caller can retry,
                // preventing a cascade of conflicting resubmissions.
                if let Err(wait_error) = self.executor.wait_for_last_transaction().await {
                    warn!(%wait_error, "failed to wait for last transaction after error");
                }
                Err(error)
            }
        }
    }

    async fn execute_with_coin(
        &self,
        tx: &mut TransactionBuilder,
        coin: &CoinInfo,
    ) -> ExecutorResult<ExecuteResponse> {
        tx.set_gas_payment(vec![coin.object_ref]);
        if tx.gas_price().is_none() {
            tx.set_gas_price(self.gas_price.reference_gas_price().await?);
        }
        if tx.gas_budget().is_none() {
            tx.set_gas_budget(self.options.default_gas_budget);
        }
        let tx_bytes = self.executor.build_transaction(tx).await?;
        let signature = self.signer.sign_transaction(&tx_bytes).await?;
        self.executor
            .execute_transaction(&tx_bytes, &signature, &ExecuteOptions::with_effects())
            .await
    }

    async fn add_source_coin(&self, id: ObjectID, object_ref: Option<ObjectRef>) {
        let mut sources = self.source_coins.lock().await;
        sources.get_or_insert_with(HashMap::new).insert(id, object_ref);
    }

    async fn checkout_coin(&self) -> ExecutorResult<CoinInfo> {
        loop {
            if let Some(coin) = self.coin_pool.lock().await.pop_front() {
                return Ok(coin);
            }
            self.refill_pool().await?;
        }
    }

    /// Splits a source coin into `coin_batch_size` fresh pool coins and
    /// transfers them back to the signer. Multiple source coins are passed
    /// as a combined gas payment, consolidating them in the same step.
    async fn refill_pool(&self) -> ExecutorResult {
        let _guard = self.refill_lock.lock().await;
        if !self.coin_pool.lock().await.is_empty() {
            // A concurrent refill landed while we waited for the lock.
            return Ok(());
        }

        let source_refs = self.collect_source_refs().await?;
        info!(
            sources = source_refs.len(),
            batch = self.options.coin_batch_size,
            "refilling gas coin pool"
        );

        let mut tx = TransactionBuilder::new();
        tx.set_sender(self.signer.address());
        tx.set_gas_payment(source_refs);
        tx.set_gas_price(self.gas_price.reference_gas_price().await?);
        tx.set_gas_budget(self.options.default_gas_budget);
        let amounts = vec![self.options.initial_coin_balance; self.options.coin_batch_size];
        let coins = tx.split_coins(Argument::GasCoin, amounts)?;
        tx.transfer_objects(coins, self.signer.address());

        // The refill depends on cache state produced by the previous
        // transaction (the consolidated source coin), so wait for it first.
        self.executor.wait_for_last_transaction().await?;

        let tx_bytes = tx.build()?;
        let signature = self.signer.sign_transaction(&tx_bytes).await?;
        let result = self
            .executor
            .execute_transaction(&tx_bytes, &signature, &ExecuteOptions::with_effects())
            .await;

        match result {
            Ok(response) => {
                let effects = response.effects()?;
                let minted = effects.created_refs_excluding_gas();
                debug!(minted = minted.len(), "pool refill minted coins");
                {
                    let mut pool = self.coin_pool.lock().await;
                    for object_ref in minted {
                        pool.push_back(CoinInfo {
                            object_ref,
                            balance: self.options.initial_coin_balance,
                        });
                    }
                }
                // All sources merged into the gas coin; it is the sole
                // remaining funding source.
                let mut sources = self.source_coins.lock().await;
                let consolidated = effects
                    .gas_object_ref()
                    .map(|(gas_ref, _)| (gas_ref.0, Some(gas_ref)))
                    .into_iter()
                    .collect();
                *sources = Some(consolidated);
                Ok(())
            }
            Err(error) => {
                // Versions of every source are now suspect; refetch next time.
                let mut sources = self.source_coins.lock().await;
                if let Some(map) = sources.as_mut() {
                    for object_ref in map.values_mut() {
                        *object_ref = None;
                    }
                }
                Err(error)
            }
        }
    }

    /// Exact references for all source coins, discovering owned SUI coins
    /// on first use and refetching any coin whose version is unknown.
    async fn collect_source_refs(&self) -> ExecutorResult<Vec<ObjectRef>> {
        let mut sources = self.source_coins.lock().await;
        if sources.is_none() {
            let coins = self
                .executor
                .client()
                .get_owned_sui_coins(self.signer.address())
                .await?;
            debug!(count = coins.len(), "discovered owned SUI coins for pool funding");
            *sources = Some(
                coins
                    .into_iter()
                    .map(|coin| (coin.id(), Some(coin.object_ref)))
                    .collect(),
            );
        }
        let map = sources.as_mut().expect("initialized above");

        let stale: Vec<ObjectID> = map
            .iter()
            .filter(|(_, object_ref)| object_ref.is_none())
            .map(|(id, _)| *id)
            .collect();
        if !stale.is_empty() {
            let fetched = self.executor.client().multi_get_objects(&stale).await?;
            for (id, snapshot) in stale.iter().zip(fetched) {
                match snapshot {
                    Some(snapshot) => {
                        map.insert(*id, Some(snapshot.object_ref));
                    }
                    None => {
                        // Deleted since we last saw it; drop it from funding.
                        map.remove(id);
                    }
                }
            }
        }

        let refs: Vec<ObjectRef> = map.values().filter_map(|object_ref| *object_ref).collect();
        if refs.is_empty() {
            return Err(ExecutorError::NoCoinsAvailable);
        }
        Ok(refs)
    }
}
