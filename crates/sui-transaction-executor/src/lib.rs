// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Client-side transaction execution orchestration for Sui.
//!
//! This crate schedules, builds, and submits signed transactions from a
//! single signer against a remote fullnode, without racing on object
//! versions or gas coins:
//!
//! - [`ObjectCache`](cache::ObjectCache) remembers the last known version
//!   and digest of every object touched, updated from execution effects so
//!   follow-up transactions resolve inputs without extra round trips.
//! - [`CachingTransactionExecutor`](executor::CachingTransactionExecutor)
//!   is the choke point through which every transaction is built and
//!   executed, enriching drafts with cache-aware object resolution.
//! - [`SerialTransactionExecutor`](executor::SerialTransactionExecutor)
//!   totally orders submissions and reuses the gas coin produced by the
//!   previous transaction's effects.
//! - [`ParallelTransactionExecutor`](executor::ParallelTransactionExecutor)
//!   runs many transactions concurrently from one signer, backed by a
//!   bounded pool of gas coins and per-object conflict queues.
//!
//! The fullnode and the signing key live behind the [`NodeApi`](client::NodeApi)
//! and [`Signer`](signer::Signer) traits; transport and key management are
//! external collaborators. One executor instance owns its coin pool and
//! cache exclusively; two instances must not share a signer concurrently.

pub mod base_types;
pub mod cache;
pub mod client;
pub mod effects;
pub mod error;
pub mod executor;
pub mod gas;
pub mod registry;
pub mod signer;
pub mod transaction;

pub use client::NodeApi;
pub use error::{ExecutorError, ExecutorResult};
pub use executor::{
    CachingTransactionExecutor, ParallelExecutorOptions, ParallelTransactionExecutor,
    SerialTransactionExecutor,
};
pub use signer::Signer;
pub use transaction::TransactionBuilder;
