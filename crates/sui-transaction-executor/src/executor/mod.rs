// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod caching;
mod gas_price;
mod parallel;
mod serial;

pub use caching::CachingTransactionExecutor;
pub use gas_price::GasPriceCache;
pub use parallel::{ParallelExecutorOptions, ParallelTransactionExecutor};
pub use serial::SerialTransactionExecutor;

/// Fallback budget applied to transactions that don't specify their own.
pub const DEFAULT_GAS_BUDGET: u64 = 50_000_000;
