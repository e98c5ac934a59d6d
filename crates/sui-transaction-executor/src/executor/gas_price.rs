// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::client::NodeApi;
use crate::error::ExecutorResult;

struct CachedGasPrice {
    price: u64,
    /// When the current epoch is expected to end.
    expires_at: Instant,
}

/// Reference-gas-price cache with one fetch per epoch. The price can change
/// at epoch boundaries, so lookups landing within the boundary window wait
/// the window out and refetch instead of serving a possibly stale price.
pub struct GasPriceCache {
    client: Arc<dyn NodeApi>,
    epoch_boundary_window: Duration,
    state: Mutex<Option<CachedGasPrice>>,
}

impl GasPriceCache {
    pub fn new(client: Arc<dyn NodeApi>, epoch_boundary_window: Duration) -> Self {
        Self {
            client,
            epoch_boundary_window,
            state: Mutex::new(None),
        }
    }

    pub async fn reference_gas_price(&self) -> ExecutorResult<u64> {
        let mut state = self.state.lock().await;
        if let Some(cached) = &*state {
            let now = Instant::now();
            if now + self.epoch_boundary_window < cached.expires_at {
                return Ok(cached.price);
            }
            // Near or past the boundary: let the epoch change settle on the
            // node before refetching.
            let resume_at = cached.expires_at + self.epoch_boundary_window;
            if resume_at > now {
                debug!("gas price lookup near epoch boundary, waiting for fresh epoch state");
                tokio::time::sleep_until(resume_at).await;
            }
        }

        let summary = self.client.get_latest_system_state().await?;
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let epoch_end_ms = summary
            .epoch_start_timestamp_ms
            .saturating_add(summary.epoch_duration_ms);
        let remaining = Duration::from_millis(epoch_end_ms.saturating_sub(now_ms));
        debug!(
            epoch = summary.epoch,
            price = summary.reference_gas_price,
            remaining_ms = remaining.as_millis() as u64,
            "cached reference gas price"
        );
        *state = Some(CachedGasPrice {
            price: summary.reference_gas_price,
            expires_at: Instant::now() + remaining,
        });
        Ok(summary.reference_gas_price)
    }
}
