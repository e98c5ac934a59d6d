// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::base_types::SuiAddress;
use crate::error::ExecutorResult;

/// An opaque transaction signature. The executors never inspect it; they
/// pass it along to the node as-is.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

/// External signing collaborator. Key management and the signature scheme
/// are out of scope for the executors; remote signers are expected to
/// suspend in `sign_transaction`.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> SuiAddress;

    async fn sign_transaction(&self, tx_bytes: &[u8]) -> ExecutorResult<Signature>;
}

#[async_trait]
impl<S: Signer + ?Sized> Signer for std::sync::Arc<S> {
    fn address(&self) -> SuiAddress {
        (**self).address()
    }

    async fn sign_transaction(&self, tx_bytes: &[u8]) -> ExecutorResult<Signature> {
        (**self).sign_transaction(tx_bytes).await
    }
}
