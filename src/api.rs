// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! The client used to talk to a running node. Implementations live outside this crate; the
//! network only needs to ask a node whether it is healthy and to close any long-lived
//! connection it holds when the node goes away.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Returns whether the node reports itself healthy. Transport errors are not fatal to the
    /// caller, which keeps polling until its deadline.
    async fn health(&self) -> Result<bool>;

    /// Closes the streaming connection to the node, if any.
    fn close(&self);
}

/// Builds an [`ApiClient`] for the node listening at `ip:port`.
pub type NewApiClientFn = Arc<dyn Fn(&str, u16) -> Arc<dyn ApiClient> + Send + Sync>;
