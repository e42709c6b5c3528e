// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    api::ApiClient,
    config::{NodeConfig, NodeId},
    Result,
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A node running as part of a [`Network`]
pub trait Node: Send + Sync {
    /// This node's name, unique across the nodes of its network
    fn name(&self) -> &str;

    fn node_id(&self) -> NodeId;

    /// A client that can be used to make API calls to this node
    fn api_client(&self) -> Arc<dyn ApiClient>;

    /// The address the node is reachable at. For a local network this is the node's IP.
    fn url(&self) -> &str;

    /// The P2P (staking) port
    fn p2p_port(&self) -> u16;

    /// The HTTP API port
    fn api_port(&self) -> u16;

    fn is_beacon(&self) -> bool;

    /// The config the node was launched with, name included
    fn config(&self) -> &NodeConfig;
}

/// A running network of nodes. Once [`Network::stop`] has returned every method fails with
/// [`NetworkError::Stopped`](crate::NetworkError::Stopped).
#[async_trait]
pub trait Network: Send + Sync {
    /// Resolves to `Ok(())` once every node currently in the network reports healthy, or to the
    /// first error otherwise. Gives up when `timeout` elapses or `cancel` fires. Must be called
    /// from within a tokio runtime.
    fn healthy(
        &self,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> oneshot::Receiver<Result<()>>;

    fn get_node(&self, name: &str) -> Result<Arc<dyn Node>>;

    fn get_node_names(&self) -> Result<Vec<String>>;

    fn get_all_nodes(&self) -> Result<HashMap<String, Arc<dyn Node>>>;

    /// Starts a new node and adds it to the network
    async fn add_node(&self, config: NodeConfig) -> Result<Arc<dyn Node>>;

    /// Stops the named node and removes it from the network
    async fn remove_node(&self, name: &str) -> Result<()>;

    /// Stops every node in the network
    async fn stop(&self) -> Result<()>;
}
