// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    api::ApiClient,
    config::{NodeConfig, NodeId},
    local::process::NodeProcess,
    Node,
};
use anyhow::Result;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A node of a [`LocalNetwork`](super::LocalNetwork), running as a process on this host.
pub struct LocalNode {
    pub(crate) name: String,
    pub(crate) node_id: NodeId,
    pub(crate) config: NodeConfig,
    pub(crate) api_client: Arc<dyn ApiClient>,
    pub(crate) process: Box<dyn NodeProcess>,
    pub(crate) url: String,
    pub(crate) p2p_port: u16,
    pub(crate) api_port: u16,
    pub(crate) dir: PathBuf,
}

impl LocalNode {
    /// The directory holding this node's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn process(&self) -> &dyn NodeProcess {
        self.process.as_ref()
    }

    /// Stops the process and closes the API client's connection. The connection is closed even
    /// when stopping the process fails.
    pub(crate) async fn stop(&self) -> Result<()> {
        let result = self.process.stop().await;
        self.api_client.close();
        result
    }
}

impl Node for LocalNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn api_client(&self) -> Arc<dyn ApiClient> {
        self.api_client.clone()
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn p2p_port(&self) -> u16 {
        self.p2p_port
    }

    fn api_port(&self) -> u16 {
        self.api_port
    }

    fn is_beacon(&self) -> bool {
        self.config.is_beacon
    }

    fn config(&self) -> &NodeConfig {
        &self.config
    }
}

impl fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNode")
            .field("name", &self.name)
            .field("node_id", &self.node_id.to_string())
            .field("url", &self.url)
            .field("p2p_port", &self.p2p_port)
            .field("api_port", &self.api_port)
            .field("dir", &self.dir)
            .finish()
    }
}
