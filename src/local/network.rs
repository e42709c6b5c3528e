// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    api::NewApiClientFn,
    config::{
        merge_flags, parse_config_file, render_flag, Flags, NetworkConfig, NodeConfig,
        BOOTSTRAP_IDS_KEY, BOOTSTRAP_IPS_KEY, DB_DIR_KEY, HTTP_PORT_KEY, LOG_DIR_KEY,
        LOG_LEVEL_KEY, NETWORK_ID_KEY, PUBLIC_IP_KEY, STAKING_PORT_KEY,
    },
    error::{NetworkError, Result},
    local::{
        bootstrap::BeaconSet,
        default_config::{default_network_config, DEFAULT_NUM_NODES},
        files::write_files,
        node::LocalNode,
        ports::{get_available_port, get_config_entry, get_port},
        process::NodeProcessCreator,
    },
    Network, Node,
};
use anyhow::anyhow;
use async_trait::async_trait;
use futures::{future::join_all, stream::FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::{HashMap, HashSet},
    fs, mem,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    ops,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;
use tokio::{
    sync::oneshot,
    time::{sleep, sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;

const LOCAL_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;
const HEALTH_CHECK_FREQ: Duration = Duration::from_millis(500);
const DB_SUB_DIR: &str = "db";
const LOGS_SUB_DIR: &str = "logs";

/// Where a network keeps the files of its nodes
#[derive(Debug)]
pub enum NetworkDirectory {
    Persistent(PathBuf),
    Temporary(TempDir),
}

impl NetworkDirectory {
    fn new(dir: Option<PathBuf>) -> Result<Self> {
        match dir {
            Some(dir) => {
                fs::create_dir_all(&dir)
                    .map_err(|e| NetworkError::Io(dir.display().to_string(), e))?;
                Ok(NetworkDirectory::Persistent(dir))
            }
            None => TempDir::new()
                .map(NetworkDirectory::Temporary)
                .map_err(|e| NetworkError::Io("temporary network directory".to_string(), e)),
        }
    }

    /// Keeps the directory around after the network is dropped.
    pub fn persist(&mut self) {
        if let NetworkDirectory::Temporary(_) = self {
            let dir = mem::replace(self, NetworkDirectory::Persistent(PathBuf::new()));
            if let NetworkDirectory::Temporary(dir) = dir {
                *self = NetworkDirectory::Persistent(dir.into_path());
            }
        }
    }
}

impl ops::Deref for NetworkDirectory {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        match self {
            NetworkDirectory::Persistent(dir) => dir.as_path(),
            NetworkDirectory::Temporary(dir) => dir.path(),
        }
    }
}

#[derive(Default)]
pub(crate) struct State {
    nodes: HashMap<String, Arc<LocalNode>>,
    beacons: BeaconSet,
    next_node_suffix: u64,
    stopped: bool,
}

impl State {
    /// Gives `config` a generated name if it has none, skipping names already taken or
    /// `reserved`. Fails if an explicitly given name is already taken.
    fn set_node_name(&mut self, config: &mut NodeConfig, reserved: &HashSet<String>) -> Result<()> {
        if config.name.is_empty() {
            loop {
                let name = format!("node-{}", self.next_node_suffix);
                self.next_node_suffix += 1;
                if !self.nodes.contains_key(&name) && !reserved.contains(&name) {
                    config.name = name;
                    return Ok(());
                }
            }
        }
        if self.nodes.contains_key(&config.name) {
            return Err(NetworkError::NameConflict(format!(
                "repeated node name {:?}",
                config.name
            )));
        }
        Ok(())
    }
}

/// A network of validator processes running on this host
pub struct LocalNetwork {
    network_id: u32,
    genesis: Vec<u8>,
    log_level: String,
    flags: Flags,
    new_api_client: NewApiClientFn,
    node_process_creator: Arc<dyn NodeProcessCreator>,
    dir: NetworkDirectory,
    state: Mutex<State>,
}

impl LocalNetwork {
    /// Validates `config` and starts its nodes one at a time, in order. If a node fails to
    /// start its error is returned; nodes started before it keep running.
    ///
    /// Node files go under `dir`, or under a temporary directory when `dir` is `None`.
    pub async fn new(
        config: NetworkConfig,
        new_api_client: NewApiClientFn,
        node_process_creator: Arc<dyn NodeProcessCreator>,
        dir: Option<PathBuf>,
    ) -> Result<Self> {
        let network_id = config.validate()?;
        let network = Self {
            network_id,
            genesis: config.genesis.into_bytes(),
            log_level: config.log_level,
            flags: config.flags,
            new_api_client,
            node_process_creator,
            dir: NetworkDirectory::new(dir)?,
            state: Mutex::new(State::default()),
        };
        info!(
            "Creating network {:?} (id {}) with {} node(s) in {:?}",
            config.name,
            network_id,
            config.node_configs.len(),
            &*network.dir
        );

        let reserved: HashSet<String> = config
            .node_configs
            .iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| c.name.clone())
            .collect();
        for node_config in config.node_configs {
            network.add_node_inner(node_config, &reserved).await?;
        }
        Ok(network)
    }

    /// Creates a network of five beacon nodes running `binary_path`.
    pub async fn new_default<P: Into<PathBuf>>(
        binary_path: P,
        new_api_client: NewApiClientFn,
        node_process_creator: Arc<dyn NodeProcessCreator>,
    ) -> Result<Self> {
        let config = default_network_config(binary_path, DEFAULT_NUM_NODES)?;
        Self::new(config, new_api_client, node_process_creator, None).await
    }

    pub fn network_id(&self) -> u32 {
        self.network_id
    }

    pub fn genesis(&self) -> &[u8] {
        &self.genesis
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot of the nodes new non-beacon nodes currently bootstrap from
    pub fn beacons(&self) -> Result<BeaconSet> {
        let state = self.state.lock();
        if state.stopped {
            return Err(NetworkError::Stopped);
        }
        Ok(state.beacons.clone())
    }

    pub fn get_local_node(&self, name: &str) -> Result<Arc<LocalNode>> {
        let state = self.state.lock();
        if state.stopped {
            return Err(NetworkError::Stopped);
        }
        state
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| NetworkError::NotFound(name.to_string()))
    }

    async fn add_node_inner(
        &self,
        mut config: NodeConfig,
        reserved: &HashSet<String>,
    ) -> Result<Arc<LocalNode>> {
        let bootstrap = {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(NetworkError::Stopped);
            }
            state.set_node_name(&mut config, reserved)?;
            if !config.is_beacon && !state.nodes.is_empty() {
                Some((state.beacons.ips_arg(), state.beacons.ids_arg()))
            } else {
                None
            }
        };

        config.validate(self.network_id)?;
        let node_id = config.node_id()?;
        merge_flags(&self.flags, &mut config.flags);

        let config_file = parse_config_file(&config.config_file)?.unwrap_or_default();
        let api_port = match get_port(&config.flags, &config_file, HTTP_PORT_KEY)? {
            Some(port) => port,
            None => get_available_port()?,
        };
        let p2p_port = match get_port(&config.flags, &config_file, STAKING_PORT_KEY)? {
            Some(port) => port,
            None => get_available_port()?,
        };

        let node_dir = self.dir.join(&config.name);
        let db_dir = get_config_entry(
            &config_file,
            DB_DIR_KEY,
            &node_dir.join(DB_SUB_DIR).display().to_string(),
        )?;
        let log_dir = get_config_entry(
            &config_file,
            LOG_DIR_KEY,
            &node_dir.join(LOGS_SUB_DIR).display().to_string(),
        )?;

        let mut node_flags = Flags::new();
        node_flags.insert(NETWORK_ID_KEY.into(), json!(self.network_id));
        node_flags.insert(PUBLIC_IP_KEY.into(), json!(LOCAL_IP.to_string()));
        node_flags.insert(DB_DIR_KEY.into(), Value::String(db_dir));
        node_flags.insert(LOG_DIR_KEY.into(), Value::String(log_dir));
        node_flags.insert(HTTP_PORT_KEY.into(), json!(api_port));
        node_flags.insert(STAKING_PORT_KEY.into(), json!(p2p_port));
        if !self.log_level.is_empty() {
            node_flags.insert(LOG_LEVEL_KEY.into(), json!(self.log_level));
        }
        // Flags given explicitly are passed as given
        node_flags.retain(|key, _| !config.flags.contains_key(key));

        let mut flags = write_files(&self.genesis, &node_dir, &config)?;
        if let Some((ips, ids)) = bootstrap {
            for (key, value) in vec![(BOOTSTRAP_IPS_KEY, ips), (BOOTSTRAP_IDS_KEY, ids)] {
                if !config.flags.contains_key(key) {
                    flags.push(render_flag(key, &Value::String(value)));
                }
            }
        }
        flags.extend(
            node_flags
                .iter()
                .chain(config.flags.iter())
                .map(|(key, value)| render_flag(key, value)),
        );

        let mut process = self
            .node_process_creator
            .new_node_process(&config, &flags)
            .map_err(NetworkError::Process)?;
        process.start().map_err(NetworkError::Process)?;

        let url = LOCAL_IP.to_string();
        let api_client = (self.new_api_client)(&url, api_port);
        let node = Arc::new(LocalNode {
            name: config.name.clone(),
            node_id,
            config,
            api_client,
            process,
            url,
            p2p_port,
            api_port,
            dir: node_dir,
        });

        let rejected = {
            let mut state = self.state.lock();
            if state.stopped {
                Some(NetworkError::Stopped)
            } else if state.nodes.contains_key(&node.name) {
                Some(NetworkError::NameConflict(format!(
                    "repeated node name {:?}",
                    node.name
                )))
            } else {
                state.nodes.insert(node.name.clone(), node.clone());
                if node.is_beacon() {
                    state.beacons.add(
                        SocketAddr::new(IpAddr::V4(LOCAL_IP), node.p2p_port),
                        node.node_id,
                    );
                }
                None
            }
        };
        if let Some(err) = rejected {
            if let Err(e) = node.stop().await {
                warn!("Failed to stop rejected node {}: {:#}", node.name, e);
            }
            return Err(err);
        }

        info!(
            "Added node {} ({}) with API port {} and P2P port {}{}",
            node.name,
            node.node_id,
            node.api_port,
            node.p2p_port,
            if node.is_beacon() { " as a beacon" } else { "" }
        );
        Ok(node)
    }

    pub async fn add_node(&self, config: NodeConfig) -> Result<Arc<LocalNode>> {
        self.add_node_inner(config, &HashSet::new()).await
    }

    pub async fn remove_node(&self, name: &str) -> Result<()> {
        let node = {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(NetworkError::Stopped);
            }
            let node = state
                .nodes
                .remove(name)
                .ok_or_else(|| NetworkError::NotFound(name.to_string()))?;
            if node.is_beacon() {
                state.beacons.remove(&node.node_id);
            }
            node
        };
        node.stop().await.map_err(NetworkError::Process)?;
        info!("Removed node {}", name);
        Ok(())
    }

    pub fn get_node_names(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        if state.stopped {
            return Err(NetworkError::Stopped);
        }
        let mut names: Vec<_> = state.nodes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Probes every node currently in the network on tasks of its own. Must be called from
    /// within a tokio runtime unless the network is stopped or empty.
    pub fn healthy(
        &self,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let nodes: Vec<_> = {
            let state = self.state.lock();
            if state.stopped {
                let _ = tx.send(Err(NetworkError::Stopped));
                return rx;
            }
            state.nodes.values().cloned().collect()
        };
        if nodes.is_empty() {
            let _ = tx.send(Ok(()));
            return rx;
        }
        tokio::spawn(async move {
            let _ = tx.send(await_healthy(nodes, cancel, Instant::now() + timeout).await);
        });
        rx
    }

    pub async fn stop(&self) -> Result<()> {
        let nodes: Vec<_> = {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(NetworkError::Stopped);
            }
            state.stopped = true;
            state.beacons = BeaconSet::new();
            state.nodes.drain().collect()
        };
        info!("Stopping network with {} node(s)", nodes.len());

        let results = join_all(nodes.iter().map(|(_, node)| node.stop())).await;
        let failures: Vec<_> = nodes
            .into_iter()
            .zip(results)
            .filter_map(|((name, _), result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to stop node {}: {:#}", name, e);
                    Some((name, e))
                }
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::StopFailed(failures))
        }
    }
}

/// Polls every node until all report healthy. The first failure cancels the remaining probes.
async fn await_healthy(
    nodes: Vec<Arc<LocalNode>>,
    cancel: CancellationToken,
    deadline: Instant,
) -> Result<()> {
    let cancel = cancel.child_token();
    let mut probes: FuturesUnordered<_> = nodes
        .into_iter()
        .map(|node| tokio::spawn(probe(node, cancel.clone(), deadline)))
        .collect();

    let mut result = Ok(());
    while let Some(joined) = probes.next().await {
        let outcome = joined.unwrap_or_else(|e| {
            Err(NetworkError::Process(anyhow!("health probe failed: {}", e)))
        });
        if let Err(e) = outcome {
            if result.is_ok() {
                cancel.cancel();
                result = Err(e);
            }
        }
    }
    result
}

async fn probe(node: Arc<LocalNode>, cancel: CancellationToken, deadline: Instant) -> Result<()> {
    let client = node.api_client();
    let poll = async {
        loop {
            match client.health().await {
                Ok(true) => return,
                Ok(false) => debug!("Node {} not healthy yet", node.name),
                Err(e) => debug!("Node {} health check failed: {:#}", node.name, e),
            }
            sleep(HEALTH_CHECK_FREQ).await;
        }
    };
    tokio::select! {
        _ = poll => {
            debug!("Node {} is healthy", node.name);
            Ok(())
        }
        _ = cancel.cancelled() => Err(NetworkError::HealthTimeout(format!(
            "health check of node {} cancelled",
            node.name
        ))),
        _ = sleep_until(deadline) => Err(NetworkError::HealthTimeout(format!(
            "node {} not healthy before the deadline",
            node.name
        ))),
    }
}

impl Drop for LocalNetwork {
    fn drop(&mut self) {
        // If panicking, keep the node files around for inspection
        if std::thread::panicking() {
            self.dir.persist();
            println!("Network files located at {:?}", &*self.dir);
        }
    }
}

#[async_trait]
impl Network for LocalNetwork {
    fn healthy(
        &self,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> oneshot::Receiver<Result<()>> {
        LocalNetwork::healthy(self, cancel, timeout)
    }

    fn get_node(&self, name: &str) -> Result<Arc<dyn Node>> {
        self.get_local_node(name).map(|node| node as Arc<dyn Node>)
    }

    fn get_node_names(&self) -> Result<Vec<String>> {
        LocalNetwork::get_node_names(self)
    }

    fn get_all_nodes(&self) -> Result<HashMap<String, Arc<dyn Node>>> {
        let state = self.state.lock();
        if state.stopped {
            return Err(NetworkError::Stopped);
        }
        Ok(state
            .nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.clone() as Arc<dyn Node>))
            .collect())
    }

    async fn add_node(&self, config: NodeConfig) -> Result<Arc<dyn Node>> {
        LocalNetwork::add_node(self, config)
            .await
            .map(|node| node as Arc<dyn Node>)
    }

    async fn remove_node(&self, name: &str) -> Result<()> {
        LocalNetwork::remove_node(self, name).await
    }

    async fn stop(&self) -> Result<()> {
        LocalNetwork::stop(self).await
    }
}
