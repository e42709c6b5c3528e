// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{NetworkConfig, NodeConfig, NodeId, StakingIdentity},
    error::{invalid_config, Result},
    local::process::LocalNodeConfig,
};
use serde_json::json;
use std::path::PathBuf;

pub const DEFAULT_NETWORK_ID: u32 = 1337;
pub const DEFAULT_NUM_NODES: usize = 5;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// A genesis document for `network_id` with the given initial stakers.
pub fn default_genesis(network_id: u32, initial_stakers: &[NodeId]) -> String {
    json!({
        "networkID": network_id,
        "allocations": [],
        "startTime": 1_630_987_200u64,
        "initialStakeDuration": 31_536_000u64,
        "initialStakers": initial_stakers
            .iter()
            .map(|id| json!({ "nodeID": id.to_string(), "rewardAddress": "", "delegationFee": 0 }))
            .collect::<Vec<_>>(),
        "cChainGenesis": "",
        "message": "local test network",
    })
    .to_string()
}

/// A network of `num_nodes` beacons named `node-0` through `node-{num_nodes - 1}`, each running
/// `binary_path` with a freshly generated staking identity.
pub fn default_network_config<P: Into<PathBuf>>(
    binary_path: P,
    num_nodes: usize,
) -> Result<NetworkConfig> {
    if num_nodes == 0 {
        return Err(invalid_config("a default network needs at least one node"));
    }
    let local_config = LocalNodeConfig::new(binary_path).to_value();

    let identities = (0..num_nodes)
        .map(|_| StakingIdentity::generate())
        .collect::<Result<Vec<_>>>()?;
    let node_ids = identities
        .iter()
        .map(StakingIdentity::node_id)
        .collect::<Result<Vec<_>>>()?;

    let node_configs = identities
        .into_iter()
        .enumerate()
        .map(|(i, identity)| NodeConfig {
            impl_specific_config: Some(local_config.clone()),
            name: format!("node-{}", i),
            is_beacon: true,
            staking_key: identity.key,
            staking_cert: identity.cert,
            ..Default::default()
        })
        .collect();

    Ok(NetworkConfig {
        name: "default".to_string(),
        genesis: default_genesis(DEFAULT_NETWORK_ID, &node_ids),
        log_level: DEFAULT_LOG_LEVEL.to_string(),
        flags: Default::default(),
        node_configs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::genesis_network_id;

    #[test]
    fn default_config_is_valid() {
        let config = default_network_config("/bin/validator", DEFAULT_NUM_NODES).unwrap();
        assert_eq!(config.validate().unwrap(), DEFAULT_NETWORK_ID);
        assert_eq!(config.node_configs.len(), DEFAULT_NUM_NODES);
        for (i, node) in config.node_configs.iter().enumerate() {
            assert_eq!(node.name, format!("node-{}", i));
            assert!(node.is_beacon);
            let local = LocalNodeConfig::from_node_config(node).unwrap();
            assert_eq!(local.binary_path, PathBuf::from("/bin/validator"));
        }
    }

    #[test]
    fn genesis_lists_stakers() {
        let ids = vec![NodeId::new([1; 20]), NodeId::new([2; 20])];
        let genesis = default_genesis(7, &ids);
        assert_eq!(genesis_network_id(&genesis).unwrap(), 7);
        for id in &ids {
            assert!(genesis.contains(&id.to_string()));
        }
    }

    #[test]
    fn zero_nodes() {
        assert!(default_network_config("/bin/validator", 0).is_err());
    }
}
