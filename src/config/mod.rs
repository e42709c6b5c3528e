// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Declarative network and node configuration, and the checks run on it before any node process
//! is launched.

use crate::error::{invalid_config, NetworkError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

pub mod staking;

pub use staking::{NodeId, StakingIdentity};

/// Flag keys understood by the validator binary.
pub const NETWORK_ID_KEY: &str = "network-id";
pub const DB_DIR_KEY: &str = "db-dir";
pub const LOG_DIR_KEY: &str = "log-dir";
pub const LOG_LEVEL_KEY: &str = "log-level";
pub const HTTP_PORT_KEY: &str = "http-port";
pub const STAKING_PORT_KEY: &str = "staking-port";
pub const PUBLIC_IP_KEY: &str = "public-ip";
pub const BOOTSTRAP_IPS_KEY: &str = "bootstrap-ips";
pub const BOOTSTRAP_IDS_KEY: &str = "bootstrap-ids";
pub const STAKING_KEY_PATH_KEY: &str = "staking-tls-key-file";
pub const STAKING_CERT_PATH_KEY: &str = "staking-tls-cert-file";
pub const GENESIS_FILE_KEY: &str = "genesis";
pub const CONFIG_FILE_KEY: &str = "config-file";
pub const CHAIN_CONFIG_DIR_KEY: &str = "chain-config-dir";

const GENESIS_NETWORK_ID_KEY: &str = "networkID";

/// Command line flags, keyed by flag name. Values are strings, numbers or booleans.
pub type Flags = BTreeMap<String, Value>;

/// Everything needed to launch a single node.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Configuration specific to the backend running the node. Must be given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impl_specific_config: Option<Value>,
    /// Unique within a network. Assigned on node creation when empty.
    #[serde(default)]
    pub name: String,
    /// True if other nodes should use this node as a bootstrap beacon.
    #[serde(default)]
    pub is_beacon: bool,
    #[serde(default)]
    pub staking_key: String,
    #[serde(default)]
    pub staking_cert: String,
    /// Contents of the node's main config file. May be empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config_file: String,
    /// Contents of the node's C-Chain config file. May be empty.
    #[serde(
        default,
        rename = "cChainConfigFile",
        skip_serializing_if = "String::is_empty"
    )]
    pub c_chain_config_file: String,
    /// Per-node flags. These win over the network's flags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: Flags,
}

impl NodeConfig {
    pub fn validate(&self, expected_network_id: u32) -> Result<()> {
        if self.impl_specific_config.is_none() {
            return Err(invalid_config(
                "implementation-specific node config not given",
            ));
        }
        match (self.staking_key.is_empty(), self.staking_cert.is_empty()) {
            (true, true) => return Err(invalid_config("staking key and cert not given")),
            (true, false) => return Err(invalid_config("staking key not given")),
            (false, true) => return Err(invalid_config("staking cert not given")),
            (false, false) => {}
        }
        staking::verify_key_pair(&self.staking_key, &self.staking_cert)?;
        validate_config_file(&self.config_file, expected_network_id)?;
        parse_config_file(&self.c_chain_config_file)
            .map_err(|e| invalid_config(format!("C-Chain config file: {}", e)))?;
        Ok(())
    }

    /// The validator identity derived from this node's staking cert
    pub fn node_id(&self) -> Result<NodeId> {
        staking::node_id_from_cert(&self.staking_cert)
    }
}

/// Everything needed to create a network.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default)]
    pub name: String,
    /// JSON genesis document. Must carry a numeric `networkID`.
    #[serde(default)]
    pub genesis: String,
    #[serde(default)]
    pub log_level: String,
    /// Flags given to every node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: Flags,
    #[serde(default)]
    pub node_configs: Vec<NodeConfig>,
}

impl NetworkConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| NetworkError::Io(path.display().to_string(), e))?;
        serde_json::from_str(&contents).map_err(|e| {
            invalid_config(format!("could not parse {}: {}", path.display(), e))
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_json::to_vec_pretty(self)
            .map_err(|e| invalid_config(format!("could not serialize config: {}", e)))?;
        fs::write(path, contents).map_err(|e| NetworkError::Io(path.display().to_string(), e))
    }

    /// Validates the network config and every node config in it, returning the network id
    /// declared by the genesis.
    pub fn validate(&self) -> Result<u32> {
        let network_id = genesis_network_id(&self.genesis)?;

        let mut names = HashSet::new();
        for config in self.node_configs.iter().filter(|c| !c.name.is_empty()) {
            if !names.insert(config.name.as_str()) {
                return Err(NetworkError::NameConflict(format!(
                    "repeated node name {:?}",
                    config.name
                )));
            }
        }

        if !self.node_configs.is_empty() && !self.node_configs.iter().any(|c| c.is_beacon) {
            return Err(invalid_config("beacon nodes not given"));
        }

        for (i, config) in self.node_configs.iter().enumerate() {
            config
                .validate(network_id)
                .map_err(|e| invalid_config(format!("node config {}: {}", i, e)))?;
        }
        Ok(network_id)
    }
}

/// Extracts the network id from a JSON genesis document.
pub fn genesis_network_id(genesis: &str) -> Result<u32> {
    if genesis.is_empty() {
        return Err(invalid_config("genesis not given"));
    }
    let genesis: Map<String, Value> = serde_json::from_str(genesis)
        .map_err(|e| invalid_config(format!("could not unmarshal genesis: {}", e)))?;
    let network_id = genesis.get(GENESIS_NETWORK_ID_KEY).ok_or_else(|| {
        invalid_config(format!("genesis lacks field {:?}", GENESIS_NETWORK_ID_KEY))
    })?;
    network_id
        .as_f64()
        .filter(|id| id.fract() == 0.0 && *id >= 0.0 && *id <= f64::from(u32::MAX))
        .map(|id| id as u32)
        .ok_or_else(|| {
            invalid_config(format!(
                "wrong type for field {:?} in genesis, expected a network id got {}",
                GENESIS_NETWORK_ID_KEY, network_id
            ))
        })
}

/// Parses a JSON config file into a map. Empty contents parse to `None`.
pub fn parse_config_file(contents: &str) -> Result<Option<Map<String, Value>>> {
    if contents.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(contents)
        .map(Some)
        .map_err(|e| invalid_config(format!("could not unmarshal config file: {}", e)))
}

fn validate_config_file(contents: &str, expected_network_id: u32) -> Result<()> {
    let config = match parse_config_file(contents)? {
        Some(config) => config,
        None => return Ok(()),
    };

    if let Some(network_id) = config.get(NETWORK_ID_KEY) {
        let network_id = network_id
            .as_f64()
            .ok_or_else(|| wrong_type(NETWORK_ID_KEY, "number", network_id))?;
        if network_id != f64::from(expected_network_id) {
            return Err(invalid_config(format!(
                "config file network id {} differs from genesis network id {}",
                network_id, expected_network_id
            )));
        }
    }
    for key in &[DB_DIR_KEY, LOG_DIR_KEY] {
        if let Some(value) = config.get(*key) {
            if !value.is_string() {
                return Err(wrong_type(key, "string", value));
            }
        }
    }
    for key in &[HTTP_PORT_KEY, STAKING_PORT_KEY] {
        if let Some(value) = config.get(*key) {
            if !value.is_number() {
                return Err(wrong_type(key, "number", value));
            }
        }
    }
    Ok(())
}

fn wrong_type(key: &str, expected: &str, got: &Value) -> NetworkError {
    invalid_config(format!(
        "wrong type for field {:?} in config, expected {} got {}",
        key, expected, got
    ))
}

/// Adds the network's flags to a node's flags. On a key collision the node's value is kept.
pub fn merge_flags(network_flags: &Flags, node_flags: &mut Flags) {
    for (key, value) in network_flags {
        node_flags
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

/// Renders a flag as `--key=value`.
pub fn render_flag(key: &str, value: &Value) -> String {
    match value {
        Value::String(s) => format!("--{}={}", key, s),
        other => format!("--{}={}", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::{collection::btree_map, prelude::*};
    use serde_json::json;

    fn node_config(name: &str, is_beacon: bool) -> NodeConfig {
        let identity = StakingIdentity::generate().unwrap();
        NodeConfig {
            impl_specific_config: Some(json!({"binaryPath": "pepe"})),
            name: name.to_string(),
            is_beacon,
            staking_key: identity.key,
            staking_cert: identity.cert,
            ..Default::default()
        }
    }

    fn network_config(nodes: Vec<NodeConfig>) -> NetworkConfig {
        NetworkConfig {
            genesis: "{\"networkID\": 0}".to_string(),
            node_configs: nodes,
            ..Default::default()
        }
    }

    #[test]
    fn valid_config() {
        let config = network_config(vec![node_config("a", true), node_config("b", false)]);
        assert_eq!(config.validate().unwrap(), 0);
    }

    #[test]
    fn numeric_genesis_network_id() {
        assert_eq!(genesis_network_id("{\"networkID\": 1337}").unwrap(), 1337);
        assert_eq!(genesis_network_id("{\"networkID\": 1337.0}").unwrap(), 1337);
        assert!(genesis_network_id("{\"networkID\": 1337.5}").is_err());
        assert!(genesis_network_id("{\"networkID\": -1}").is_err());
        assert!(genesis_network_id("{\"networkID\": 4294967296}").is_err());
    }

    #[test]
    fn empty_network_needs_no_beacon() {
        assert!(network_config(vec![]).validate().is_ok());
    }

    #[test]
    fn invalid_configs() {
        let with_file = |file: &str| {
            let mut node = node_config("", true);
            node.config_file = file.to_string();
            network_config(vec![node])
        };
        let with_genesis = |genesis: &str| {
            let mut config = network_config(vec![node_config("", true)]);
            config.genesis = genesis.to_string();
            config
        };
        let mut no_key = node_config("", true);
        no_key.staking_key.clear();
        let mut no_cert = node_config("", true);
        no_cert.staking_cert.clear();
        let mut bad_pair = node_config("", true);
        bad_pair.staking_key = "nonempty".into();
        bad_pair.staking_cert = "nonempty".into();
        let mut no_impl = node_config("", true);
        no_impl.impl_specific_config = None;
        let mut bad_chain_config = node_config("", true);
        bad_chain_config.c_chain_config_file = "nonempty".into();

        let cases = vec![
            ("config file unmarshal", with_file("nonempty")),
            ("network id type", with_file("{\"network-id\": \"0\"}")),
            ("db dir type", with_file("{\"db-dir\": 0}")),
            ("log dir type", with_file("{\"log-dir\": 0}")),
            ("http port type", with_file("{\"http-port\": \"0\"}")),
            ("staking port type", with_file("{\"staking-port\": \"0\"}")),
            ("network id mismatch", with_file("{\"network-id\": 1}")),
            ("genesis unmarshal", with_genesis("nonempty")),
            ("no network id in genesis", with_genesis("{}")),
            ("network id type in genesis", with_genesis("{\"networkID\": \"0\"}")),
            ("no genesis", with_genesis("")),
            ("key without cert", network_config(vec![no_cert])),
            ("cert without key", network_config(vec![no_key])),
            ("invalid pair", network_config(vec![bad_pair])),
            ("no impl config", network_config(vec![no_impl])),
            ("bad chain config", network_config(vec![bad_chain_config])),
            ("no beacon", network_config(vec![node_config("", false)])),
            (
                "repeated name",
                network_config(vec![node_config("node0", true), node_config("node0", true)]),
            ),
        ];
        for (name, config) in cases {
            assert!(config.validate().is_err(), "{} should be invalid", name);
        }
    }

    #[test]
    fn matching_config_file_is_valid() {
        let mut node = node_config("", true);
        node.config_file =
            "{\"network-id\": 0, \"db-dir\": \"/db\", \"http-port\": 9650}".to_string();
        assert!(network_config(vec![node]).validate().is_ok());
    }

    #[test]
    fn descriptor_json_shape() {
        let mut node = node_config("node-0", true);
        node.c_chain_config_file = "{}".into();
        let value = serde_json::to_value(&node).unwrap();
        for field in &[
            "implSpecificConfig",
            "name",
            "isBeacon",
            "stakingKey",
            "stakingCert",
            "cChainConfigFile",
        ] {
            assert!(value.get(*field).is_some(), "missing {}", field);
        }
        assert!(value.get("configFile").is_none());
        let parsed: NodeConfig = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        let config = network_config(vec![node_config("a", true)]);
        config.save(&path).unwrap();
        assert_eq!(NetworkConfig::load(&path).unwrap(), config);
        assert!(NetworkConfig::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn merge_flags_node_wins() {
        let network: Flags = vec![("A".to_string(), json!(1)), ("B".to_string(), json!("x"))]
            .into_iter()
            .collect();
        let mut node: Flags = vec![("B".to_string(), json!("y")), ("C".to_string(), json!(2))]
            .into_iter()
            .collect();
        merge_flags(&network, &mut node);
        let expected: Flags = vec![
            ("A".to_string(), json!(1)),
            ("B".to_string(), json!("y")),
            ("C".to_string(), json!(2)),
        ]
        .into_iter()
        .collect();
        assert_eq!(node, expected);
    }

    #[test]
    fn flags_render() {
        assert_eq!(render_flag("log-level", &json!("DEBUG")), "--log-level=DEBUG");
        assert_eq!(render_flag("http-port", &json!(9650)), "--http-port=9650");
        assert_eq!(render_flag("staking-enabled", &json!(false)), "--staking-enabled=false");
    }

    fn flag_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<u32>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    proptest! {
        #[test]
        fn merged_flags_prefer_node(
            network in btree_map("[a-d]", flag_value(), 0..4),
            node in btree_map("[a-d]", flag_value(), 0..4),
        ) {
            let mut merged = node.clone();
            merge_flags(&network, &mut merged);
            for (key, value) in &merged {
                let expected = node.get(key).or_else(|| network.get(key));
                prop_assert_eq!(Some(value), expected);
            }
            prop_assert!(network.keys().chain(node.keys()).all(|k| merged.contains_key(k)));
        }
    }
}
