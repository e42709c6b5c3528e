// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! A [`Network`](crate::Network) whose nodes run as child processes of the current process.

mod bootstrap;
mod default_config;
mod files;
mod network;
mod node;
mod output;
mod ports;
mod process;

pub use bootstrap::BeaconSet;
pub use default_config::{
    default_genesis, default_network_config, DEFAULT_LOG_LEVEL, DEFAULT_NETWORK_ID,
    DEFAULT_NUM_NODES,
};
pub use files::{
    create_file_and_write, write_files, CHAIN_CONFIG_SUB_DIR, CONFIG_FILE_NAME,
    GENESIS_FILE_NAME, STAKING_CERT_FILE_NAME, STAKING_KEY_FILE_NAME,
};
pub use network::{LocalNetwork, NetworkDirectory};
pub use node::LocalNode;
pub use output::{shared_sink, ColorPicker, PrefixedWriter, SharedSink};
pub use ports::{get_available_port, get_config_entry, get_port};
pub use process::{
    LocalNodeConfig, LocalNodeProcess, LocalNodeProcessCreator, NodeProcess, NodeProcessCreator,
};
