// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Writes the files a node needs to its directory and derives the flags pointing at them.

use crate::{
    config::{
        render_flag, NodeConfig, CHAIN_CONFIG_DIR_KEY, CONFIG_FILE_KEY, GENESIS_FILE_KEY,
        STAKING_CERT_PATH_KEY, STAKING_KEY_PATH_KEY,
    },
    error::{NetworkError, Result},
};
use serde_json::Value;
use std::{fs, path::Path};

pub const STAKING_KEY_FILE_NAME: &str = "staking.key";
pub const STAKING_CERT_FILE_NAME: &str = "staking.crt";
pub const GENESIS_FILE_NAME: &str = "genesis.json";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CHAIN_CONFIG_SUB_DIR: &str = "chainConfigs";
pub const C_CHAIN_ALIAS: &str = "C";

/// Creates `path`, along with any missing parent directories, and writes `contents` to it.
pub fn create_file_and_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NetworkError::Io(parent.display().to_string(), e))?;
    }
    fs::write(path, contents).map_err(|e| NetworkError::Io(path.display().to_string(), e))
}

/// Writes the staking key, staking cert and genesis of a node to `node_dir`, plus its config
/// file and C-Chain config file when given. Returns the flags pointing the node at the written
/// files.
pub fn write_files(genesis: &[u8], node_dir: &Path, config: &NodeConfig) -> Result<Vec<String>> {
    let mut files = vec![
        (
            STAKING_KEY_PATH_KEY,
            node_dir.join(STAKING_KEY_FILE_NAME),
            config.staking_key.as_bytes(),
        ),
        (
            STAKING_CERT_PATH_KEY,
            node_dir.join(STAKING_CERT_FILE_NAME),
            config.staking_cert.as_bytes(),
        ),
        (GENESIS_FILE_KEY, node_dir.join(GENESIS_FILE_NAME), genesis),
    ];
    if !config.config_file.is_empty() {
        files.push((
            CONFIG_FILE_KEY,
            node_dir.join(CONFIG_FILE_NAME),
            config.config_file.as_bytes(),
        ));
    }

    let mut flags = Vec::with_capacity(files.len() + 1);
    for (flag, path, contents) in files {
        create_file_and_write(&path, contents)?;
        flags.push(render_flag(flag, &path_value(&path)));
    }

    if !config.c_chain_config_file.is_empty() {
        let chain_config_dir = node_dir.join(CHAIN_CONFIG_SUB_DIR);
        create_file_and_write(
            &chain_config_dir.join(C_CHAIN_ALIAS).join(CONFIG_FILE_NAME),
            config.c_chain_config_file.as_bytes(),
        )?;
        flags.push(render_flag(
            CHAIN_CONFIG_DIR_KEY,
            &path_value(&chain_config_dir),
        ));
    }
    Ok(flags)
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}
