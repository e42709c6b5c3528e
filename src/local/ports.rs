// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::Flags,
    error::{invalid_config, NetworkError, Result},
};
use serde_json::{Map, Value};
use std::{
    convert::TryFrom,
    net::{TcpListener, TcpStream},
};

/// Looks up the port for `key`, first in the node's flags and then in its config file.
/// Returns `None` when neither sets it, in which case the caller picks a free port.
pub fn get_port(
    flags: &Flags,
    config_file: &Map<String, Value>,
    key: &str,
) -> Result<Option<u16>> {
    if let Some(value) = flags.get(key) {
        let port = match value {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.parse::<u16>().ok(),
            _ => None,
        };
        return port
            .map(Some)
            .ok_or_else(|| invalid_config(format!("flag {:?} is not a port: {}", key, value)));
    }
    if let Some(value) = config_file.get(key) {
        let port = value
            .as_f64()
            .filter(|p| *p >= 0.0 && *p <= f64::from(u16::MAX))
            .ok_or_else(|| {
                invalid_config(format!("config file entry {:?} is not a port: {}", key, value))
            })?;
        return Ok(Some(port as u16));
    }
    Ok(None)
}

/// Returns the string stored under `key` in the config file, or `default` when absent.
pub fn get_config_entry(
    config_file: &Map<String, Value>,
    key: &str,
    default: &str,
) -> Result<String> {
    match config_file.get(key) {
        None => Ok(default.to_string()),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(invalid_config(format!(
            "expected config file entry {:?} to be a string, got {}",
            key, other
        ))),
    }
}

/// Return an ephemeral, available port. On unix systems, the port returned will be in the
/// TIME_WAIT state ensuring that the OS won't hand out this port for some grace period.
pub fn get_available_port() -> Result<u16> {
    const MAX_PORT_RETRIES: u32 = 1000;

    let mut last_error = None;
    for _ in 0..MAX_PORT_RETRIES {
        match get_ephemeral_port() {
            Ok(port) => return Ok(port),
            Err(e) => last_error = Some(e),
        }
    }
    Err(NetworkError::Io(
        "ephemeral port".to_string(),
        last_error.unwrap_or_else(|| std::io::ErrorKind::AddrNotAvailable.into()),
    ))
}

fn get_ephemeral_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("localhost", 0))?;
    let addr = listener.local_addr()?;

    // Connect and accept once so the port lingers in TIME_WAIT after we drop it.
    let _sender = TcpStream::connect(addr)?;
    let _incoming = listener.accept()?;

    Ok(addr.port())
}
