// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use std::io;
use thiserror::Error;

pub type Result<T, E = NetworkError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// The network or node configuration is structurally invalid
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// A node name is already in use
    #[error("Node name conflict: {0}")]
    NameConflict(String),
    #[error("Node not found: {0}")]
    NotFound(String),
    /// Error reported by a node process. Surfaced as is.
    #[error(transparent)]
    Process(anyhow::Error),
    /// Returned by every operation once the network has been stopped
    #[error("Network stopped")]
    Stopped,
    #[error("Health check timed out: {0}")]
    HealthTimeout(String),
    /// One or more nodes failed to stop cleanly during network shutdown
    #[error("Failed to stop {} node(s): {}", .0.len(), format_stop_failures(.0))]
    StopFailed(Vec<(String, anyhow::Error)>),
    #[error("Error accessing {0}: {1}")]
    Io(String, #[source] io::Error),
}

impl NetworkError {
    pub fn is_stopped(&self) -> bool {
        matches!(self, NetworkError::Stopped)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkError::NotFound(_))
    }
}

pub(crate) fn invalid_config<T: Into<String>>(msg: T) -> NetworkError {
    NetworkError::InvalidConfig(msg.into())
}

fn format_stop_failures(failures: &[(String, anyhow::Error)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{}: {:#}", name, err))
        .collect::<Vec<_>>()
        .join("; ")
}
