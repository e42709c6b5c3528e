// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::config::NodeId;
use std::net::SocketAddr;

/// The beacons new nodes bootstrap from, in the order they joined.
#[derive(Clone, Debug, Default)]
pub struct BeaconSet {
    beacons: Vec<(SocketAddr, NodeId)>,
}

impl BeaconSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a beacon. Re-adding a known node ID updates its address.
    pub fn add(&mut self, addr: SocketAddr, id: NodeId) {
        match self.beacons.iter_mut().find(|(_, known)| *known == id) {
            Some(beacon) => beacon.0 = addr,
            None => self.beacons.push((addr, id)),
        }
    }

    /// Removes the beacon with the given ID, returning whether it was present.
    pub fn remove(&mut self, id: &NodeId) -> bool {
        let len = self.beacons.len();
        self.beacons.retain(|(_, known)| known != id);
        self.beacons.len() != len
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.beacons.iter().any(|(_, known)| known == id)
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// Comma separated beacon addresses, as passed to `--bootstrap-ips`
    pub fn ips_arg(&self) -> String {
        self.beacons
            .iter()
            .map(|(addr, _)| addr.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Comma separated beacon IDs, as passed to `--bootstrap-ids`
    pub fn ids_arg(&self) -> String {
        self.beacons
            .iter()
            .map(|(_, id)| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}
