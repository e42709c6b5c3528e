// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Staking identities. A node's staking key is a hex encoded Ed25519 secret key and its staking
//! cert the hex encoded public key derived from it. The node ID is derived from the cert.

use crate::error::{invalid_config, Result};
use ed25519_dalek::{PublicKey, SecretKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::{fmt, str::FromStr};

pub const NODE_ID_LENGTH: usize = 20;

const NODE_ID_PREFIX: &str = "NodeID-";

/// The identity other peers know a validator by
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct NodeId([u8; NODE_ID_LENGTH]);

impl NodeId {
    pub fn new(bytes: [u8; NODE_ID_LENGTH]) -> Self {
        NodeId(bytes)
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let hash = Sha3_256::digest(public_key.as_bytes());
        let mut bytes = [0u8; NODE_ID_LENGTH];
        bytes.copy_from_slice(&hash[..NODE_ID_LENGTH]);
        NodeId(bytes)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NODE_ID_PREFIX, hex::encode(&self.0))
    }
}

impl FromStr for NodeId {
    type Err = crate::NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        let encoded = s
            .strip_prefix(NODE_ID_PREFIX)
            .ok_or_else(|| invalid_config(format!("node id {:?} lacks prefix", s)))?;
        let decoded = hex::decode(encoded)
            .map_err(|e| invalid_config(format!("node id {:?} is not hex: {}", s, e)))?;
        if decoded.len() != NODE_ID_LENGTH {
            return Err(invalid_config(format!(
                "node id {:?} has {} bytes, expected {}",
                s,
                decoded.len(),
                NODE_ID_LENGTH
            )));
        }
        let mut bytes = [0u8; NODE_ID_LENGTH];
        bytes.copy_from_slice(&decoded);
        Ok(NodeId(bytes))
    }
}

/// A freshly generated staking key and cert, both hex encoded.
#[derive(Clone, Debug)]
pub struct StakingIdentity {
    pub key: String,
    pub cert: String,
}

impl StakingIdentity {
    pub fn generate() -> Result<Self> {
        let seed: [u8; SECRET_KEY_LENGTH] = rand::thread_rng().gen();
        let secret = SecretKey::from_bytes(&seed)
            .map_err(|e| invalid_config(format!("unable to generate staking key: {}", e)))?;
        let public = PublicKey::from(&secret);
        Ok(Self {
            key: hex::encode(secret.as_bytes()),
            cert: hex::encode(public.as_bytes()),
        })
    }

    pub fn node_id(&self) -> Result<NodeId> {
        node_id_from_cert(&self.cert)
    }
}

fn decode_cert(cert: &str) -> Result<PublicKey> {
    let bytes = hex::decode(cert.trim())
        .map_err(|e| invalid_config(format!("staking cert is not hex: {}", e)))?;
    if bytes.len() != PUBLIC_KEY_LENGTH {
        return Err(invalid_config(format!(
            "staking cert has {} bytes, expected {}",
            bytes.len(),
            PUBLIC_KEY_LENGTH
        )));
    }
    PublicKey::from_bytes(&bytes)
        .map_err(|e| invalid_config(format!("invalid staking cert: {}", e)))
}

fn decode_key(key: &str) -> Result<SecretKey> {
    let bytes = hex::decode(key.trim())
        .map_err(|e| invalid_config(format!("staking key is not hex: {}", e)))?;
    SecretKey::from_bytes(&bytes).map_err(|e| invalid_config(format!("invalid staking key: {}", e)))
}

/// Checks that `key` and `cert` decode and that `cert` is the public half of `key`.
pub fn verify_key_pair(key: &str, cert: &str) -> Result<()> {
    let secret = decode_key(key)?;
    let public = decode_cert(cert)?;
    if PublicKey::from(&secret) != public {
        return Err(invalid_config("staking key and cert do not match"));
    }
    Ok(())
}

pub fn node_id_from_cert(cert: &str) -> Result<NodeId> {
    Ok(NodeId::from_public_key(&decode_cert(cert)?))
}
