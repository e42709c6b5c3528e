// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Spins up, monitors and tears down a network of validator processes on the local host so
//! that integration tests can run against a live multi-node network.

pub mod api;
pub mod config;
mod error;
pub mod local;
mod network;

pub use error::{NetworkError, Result};
pub use network::{Network, Node};
