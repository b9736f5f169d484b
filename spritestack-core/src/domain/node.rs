//! Compute node domain model
//!
//! A compute node is a remote execution target that runs the agent process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An addressable execution target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeNode {
    /// Name of the node (e.g. the sprite name)
    pub name: String,

    /// Host name or IP address the node is reachable on
    pub address: String,
}

impl ComputeNode {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for ComputeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Parses `name=address`, or a bare `name` which is then also the address
impl FromStr for ComputeNode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, address) = match s.split_once('=') {
            Some((name, address)) => (name.trim(), address.trim()),
            None => (s, s),
        };

        if name.is_empty() {
            return Err(format!("node '{}' has an empty name", s));
        }
        if address.is_empty() {
            return Err(format!("node '{}' has an empty address", s));
        }

        Ok(Self::new(name, address))
    }
}

/// Result of a single liveness probe
///
/// Never cached beyond the dispatch attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeHealth {
    Healthy,
    Unhealthy { reason: String },
}

impl NodeHealth {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::Unhealthy {
            reason: reason.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeHealth::Healthy)
    }

    /// The failure reason, if the probe failed
    pub fn reason(&self) -> Option<&str> {
        match self {
            NodeHealth::Healthy => None,
            NodeHealth::Unhealthy { reason } => Some(reason),
        }
    }
}
