//! Compute node layer
//!
//! - `registry`: choosing a node for a job
//! - `transport`: starting the agent process on a node

pub mod registry;
pub mod transport;

pub use registry::{NodeSelector, RoundRobin, SingleNode};
pub use transport::{CommandTransport, HttpAgentTransport, NodeTransport, TransportError};
