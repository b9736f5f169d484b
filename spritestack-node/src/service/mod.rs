//! Service Module
//!
//! Business logic layer for the node agent.

pub mod agent;

pub use agent::{AgentLauncher, LaunchError};
