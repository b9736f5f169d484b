//! Data Transfer Objects for inter-service communication
//!
//! - `stack`: bodies exchanged with the upstream queue service
//! - `agent`: bodies exchanged between the controller and a node agent

pub mod agent;
pub mod stack;
