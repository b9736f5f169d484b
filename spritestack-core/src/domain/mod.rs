//! Core domain types
//!
//! This module contains the structures the controller reasons about.
//! Jobs are owned by the upstream queue and are read-only here; nodes and
//! dispatch outcomes are controller-side concepts.

pub mod dispatch;
pub mod job;
pub mod node;
