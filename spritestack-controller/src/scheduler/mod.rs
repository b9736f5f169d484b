//! Scheduler layer for the controller
//!
//! This layer drives the admission control loop: polling the upstream
//! queue on an interval, reserving the jobs it finds and handing reserved
//! jobs to the dispatch engine.

pub mod coordinator;
pub mod poller;

pub use coordinator::{BatchSummary, ReservationCoordinator};
pub use poller::{CycleSummary, PollError, QueuePoller};
