//! Service layer
//!
//! Services contain the dispatch-side business logic of the controller:
//! probing node health, starting agents with bounded retries and reporting
//! jobs that could not be started.
//!
//! Seams are trait-based to enable testing and dependency injection.

mod dispatch;
mod health;
mod reporter;
mod retry;

// Re-export traits
pub use health::HealthGate;

// Re-export implementations
pub use dispatch::DispatchEngine;
pub use health::HttpHealthGate;
pub use reporter::FailureReporter;
pub use retry::RetryPolicy;
