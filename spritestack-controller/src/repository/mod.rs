//! Repository layer
//!
//! Repositories are stateless HTTP adapters that abstract communication
//! with the upstream queue service. They expose the narrow set of calls the
//! control loop needs, without any business logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod queue;

// Re-export traits
pub use queue::QueueRepository;

// Re-export implementations
pub use queue::HttpQueueRepository;
