//! Lifecycle event publishing for jobs and chunks.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
