//! classfeed/crates/cf-core/src/lib.rs
//!
//! The central domain logic and interface definitions for classfeed: the post
//! ordering engine, the submission lifecycle engine, and the ports they use.

pub mod audit;
pub mod error;
pub mod feed;
pub mod models;
pub mod retry;
pub mod submissions;
pub mod traits;

// Re-exporting for easier access in other crates
pub use audit::{FanoutAuditSink, TracingAuditSink};
pub use error::*;
pub use feed::{Direction, FeedEngine};
pub use models::*;
pub use retry::RetryPolicy;
pub use submissions::SubmissionEngine;
pub use traits::*;

/// Time source shared by the engines.
pub type SharedClock = std::sync::Arc<dyn mockable::Clock + Send + Sync>;
