//! Durable job queue for ClipCast.
//!
//! This crate provides:
//! - The `JobStore` abstraction with in-memory and Redis backends
//! - The `Orchestrator` submission/query API
//! - Best-effort progress fan-out via `ProgressHub`

pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod redis_store;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use orchestrator::Orchestrator;
pub use progress::{ProgressHub, ProgressStage, ProgressUpdate};
pub use redis_store::RedisJobStore;
pub use store::{JobStore, MemoryJobStore};
