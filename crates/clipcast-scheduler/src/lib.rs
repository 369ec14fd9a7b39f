//! Upload scheduling for ClipCast.
//!
//! This crate provides:
//! - Timezone-aware schedule creation and validation
//! - Bulk distribution patterns (interval, daily, custom)
//! - Durable schedule stores with restart recovery
//! - A periodic due-scan that hands fired schedules to the job queue

pub mod clock;
pub mod error;
pub mod pattern;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SchedulerError, SchedulerResult};
pub use pattern::DistributionPattern;
pub use scheduler::{JobSubmitter, Scheduler, SchedulerConfig};
pub use store::{JsonFileScheduleStore, MemoryScheduleStore, ScheduleStore};
