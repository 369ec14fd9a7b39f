//! Job execution: the pipeline stages behind each job kind, the bounded
//! executor that runs claimed jobs, and the worker binary's wiring.

pub mod adapters;
pub mod config;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod submitter;

pub use adapters::{ClipProcessor, ContentGenerator, DownloadedSource, Downloader, NullSink, ProgressSink, Uploader};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::Executor;
pub use pipeline::{Adapters, StageBounds};
pub use submitter::QueueSubmitter;
