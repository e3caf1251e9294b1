pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod links;
pub mod pool;
pub mod progress;
pub mod proxy;
pub mod queue;
pub mod types;

/// Convenient re-exports of the types most callers need.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::downloader::StreamingDownloader;
    pub use crate::pool::WorkerPool;
    pub use crate::progress::ProgressReporter;
    pub use crate::proxy::ProxyHealthChecker;
    pub use crate::queue::TargetQueue;
    pub use crate::types::{
        DownloadOutcome, FetchErrorKind, OutcomeReport, PoolConfig, ProxyStatus, RunSummary,
        Target,
    };
}
