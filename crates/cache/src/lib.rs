#![forbid(unsafe_code)]

mod client;
mod executor;
mod idworker;
mod lock;
mod timed;

pub use client::{CacheClient, CacheConfig, Loader, LoaderFn, loader_fn};
pub use executor::RebuildExecutor;
pub use idworker::IdWorker;
pub use lock::DistributedLock;
pub use timed::TimedEntry;
