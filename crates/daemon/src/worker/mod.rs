// Background execution of queued sync jobs.

pub mod pool;
pub mod runner;

pub use pool::WorkerPool;
pub use runner::{TaskOutcome, TaskRunner};
