//! Background job services.

pub mod job_tracker;

pub use job_tracker::{Job, JobKind, JobStatus, JobTracker, LogEntry, LogLevel};
