//! kairos: a trigger-driven job scheduler with a pluggable, durable job queue.
//!
//! Jobs are registered as a [`JobDetail`] plus a [`Trigger`] (one-shot, fixed
//! interval or six-field cron). The [`Scheduler`] keeps them in a [`JobQueue`]
//! ordered by their next run time, sleeps until the head is due (or until an
//! earlier job is scheduled), hands the job body to a bounded [`WorkerPool`]
//! and puts the job back with its next fire time.
//!
//! Queues:
//! - [`MemoryJobQueue`]: in-process ordered map.
//! - [`SurrealJobQueue`]: SurrealDB table shared by any number of scheduler
//!   instances. Entries are stored with the [`codec`] envelope and rebuilt
//!   through a [`JobRegistry`].

pub mod codec;
pub mod cron_schedule;
pub mod database;
pub mod durable_queue;
pub mod error;
pub mod job;
pub mod manager;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod trigger;
pub mod worker;

pub use cron_schedule::CronSchedule;
pub use database::{Db, DbConnection};
pub use durable_queue::{QuarantineData, SurrealJobQueue};
pub use error::{DecodeError, Result, SchedulerError};
pub use job::{Job, JobDetail, JobDetailOptions, JobKey, ScheduledJob};
pub use manager::Manager;
pub use queue::{JobQueue, Matcher, MemoryJobQueue, StringOperator};
pub use registry::JobRegistry;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerState};
pub use sink::{ErrorSink, TracingErrorSink};
pub use trigger::Trigger;
pub use worker::WorkerPool;

#[cfg(test)]
mod tests;
