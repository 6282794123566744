use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};
use crate::error::{Result, SchedulerError};
use crate::job::JobDetail;
use crate::sink::ErrorSink;

/// Job tasks of a pool. Dropping it detaches the tasks instead of aborting them,
/// so job bodies outlive the last handle to their pool.
#[derive(Default)]
struct Tasks(JoinSet<()>);

impl Drop for Tasks {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

/// Bounded executor for job bodies.
///
/// `submit` never waits: each job gets its own task, which holds one of
/// `max_concurrent_jobs` permits while the body runs. Dropping every clone of
/// the pool does not cancel jobs that are already submitted.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: Arc<Mutex<Tasks>>,
    sink: Arc<dyn ErrorSink>,
    max_concurrent_jobs: usize,
}

impl WorkerPool {
    pub fn new(max_concurrent_jobs: usize, sink: Arc<dyn ErrorSink>) -> Self {
        let max_concurrent_jobs: usize = max_concurrent_jobs.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            tasks: Arc::new(Mutex::new(Tasks::default())),
            sink,
            max_concurrent_jobs,
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Queues `job_detail` for execution and returns immediately.
    pub fn submit(&self, job_detail: JobDetail) {
        let semaphore: Arc<Semaphore> = self.semaphore.clone();
        let sink: Arc<dyn ErrorSink> = self.sink.clone();
        let mut tasks = self.tasks();
        while tasks.0.try_join_next().is_some() {}
        tasks.0.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(job_key = %job_detail.key(), "worker pool closed, skipping job");
                    return;
                }
            };
            if let Err(error) = execute(&job_detail).await {
                sink.report(error);
            }
        });
    }

    /// Jobs submitted and not yet finished, including those waiting for a permit.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks();
        while tasks.0.try_join_next().is_some() {}
        tasks.0.len()
    }

    /// Waits until every submitted job has finished.
    pub async fn wait(&self) {
        let mut tasks: JoinSet<()> = std::mem::take(&mut self.tasks().0);
        while let Some(result) = tasks.join_next().await {
            if let Err(error) = result {
                error!("worker task ended abnormally: {}",error);
            }
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_concurrent_jobs",&self.max_concurrent_jobs)
            .field("available_permits",&self.semaphore.available_permits())
            .finish()
    }
}

/// Runs a job body, retrying up to `max_retries` times. Each attempt is bounded by
/// the job's timeout when one is set, and a panicking body counts as a failed attempt.
/// Returns the number of attempts used.
#[instrument(skip_all, fields(job_key = %job_detail.key()))]
pub async fn execute(job_detail: &JobDetail) -> Result<u32> {
    let attempts: u32 = job_detail.options().max_retries.saturating_add(1);
    let mut message: String = String::new();
    for attempt in 1..=attempts {
        let run = AssertUnwindSafe(job_detail.job().execute()).catch_unwind();
        let outcome = match job_detail.options().timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(format!("timed out after {:?}",timeout))),
            },
            None => run.await,
        };
        match outcome {
            Ok(Ok(())) => {
                debug!(attempt, "job completed");
                return Ok(attempt);
            }
            Ok(Err(error)) => message = error,
            Err(_) => message = "job panicked".to_string(),
        }
        warn!(attempt, attempts, "job attempt failed: {}",message);
    }
    Err(SchedulerError::DispatchFailure {
        key: job_detail.key().clone(),
        attempts,
        message,
    })
}
