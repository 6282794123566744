use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use crate::codec;
use crate::durable_queue::DEFAULT_TABLE;
use crate::error::{DecodeError, Result, SchedulerError};
use crate::job::{JobDetail, JobKey, ScheduledJob};
use crate::queue::{JobQueue, Matcher};
use crate::sink::{ErrorSink, TracingErrorSink};
use crate::trigger::Trigger;
use crate::worker::WorkerPool;

pub(crate) fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(value) => match value.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(variable = name, value = %value, "invalid configuration value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Scheduler settings. `Default` reads them from the environment.
///
/// - `poll_interval`: longest time the loop sleeps before looking at the queue again. `KAIROS_POLL_INTERVAL_MS`, default 1000.
/// - `misfire_threshold`: lateness after which a due job counts as misfired. `KAIROS_MISFIRE_THRESHOLD_MS`, default 5000.
/// - `max_concurrent_jobs`: job bodies running at once. `KAIROS_MAX_CONCURRENT_JOBS`, default 16.
/// - `queue_table`: table of the durable queue. `KAIROS_QUEUE_TABLE`, default `kairos_jobs`.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub misfire_threshold: Duration,
    pub max_concurrent_jobs: usize,
    pub queue_table: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(env_or("KAIROS_POLL_INTERVAL_MS", 1000)),
            misfire_threshold: Duration::from_millis(env_or("KAIROS_MISFIRE_THRESHOLD_MS", 5000)),
            max_concurrent_jobs: env_or("KAIROS_MAX_CONCURRENT_JOBS", 16),
            queue_table: env::var("KAIROS_QUEUE_TABLE").unwrap_or(DEFAULT_TABLE.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f,"Stopped"),
            Self::Running => write!(f,"Running"),
            Self::Stopping => write!(f,"Stopping"),
        }
    }
}

struct Shared {
    queue: Arc<dyn JobQueue>,
    workers: WorkerPool,
    sink: Arc<dyn ErrorSink>,
    config: SchedulerConfig,
    wake: Notify,
    state: watch::Sender<SchedulerState>,
}

impl Shared {
    /// Pops the due head, hands it to the workers and puts it back with its next fire time.
    /// Returns `false` when the queue failed and the loop should back off.
    async fn dispatch_due(&self, now: DateTime<Utc>) -> bool {
        let job: ScheduledJob = match self.queue.pop().await {
            Ok(job) => job,
            Err(SchedulerError::EmptyQueue) => return true,
            Err(error @ SchedulerError::Decode(_)) => {
                self.sink.report(error);
                return true;
            }
            Err(error) => {
                error!("unable to pop due job: {}",error);
                return false;
            }
        };
        if job.next_run_time() > now {
            debug!(job_key = %job.key(), "popped job is not due yet, putting it back");
            self.requeue(job).await;
            return true;
        }

        let lateness: TimeDelta = now - job.next_run_time();
        let misfired: bool = lateness.to_std().map(|lateness| lateness > self.config.misfire_threshold).unwrap_or(false);
        if misfired {
            warn!(job_key = %job.key(), late_ms = lateness.num_milliseconds(), "misfired job, firing once to catch up");
        }
        info!(job_key = %job.key(), "dispatching job");
        self.workers.submit(job.job_detail().clone());
        self.reschedule(job, now, misfired).await;
        true
    }

    async fn reschedule(&self, mut job: ScheduledJob, now: DateTime<Utc>, misfired: bool) {
        let next: Option<DateTime<Utc>> = if misfired {
            job.trigger().next_fire_time_after(job.next_run_time(), now)
        }
        else {
            job.trigger().next_fire_time(job.next_run_time())
        };
        match next {
            Some(next_run_time) => {
                job.advance(next_run_time);
                debug!(job_key = %job.key(), next_run_time = %job.next_run_time(), "rescheduling job");
                self.requeue(job).await;
            }
            None => info!(job_key = %job.key(), "trigger exhausted, job removed"),
        }
    }

    async fn requeue(&self, job: ScheduledJob) {
        if let Err(error) = self.queue.push(job).await {
            self.sink.report(error);
        }
    }

    /// Takes an undecodable head out of the queue so it cannot stall the loop.
    /// Returns `false` when the queue failed and the loop should back off.
    async fn discard_head(&self, error: DecodeError) -> bool {
        self.sink.report(error.into());
        match self.queue.pop().await {
            Ok(job) => {
                debug!(job_key = %job.key(), "head changed while discarding, putting it back");
                self.requeue(job).await;
                true
            }
            Err(SchedulerError::EmptyQueue) | Err(SchedulerError::Decode(_)) => true,
            Err(error) => {
                error!("unable to discard undecodable job: {}",error);
                false
            }
        }
    }
}

#[instrument(skip_all)]
async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    info!(poll_interval_ms = shared.config.poll_interval.as_millis() as u64, "scheduler loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let wait: Option<Duration> = match shared.queue.head().await {
            Ok(head) => {
                let now: DateTime<Utc> = Utc::now();
                match (head.next_run_time() - now).to_std() {
                    Ok(delay) if !delay.is_zero() => Some(delay.min(shared.config.poll_interval)),
                    _ => if shared.dispatch_due(now).await { None } else { Some(shared.config.poll_interval) },
                }
            }
            Err(SchedulerError::EmptyQueue) => Some(shared.config.poll_interval),
            Err(SchedulerError::Decode(error)) => {
                if shared.discard_head(error).await { None } else { Some(shared.config.poll_interval) }
            }
            Err(error) => {
                error!("unable to read queue head: {}",error);
                Some(shared.config.poll_interval)
            }
        };
        if let Some(wait) = wait {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shared.wake.notified() => {
                    debug!("scheduler woken up");
                }
                result = shutdown.changed() => {
                    if result.is_err() {
                        break;
                    }
                }
            }
        }
    }
    info!("scheduler loop stopped");
}

/// Trigger-driven scheduler over a [`JobQueue`].
///
/// Lifecycle: `new` → `start` → `stop` → `wait`. Dropping a running scheduler
/// also ends its loop; jobs it already dispatched run to completion.
pub struct Scheduler {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {

    pub fn new(queue: Arc<dyn JobQueue>, config: SchedulerConfig) -> Self {
        Self::with_error_sink(queue, config, Arc::new(TracingErrorSink))
    }

    pub fn with_error_sink(queue: Arc<dyn JobQueue>, config: SchedulerConfig, sink: Arc<dyn ErrorSink>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                queue,
                workers: WorkerPool::new(config.max_concurrent_jobs, sink.clone()),
                sink,
                config,
                wake: Notify::new(),
                state: watch::Sender::new(SchedulerState::Stopped),
            }),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    fn handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.borrow()
    }

    pub fn is_started(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.shared.queue
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.shared.workers
    }

    /// Spawns the control loop. Fails with `InvalidState` unless the scheduler is stopped.
    pub fn start(&self) -> Result<()> {
        let mut current: SchedulerState = SchedulerState::Stopped;
        let started: bool = self.shared.state.send_if_modified(|state| {
            current = *state;
            if *state != SchedulerState::Stopped {
                return false;
            }
            *state = SchedulerState::Running;
            true
        });
        if !started {
            return Err(SchedulerError::InvalidState(format!("cannot start a scheduler that is {}",current)));
        }
        self.shutdown.send_replace(false);
        let handle: JoinHandle<()> = tokio::spawn(run(self.shared.clone(), self.shutdown.subscribe()));
        *self.handle() = Some(handle);
        info!("scheduler started");
        Ok(())
    }

    /// Ends the control loop after its current step. Jobs already handed to the
    /// workers keep running; use [`Scheduler::wait`] to wait for them.
    /// Concurrent callers all return once the loop has stopped.
    pub async fn stop(&self) {
        let mut previous: SchedulerState = SchedulerState::Stopped;
        self.shared.state.send_if_modified(|state| {
            previous = *state;
            if *state != SchedulerState::Running {
                return false;
            }
            *state = SchedulerState::Stopping;
            true
        });
        match previous {
            SchedulerState::Stopped => return,
            SchedulerState::Stopping => {
                let mut state = self.shared.state.subscribe();
                let _ = state.wait_for(|state| *state == SchedulerState::Stopped).await;
                return;
            }
            SchedulerState::Running => {}
        }
        self.shutdown.send_replace(true);
        let handle: Option<JoinHandle<()>> = self.handle().take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                error!("scheduler loop ended abnormally: {}",error);
            }
        }
        self.shared.state.send_replace(SchedulerState::Stopped);
        info!("scheduler stopped");
    }

    /// Waits for every dispatched job to finish.
    pub async fn wait(&self) {
        self.shared.workers.wait().await
    }

    /// Schedules `job_detail` at the trigger's first fire time after now.
    ///
    /// Fails with `DuplicateKey` when the key is already scheduled, unless the
    /// job's `replace` option is set.
    pub async fn schedule_job(&self, job_detail: JobDetail, trigger: Trigger) -> Result<()> {
        let next_run_time: DateTime<Utc> = trigger.next_fire_time(Utc::now())
            .ok_or_else(|| SchedulerError::TriggerExhausted(job_detail.key().clone()))?;
        let job: ScheduledJob = ScheduledJob::new(job_detail, trigger, next_run_time);
        codec::validate(&job)?;
        if job.job_detail().options().replace {
            match self.shared.queue.remove(job.key()).await {
                Ok(_) | Err(SchedulerError::NotFound(_)) | Err(SchedulerError::Decode(_)) => {}
                Err(error) => return Err(error),
            }
        }
        let key: JobKey = job.key().clone();
        self.shared.queue.push(job).await?;
        info!(job_key = %key, next_run_time = %next_run_time, "job scheduled");
        self.shared.wake.notify_one();
        Ok(())
    }

    pub async fn get_scheduled_job(&self, key: &JobKey) -> Result<ScheduledJob> {
        self.shared.queue.get(key).await
    }

    pub async fn get_job_keys(&self, matchers: &[Matcher]) -> Result<Vec<JobKey>> {
        let jobs: Vec<ScheduledJob> = self.shared.queue.scheduled_jobs(matchers).await?;
        Ok(jobs.iter().map(|job| job.key().clone()).collect())
    }

    pub async fn delete_job(&self, key: &JobKey) -> Result<()> {
        self.shared.queue.remove(key).await?;
        info!(job_key = %key, "job deleted");
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Removes every scheduled job.
    pub async fn clear(&self) -> Result<()> {
        self.shared.queue.clear().await?;
        self.shared.wake.notify_one();
        Ok(())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state",&self.state())
            .field("config",&self.shared.config)
            .field("workers",&self.shared.workers)
            .finish()
    }
}
