use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::codec::SEPARATOR;
use crate::trigger::{truncate_millis, Trigger};

pub const DEFAULT_GROUP: &str = "default";

/// A job body. Implementations are rebuilt from `tag()` and `params()` by a
/// [`JobRegistry`](crate::registry::JobRegistry) when read back from a durable queue.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self) -> std::result::Result<(),String>;

    /// Type tag the job is registered under.
    fn tag(&self) -> &str;

    /// Parameters needed to rebuild the job. Values must not contain the codec separator.
    fn params(&self) -> Vec<String> {
        Vec::new()
    }

    fn description(&self) -> String {
        let mut parts: Vec<String> = vec![self.tag().to_string()];
        parts.extend(self.params());
        parts.join(SEPARATOR)
    }
}

/// Unique identifier of a scheduled job: a name within a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    name: String,
    group: String,
}

impl JobKey {
    /// Key in the default group.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_group(name, DEFAULT_GROUP)
    }

    pub fn with_group(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,"{}{}{}",self.group,SEPARATOR,self.name)
    }
}

impl Ord for JobKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.group.cmp(&other.group).then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for JobKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Execution options of a job.
///
/// - `max_retries`: extra attempts after a failed execution. Default: 0
/// - `timeout`: (Optional) upper bound for a single attempt.
/// - `replace`: when scheduling, replace an existing job with the same key instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetailOptions {
    pub max_retries: u32,
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub replace: bool,
}

/// A job body bound to its key and options. Immutable once built.
#[derive(Clone)]
pub struct JobDetail {
    job: Arc<dyn Job>,
    key: JobKey,
    options: JobDetailOptions,
}

impl JobDetail {
    pub fn new(job: Arc<dyn Job>, key: JobKey) -> Self {
        Self::with_options(job, key, JobDetailOptions::default())
    }

    pub fn with_options(job: Arc<dyn Job>, key: JobKey, options: JobDetailOptions) -> Self {
        Self { job, key, options }
    }

    pub fn job(&self) -> &Arc<dyn Job> {
        &self.job
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn options(&self) -> &JobDetailOptions {
        &self.options
    }
}

impl fmt::Debug for JobDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDetail")
            .field("job",&self.job.description())
            .field("key",&self.key)
            .field("options",&self.options)
            .finish()
    }
}

/// A job detail bound to its trigger, carrying the next time it is due.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    job_detail: JobDetail,
    trigger: Trigger,
    next_run_time: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(job_detail: JobDetail, trigger: Trigger, next_run_time: DateTime<Utc>) -> Self {
        Self {
            job_detail,
            trigger,
            next_run_time: truncate_millis(next_run_time),
        }
    }

    pub fn job_detail(&self) -> &JobDetail {
        &self.job_detail
    }

    pub fn key(&self) -> &JobKey {
        self.job_detail.key()
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn next_run_time(&self) -> DateTime<Utc> {
        self.next_run_time
    }

    /// Moves the due time forward. Earlier values are ignored so the due time never regresses.
    pub(crate) fn advance(&mut self, next_run_time: DateTime<Utc>) {
        let next_run_time: DateTime<Utc> = truncate_millis(next_run_time);
        if next_run_time > self.next_run_time {
            self.next_run_time = next_run_time;
        }
    }

    /// Queue ordering: due time first, then job key.
    pub fn order_key(&self) -> (DateTime<Utc>, JobKey) {
        (self.next_run_time, self.key().clone())
    }
}
