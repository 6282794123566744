use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::error::{Result, SchedulerError};
use crate::job::{JobKey, ScheduledJob};

/// Ordered collection of scheduled jobs.
///
/// Entries are ordered by `next_run_time` ascending, ties broken by [`JobKey`] order,
/// and no two entries share a key. Every method is atomic with respect to other
/// callers of the same queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Inserts `job`. Fails with `DuplicateKey` if its key is already queued.
    async fn push(&self, job: ScheduledJob) -> Result<()>;

    /// Earliest-due entry, without removing it.
    async fn head(&self) -> Result<ScheduledJob>;

    /// Removes and returns the earliest-due entry.
    async fn pop(&self) -> Result<ScheduledJob>;

    async fn get(&self, key: &JobKey) -> Result<ScheduledJob>;

    async fn remove(&self, key: &JobKey) -> Result<ScheduledJob>;

    /// Entries satisfying every matcher, in queue order.
    async fn scheduled_jobs(&self, matchers: &[Matcher]) -> Result<Vec<ScheduledJob>>;

    async fn size(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOperator {
    Equals,
    StartsWith,
    EndsWith,
    Contains,
}

impl StringOperator {
    pub fn apply(&self, value: &str, pattern: &str) -> bool {
        match self {
            Self::Equals => value == pattern,
            Self::StartsWith => value.starts_with(pattern),
            Self::EndsWith => value.ends_with(pattern),
            Self::Contains => value.contains(pattern),
        }
    }
}

/// Predicate over a scheduled job, combined with logical AND in [`JobQueue::scheduled_jobs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Key(JobKey),
    Name(StringOperator, String),
    Group(StringOperator, String),
    /// Job body type tag.
    JobType(String),
    /// Trigger variant tag (`OneShot`, `Interval`, `Cron`).
    TriggerType(String),
}

impl Matcher {
    pub fn name_equals(name: impl Into<String>) -> Self {
        Self::Name(StringOperator::Equals, name.into())
    }

    pub fn group_equals(group: impl Into<String>) -> Self {
        Self::Group(StringOperator::Equals, group.into())
    }

    pub fn job_type(tag: impl Into<String>) -> Self {
        Self::JobType(tag.into())
    }

    pub fn trigger_type(tag: impl Into<String>) -> Self {
        Self::TriggerType(tag.into())
    }

    pub fn matches(&self, job: &ScheduledJob) -> bool {
        match self {
            Self::Key(key) => job.key() == key,
            Self::Name(operator, pattern) => operator.apply(job.key().name(), pattern),
            Self::Group(operator, pattern) => operator.apply(job.key().group(), pattern),
            Self::JobType(tag) => job.job_detail().job().tag() == tag.as_str(),
            Self::TriggerType(tag) => job.trigger().tag() == tag.as_str(),
        }
    }
}

pub fn matches_all(matchers: &[Matcher], job: &ScheduledJob) -> bool {
    matchers.iter().all(|matcher| matcher.matches(job))
}

#[derive(Debug, Default)]
struct Entries {
    ordered: BTreeMap<(DateTime<Utc>, JobKey), ScheduledJob>,
    due: HashMap<JobKey, DateTime<Utc>>,
}

impl Entries {
    fn take(&mut self, key: &JobKey) -> Option<ScheduledJob> {
        let next_run_time: DateTime<Utc> = self.due.remove(key)?;
        self.ordered.remove(&(next_run_time, key.clone()))
    }
}

/// In-process queue: an ordered map keyed by `(next_run_time, key)` plus a key index.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    entries: Mutex<Entries>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, job: ScheduledJob) -> Result<()> {
        let mut entries = self.entries();
        if entries.due.contains_key(job.key()) {
            return Err(SchedulerError::DuplicateKey(job.key().clone()));
        }
        entries.due.insert(job.key().clone(), job.next_run_time());
        entries.ordered.insert(job.order_key(), job);
        Ok(())
    }

    async fn head(&self) -> Result<ScheduledJob> {
        self.entries().ordered.values().next().cloned().ok_or(SchedulerError::EmptyQueue)
    }

    async fn pop(&self) -> Result<ScheduledJob> {
        let mut entries = self.entries();
        let ((_, key), job) = entries.ordered.pop_first().ok_or(SchedulerError::EmptyQueue)?;
        entries.due.remove(&key);
        Ok(job)
    }

    async fn get(&self, key: &JobKey) -> Result<ScheduledJob> {
        let entries = self.entries();
        entries.due.get(key)
            .and_then(|next_run_time| entries.ordered.get(&(*next_run_time, key.clone())))
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(key.clone()))
    }

    async fn remove(&self, key: &JobKey) -> Result<ScheduledJob> {
        self.entries().take(key).ok_or_else(|| SchedulerError::NotFound(key.clone()))
    }

    async fn scheduled_jobs(&self, matchers: &[Matcher]) -> Result<Vec<ScheduledJob>> {
        Ok(self.entries().ordered.values()
            .filter(|job| matches_all(matchers, job))
            .cloned()
            .collect())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.entries().due.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries();
        entries.ordered.clear();
        entries.due.clear();
        Ok(())
    }
}
