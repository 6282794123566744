use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use surrealdb::RecordId;
use tracing::{debug, error, warn};
use crate::codec;
use crate::database::Db;
use crate::error::{Result, SchedulerError};
use crate::job::{JobKey, ScheduledJob};
use crate::queue::{matches_all, JobQueue, Matcher};
use crate::registry::JobRegistry;

pub const DEFAULT_TABLE: &str = "kairos_jobs";

/// Attempts `pop` makes when other instances keep taking the head first.
const MAX_POP_ATTEMPTS: usize = 32;

/// One queue entry: the encoded job plus the columns the queue orders and filters on.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueRecord {
    #[serde(skip_serializing_if="Option::is_none")]
    id: Option<RecordId>,
    job_group: String,
    job_name: String,
    job_type: String,
    trigger_type: String,
    next_run_time: i64,
    payload: String,
}

/// An entry that could not be decoded, kept with the reason it was rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineData {
    #[serde(skip_serializing_if="Option::is_none")]
    pub id: Option<RecordId>,
    pub job_key: String,
    pub payload: String,
    pub message: String,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Total {
    total: u64,
}

fn is_conflict(error: &surrealdb::Error) -> bool {
    let message: String = error.to_string().to_lowercase();
    message.contains("conflict") || message.contains("can be retried")
}

/// Job queue stored in SurrealDB, one record per job addressed by its key.
///
/// Several schedulers may share the same table: each mutation touches a single
/// record, and `pop` only hands out an entry to the caller whose delete actually
/// removed it.
#[derive(Debug, Clone)]
pub struct SurrealJobQueue {
    db: Arc<Db>,
    registry: Arc<JobRegistry>,
    table: String,
    quarantine_table: String,
}

impl SurrealJobQueue {

    pub fn new(db: Arc<Db>, registry: Arc<JobRegistry>) -> Self {
        Self::with_table(db, registry, DEFAULT_TABLE)
    }

    pub fn with_table(db: Arc<Db>, registry: Arc<JobRegistry>, table: impl Into<String>) -> Self {
        let table: String = table.into();
        Self {
            db,
            registry,
            quarantine_table: format!("{}_quarantine",table),
            table,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn to_record(job: &ScheduledJob) -> Result<QueueRecord> {
        let payload: String = String::from_utf8(codec::encode(job)?)
            .map_err(|error| SchedulerError::InvalidDescription(error.to_string()))?;
        Ok(QueueRecord {
            id: None,
            job_group: job.key().group().to_string(),
            job_name: job.key().name().to_string(),
            job_type: job.job_detail().job().tag().to_string(),
            trigger_type: job.trigger().tag().to_string(),
            next_run_time: job.next_run_time().timestamp_millis(),
            payload,
        })
    }

    fn decode(&self, record: &QueueRecord) -> Result<ScheduledJob> {
        codec::decode(record.payload.as_bytes(), &self.registry)
    }

    async fn fetch(&self, key: &JobKey) -> Result<Option<QueueRecord>> {
        Ok(self.db.client.select::<Option<QueueRecord>>((self.table.as_str(), codec::encode_key(key))).await?)
    }

    async fn head_record(&self) -> Result<Option<QueueRecord>> {
        let mut response = self.db.client.query(
            "SELECT * FROM type::table($table) ORDER BY next_run_time ASC, job_group ASC, job_name ASC LIMIT 1"
        )
        .bind(("table",self.table.clone())).await?;
        Ok(response.take::<Option<QueueRecord>>(0)?)
    }

    /// Decodes a record that has already left the queue, quarantining it if that fails.
    async fn decode_removed(&self, record: QueueRecord) -> Result<ScheduledJob> {
        match self.decode(&record) {
            Ok(job) => Ok(job),
            Err(error) => {
                self.quarantine(&record, &error).await;
                Err(error)
            }
        }
    }

    async fn quarantine(&self, record: &QueueRecord, reason: &SchedulerError) {
        let job_key: String = codec::encode_key(&JobKey::with_group(record.job_name.as_str(), record.job_group.as_str()));
        warn!(job_key = %job_key, reason = %reason, "quarantining undecodable job");
        let id: String = uuid::Uuid::new_v4().to_string();
        let data: QuarantineData = QuarantineData {
            id: None,
            job_key,
            payload: record.payload.clone(),
            message: reason.to_string(),
            date_created: Utc::now(),
        };
        if let Err(error) = self.db.client.create::<Option<QuarantineData>>((self.quarantine_table.as_str(), id)).content(data).await {
            error!("unable to quarantine job: {}",error);
        }
    }

    /// Entries removed from the queue because they could not be decoded.
    pub async fn quarantined(&self) -> Result<Vec<QuarantineData>> {
        let mut response = self.db.client.query("SELECT * FROM type::table($table) ORDER BY date_created ASC")
            .bind(("table",self.quarantine_table.clone())).await?;
        Ok(response.take::<Vec<QuarantineData>>(0)?)
    }
}

#[async_trait]
impl JobQueue for SurrealJobQueue {

    async fn push(&self, job: ScheduledJob) -> Result<()> {
        let record: QueueRecord = Self::to_record(&job)?;
        match self.db.client.create::<Option<QueueRecord>>((self.table.as_str(), codec::encode_key(job.key()))).content(record).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(SchedulerError::Backend(format!("unable to push job {}",job.key()))),
            Err(error) => {
                if self.fetch(job.key()).await?.is_some() {
                    return Err(SchedulerError::DuplicateKey(job.key().clone()));
                }
                Err(error.into())
            }
        }
    }

    async fn head(&self) -> Result<ScheduledJob> {
        match self.head_record().await? {
            Some(record) => self.decode(&record),
            None => Err(SchedulerError::EmptyQueue)
        }
    }

    async fn pop(&self) -> Result<ScheduledJob> {
        for attempt in 1..=MAX_POP_ATTEMPTS {
            let head: QueueRecord = self.head_record().await?.ok_or(SchedulerError::EmptyQueue)?;
            let id: RecordId = head.id.clone()
                .ok_or_else(|| SchedulerError::Backend(format!("record in {} has no id",self.table)))?;
            match self.db.client.delete::<Option<QueueRecord>>(id).await {
                Ok(Some(removed)) => return self.decode_removed(removed).await,
                Ok(None) => {
                    debug!(attempt, "head was taken by another consumer, retrying pop");
                }
                Err(error) if is_conflict(&error) => {
                    debug!(attempt, "write conflict while popping, retrying: {}",error);
                }
                Err(error) => return Err(error.into())
            }
        }
        Err(SchedulerError::Backend(format!("pop gave up after {} contended attempts",MAX_POP_ATTEMPTS)))
    }

    async fn get(&self, key: &JobKey) -> Result<ScheduledJob> {
        match self.fetch(key).await? {
            Some(record) => self.decode(&record),
            None => Err(SchedulerError::NotFound(key.clone()))
        }
    }

    async fn remove(&self, key: &JobKey) -> Result<ScheduledJob> {
        match self.db.client.delete::<Option<QueueRecord>>((self.table.as_str(), codec::encode_key(key))).await? {
            Some(record) => self.decode_removed(record).await,
            None => Err(SchedulerError::NotFound(key.clone()))
        }
    }

    async fn scheduled_jobs(&self, matchers: &[Matcher]) -> Result<Vec<ScheduledJob>> {
        let mut response = self.db.client.query(
            "SELECT * FROM type::table($table) ORDER BY next_run_time ASC, job_group ASC, job_name ASC"
        )
        .bind(("table",self.table.clone())).await?;
        let records: Vec<QueueRecord> = response.take::<Vec<QueueRecord>>(0)?;
        let mut jobs: Vec<ScheduledJob> = Vec::new();
        for record in records {
            match self.decode(&record) {
                Ok(job) => {
                    if matches_all(matchers, &job) {
                        jobs.push(job);
                    }
                }
                Err(error) => {
                    warn!(group = %record.job_group, name = %record.job_name, "skipping undecodable job: {}",error);
                }
            }
        }
        Ok(jobs)
    }

    async fn size(&self) -> Result<usize> {
        let mut response = self.db.client.query("SELECT count() AS total FROM type::table($table) GROUP ALL")
            .bind(("table",self.table.clone())).await?;
        let total: Option<Total> = response.take::<Option<Total>>(0)?;
        Ok(total.map(|item| item.total as usize).unwrap_or(0))
    }

    async fn clear(&self) -> Result<()> {
        self.db.client.query("DELETE type::table($table)")
            .bind(("table",self.table.clone())).await?
            .check()?;
        Ok(())
    }
}
