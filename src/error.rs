use thiserror::Error;
use crate::job::JobKey;

/// Reasons a persisted entry could not be turned back into a `ScheduledJob`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("unknown trigger type: {0}")]
    UnknownTriggerType(String),

    #[error("unsupported encoding version: {0}")]
    UnsupportedVersion(u32),

    #[error("malformed entry: {0}")]
    Malformed(String),
}

/// Errors produced by triggers, the codec, job queues, the scheduler and its workers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A job with the same key is already in the queue.
    #[error("job {0} is already scheduled")]
    DuplicateKey(JobKey),

    #[error("job {0} not found")]
    NotFound(JobKey),

    #[error("job queue is empty")]
    EmptyQueue,

    /// The trigger definition could not be parsed or is out of range.
    #[error("invalid trigger expression: {0}")]
    InvalidExpression(String),

    /// A job or trigger description cannot be encoded (usually a reserved separator in a value).
    #[error("invalid description: {0}")]
    InvalidDescription(String),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The job body kept failing after all of its retries.
    #[error("job {key} failed after {attempts} attempt(s): {message}")]
    DispatchFailure {
        key: JobKey,
        attempts: u32,
        message: String,
    },

    /// The trigger has no fire time left at the moment of scheduling.
    #[error("trigger for job {0} has no future fire time")]
    TriggerExhausted(JobKey),

    #[error("invalid scheduler state: {0}")]
    InvalidState(String),

    /// Failure reported by the durable store.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for SchedulerError {
    fn from(error: surrealdb::Error) -> Self {
        Self::Backend(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
