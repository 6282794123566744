//! Byte encoding of [`ScheduledJob`] used by durable queues.
//!
//! An entry is a JSON envelope:
//!
//! ```json
//! {"version":1,"job":"Print::42","job_key":"reports::daily","options":{...},"trigger":"Interval::5000","next_run_time":1718000000000}
//! ```
//!
//! `job` and `trigger` are self-describing: their first `::`-separated token is
//! the type tag, the remaining tokens are the parameters. Inside `job` and
//! `job_key` every token has `\` and `:` escaped with a backslash, so a value
//! ending or starting with `:` cannot merge with a neighbouring separator.
//! `next_run_time` is in unix milliseconds.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::error::{DecodeError, Result, SchedulerError};
use crate::job::{JobDetail, JobDetailOptions, JobKey, ScheduledJob};
use crate::registry::JobRegistry;
use crate::trigger::Trigger;

/// Reserved separator between a tag and its parameters.
pub const SEPARATOR: &str = "::";

pub const ENCODING_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SerializedJob {
    version: u32,
    job: String,
    job_key: String,
    options: JobDetailOptions,
    trigger: String,
    next_run_time: i64,
}

fn ensure_no_separator(kind: &str, value: &str) -> Result<()> {
    if value.contains(SEPARATOR) {
        return Err(SchedulerError::InvalidDescription(format!(
            "{} '{}' contains the reserved separator '{}'",kind,value,SEPARATOR
        )));
    }
    Ok(())
}

fn escape(value: &str) -> String {
    let mut escaped: String = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == ':' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn join_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> String {
    tokens.into_iter().map(escape).collect::<Vec<String>>().join(SEPARATOR)
}

/// Splits on unescaped separators and unescapes every token.
fn split_tokens(value: &str) -> std::result::Result<Vec<String>, DecodeError> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current: String = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => return Err(DecodeError::Malformed(format!("dangling escape in '{}'",value))),
            },
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                tokens.push(std::mem::take(&mut current));
            }
            ':' => return Err(DecodeError::Malformed(format!("unescaped ':' in '{}'",value))),
            other => current.push(other),
        }
    }
    tokens.push(current);
    Ok(tokens)
}

/// Unambiguous text form of a key: escaped group and name joined by the separator.
/// Plain keys read the same as their `Display` form.
pub fn encode_key(key: &JobKey) -> String {
    join_tokens([key.group(), key.name()])
}

pub fn decode_key(value: &str) -> Result<JobKey> {
    match split_tokens(value)?.as_slice() {
        [group, name] => Ok(JobKey::with_group(name.as_str(), group.as_str())),
        _ => Err(DecodeError::Malformed(format!("job key '{}'",value)).into()),
    }
}

/// Checks that a scheduled job can be encoded without ambiguity.
pub fn validate(job: &ScheduledJob) -> Result<()> {
    let body = job.job_detail().job();
    let tag: &str = body.tag();
    if tag.is_empty() {
        return Err(SchedulerError::InvalidDescription("job tag must not be empty".to_string()));
    }
    ensure_no_separator("job tag", tag)?;
    for param in body.params() {
        ensure_no_separator("job parameter", param.as_str())?;
    }
    ensure_no_separator("job group", job.key().group())?;
    if let Trigger::Cron(expression) = job.trigger() {
        ensure_no_separator("cron expression", expression.as_str())?;
    }
    Ok(())
}

pub fn encode(job: &ScheduledJob) -> Result<Vec<u8>> {
    validate(job)?;
    let body = job.job_detail().job();
    let params: Vec<String> = body.params();
    let serialized: SerializedJob = SerializedJob {
        version: ENCODING_VERSION,
        job: join_tokens(std::iter::once(body.tag()).chain(params.iter().map(String::as_str))),
        job_key: encode_key(job.key()),
        options: job.job_detail().options().clone(),
        trigger: job.trigger().description(),
        next_run_time: job.next_run_time().timestamp_millis(),
    };
    serde_json::to_vec(&serialized)
        .map_err(|error| SchedulerError::InvalidDescription(error.to_string()))
}

/// Rebuilds a scheduled job, resolving the job tag through `registry`.
pub fn decode(bytes: &[u8], registry: &JobRegistry) -> Result<ScheduledJob> {
    let serialized: SerializedJob = serde_json::from_slice(bytes)
        .map_err(|error| DecodeError::Malformed(error.to_string()))?;
    if serialized.version != ENCODING_VERSION {
        return Err(DecodeError::UnsupportedVersion(serialized.version).into());
    }

    let mut tokens: Vec<String> = split_tokens(serialized.job.as_str())?;
    let tag: String = tokens.remove(0);
    let job = registry.build(tag.as_str(), &tokens)?;

    let key: JobKey = decode_key(serialized.job_key.as_str())?;

    let trigger: Trigger = Trigger::from_description(serialized.trigger.as_str()).map_err(|error| match error {
        SchedulerError::InvalidExpression(message) => SchedulerError::from(DecodeError::Malformed(message)),
        other => other,
    })?;

    let next_run_time: DateTime<Utc> = DateTime::from_timestamp_millis(serialized.next_run_time)
        .ok_or_else(|| DecodeError::Malformed(format!("next run time {} is out of range",serialized.next_run_time)))?;

    Ok(ScheduledJob::new(
        JobDetail::with_options(job, key, serialized.options),
        trigger,
        next_run_time,
    ))
}
