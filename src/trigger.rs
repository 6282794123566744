use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use chrono::{DateTime, TimeDelta, Utc};
use crate::codec::SEPARATOR;
use crate::error::{DecodeError, Result, SchedulerError};

pub const ONE_SHOT_TAG: &str = "OneShot";
pub const INTERVAL_TAG: &str = "Interval";
pub const CRON_TAG: &str = "Cron";

/// Drops sub-millisecond precision so a timestamp survives the `i64` millisecond encoding unchanged.
pub(crate) fn truncate_millis(datetime: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(datetime.timestamp_millis()).unwrap_or(datetime)
}

/// A parsed six-field cron expression: `second minute hour day-of-month month day-of-week`.
#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,
    schedule: cron::Schedule,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self> {
        let source: String = expression.split_whitespace().collect::<Vec<&str>>().join(" ");
        let fields: usize = source.split(' ').filter(|field| !field.is_empty()).count();
        if fields != 6 {
            return Err(SchedulerError::InvalidExpression(format!(
                "expected 6 fields, got {} in '{}'",fields,expression
            )));
        }
        match cron::Schedule::from_str(source.as_str()) {
            Ok(schedule) => Ok(Self { source, schedule }),
            Err(error) => Err(SchedulerError::InvalidExpression(format!("{}: {}",expression,error))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Smallest matching instant strictly after `previous`.
    pub fn next_after(&self, previous: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&previous).next()
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronExpression {}

/// Decides when a job fires next. Triggers are pure: evaluating one never changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fires once at `fire_at`.
    OneShot { fire_at: DateTime<Utc> },
    /// Fires every `period`, counted from the previous fire time.
    Interval { period: Duration },
    Cron(CronExpression),
}

impl Trigger {

    pub fn one_shot(fire_at: DateTime<Utc>) -> Self {
        Self::OneShot { fire_at: truncate_millis(fire_at) }
    }

    /// One-shot trigger firing `delay` from now.
    pub fn run_once(delay: Duration) -> Result<Self> {
        let delay: TimeDelta = TimeDelta::from_std(delay)
            .map_err(|error| SchedulerError::InvalidExpression(error.to_string()))?;
        Ok(Self::one_shot(Utc::now() + delay))
    }

    pub fn interval(period: Duration) -> Result<Self> {
        let period: Duration = Duration::from_millis(period.as_millis() as u64);
        if period.is_zero() {
            return Err(SchedulerError::InvalidExpression("interval period must be at least 1ms".to_string()));
        }
        if TimeDelta::from_std(period).is_err() {
            return Err(SchedulerError::InvalidExpression(format!("interval period {:?} is out of range",period)));
        }
        Ok(Self::Interval { period })
    }

    pub fn cron(expression: &str) -> Result<Self> {
        Ok(Self::Cron(CronExpression::parse(expression)?))
    }

    /// Next fire time after `previous`, or `None` once the trigger is exhausted.
    pub fn next_fire_time(&self, previous: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::OneShot { fire_at } => {
                if previous < *fire_at {
                    Some(*fire_at)
                }
                else {
                    None
                }
            }
            Self::Interval { period } => {
                let period: TimeDelta = TimeDelta::from_std(*period).ok()?;
                previous.checked_add_signed(period)
            }
            Self::Cron(expression) => expression.next_after(previous),
        }
    }

    /// First fire time strictly after `now` that continues the sequence started at `previous`.
    /// Fire times in between are skipped.
    pub fn next_fire_time_after(&self, previous: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval { period } if previous < now => {
                let period: i64 = i64::try_from(period.as_millis()).ok()?.max(1);
                let steps: i64 = (now - previous).num_milliseconds() / period + 1;
                previous.checked_add_signed(TimeDelta::milliseconds(period.checked_mul(steps)?))
            }
            Self::Cron(expression) => expression.next_after(previous.max(now)),
            _ => {
                let mut next: Option<DateTime<Utc>> = self.next_fire_time(previous);
                while let Some(time) = next {
                    if time > now {
                        break;
                    }
                    next = self.next_fire_time(time);
                }
                next
            }
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::OneShot { .. } => ONE_SHOT_TAG,
            Self::Interval { .. } => INTERVAL_TAG,
            Self::Cron(_) => CRON_TAG,
        }
    }

    /// Self-describing form: the tag followed by the parameters, joined by the codec separator.
    pub fn description(&self) -> String {
        let parameter: String = match self {
            Self::OneShot { fire_at } => fire_at.timestamp_millis().to_string(),
            Self::Interval { period } => period.as_millis().to_string(),
            Self::Cron(expression) => expression.as_str().to_string(),
        };
        format!("{}{}{}",self.tag(),SEPARATOR,parameter)
    }

    /// Rebuilds a trigger from its [`Trigger::description`].
    pub fn from_description(description: &str) -> Result<Self> {
        let (tag, parameter) = description.split_once(SEPARATOR)
            .ok_or_else(|| DecodeError::Malformed(format!("trigger description '{}' has no parameters",description)))?;
        match tag {
            ONE_SHOT_TAG => {
                let millis: i64 = parameter.parse::<i64>()
                    .map_err(|error| DecodeError::Malformed(format!("one-shot fire time '{}': {}",parameter,error)))?;
                let fire_at: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| DecodeError::Malformed(format!("one-shot fire time {} is out of range",millis)))?;
                Ok(Self::one_shot(fire_at))
            }
            INTERVAL_TAG => {
                let millis: u64 = parameter.parse::<u64>()
                    .map_err(|error| DecodeError::Malformed(format!("interval period '{}': {}",parameter,error)))?;
                Self::interval(Duration::from_millis(millis))
            }
            CRON_TAG => Self::cron(parameter),
            other => Err(DecodeError::UnknownTriggerType(other.to_string()).into()),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,"{}",self.description())
    }
}
