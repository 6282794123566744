use chrono::{DateTime, Utc};
use crate::error::Result;
use crate::trigger::{CronExpression, Trigger};

/// Field-by-field builder for cron triggers. Every field defaults to `*`, except
/// day of week which defaults to `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    second: String,
    minute: String,
    hour: String,
    day_of_month: String,
    month: String,
    day_of_week: String,
}

impl Default for CronSchedule {
    fn default() -> Self {
        Self {
            second: "*".to_string(),
            minute: "*".to_string(),
            hour: "*".to_string(),
            day_of_month: "*".to_string(),
            month: "*".to_string(),
            day_of_week: "?".to_string(),
        }
    }
}

impl CronSchedule {

    pub fn new() -> Self {
        Self::default()
    }

    ///Format: second  minute   hour   day of month   month   day of week
    pub fn expression(&self) -> String {
        [
            self.second.as_str(),
            self.minute.as_str(),
            self.hour.as_str(),
            self.day_of_month.as_str(),
            self.month.as_str(),
            self.day_of_week.as_str(),
        ].join(" ")
    }

    /// Parses the composed expression into a cron [`Trigger`].
    pub fn trigger(&self) -> Result<Trigger> {
        Trigger::cron(self.expression().as_str())
    }

    /// Next matching instant after `datetime` (defaults to now).
    pub fn upcoming(&self, datetime: Option<DateTime<Utc>>) -> Result<Option<DateTime<Utc>>> {
        let expression: CronExpression = CronExpression::parse(self.expression().as_str())?;
        Ok(expression.next_after(datetime.unwrap_or(Utc::now())))
    }

    pub fn second(mut self, value: impl Into<String>) -> Self {
        self.second = value.into();
        self
    }
    pub fn minute(mut self, value: impl Into<String>) -> Self {
        self.minute = value.into();
        self
    }
    pub fn hour(mut self, value: impl Into<String>) -> Self {
        self.hour = value.into();
        self
    }
    pub fn day_of_month(mut self, value: impl Into<String>) -> Self {
        self.day_of_month = value.into();
        self
    }
    pub fn month(mut self, value: impl Into<String>) -> Self {
        self.month = value.into();
        self
    }
    pub fn day_of_week(mut self, value: impl Into<String>) -> Self {
        self.day_of_week = value.into();
        self
    }
}
