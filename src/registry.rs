use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use crate::error::{DecodeError, Result, SchedulerError};
use crate::job::Job;

/// Builds a job body from the parameters stored in its description.
pub type JobFactory = Arc<dyn Fn(&[String]) -> std::result::Result<Arc<dyn Job>,String> + Send + Sync>;

/// Maps job type tags to the factories that rebuild them.
///
/// Every job type that may be read back from a durable queue must be registered
/// before the queue is used; entries with an unregistered tag cannot be decoded.
#[derive(Clone, Default)]
pub struct JobRegistry {
    items: HashMap<String, JobFactory>
}

impl JobRegistry {

    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `tag`. Returns `false` if the tag replaced an earlier registration.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F) -> bool
    where
        F: Fn(&[String]) -> std::result::Result<Arc<dyn Job>,String> + Send + Sync + 'static
    {
        self.items.insert(tag.into(), Arc::new(factory)).is_none()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.items.contains_key(tag)
    }

    /// Rebuilds a job from its tag and parameters.
    pub fn build(&self, tag: &str, params: &[String]) -> Result<Arc<dyn Job>> {
        match self.items.get(tag) {
            Some(factory) => factory(params).map_err(|error| {
                SchedulerError::from(DecodeError::Malformed(format!("job '{}' rejected its parameters: {}",tag,error)))
            }),
            None => Err(DecodeError::UnknownJobType(tag.to_string()).into())
        }
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.items.keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry").field("tags",&self.tags()).finish()
    }
}
