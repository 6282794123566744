use tokio::sync::mpsc::UnboundedSender;
use tracing::error;
use crate::error::SchedulerError;

/// Receives failures that have no caller to return to: dispatch failures after
/// retries and entries the scheduler loop could not decode.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: SchedulerError);
}

/// Logs every reported error.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: SchedulerError) {
        error!("{}",error);
    }
}

impl ErrorSink for UnboundedSender<SchedulerError> {
    fn report(&self, error: SchedulerError) {
        if let Err(unsent) = self.send(error) {
            error!("error sink closed, dropping: {}",unsent.0);
        }
    }
}
