use std::sync::Arc;
use tracing::{info, Level};
use crate::database::{Db, DbConnection};
use crate::durable_queue::SurrealJobQueue;
use crate::error::Result;
use crate::queue::{JobQueue, MemoryJobQueue};
use crate::registry::JobRegistry;
use crate::scheduler::{env_or, Scheduler, SchedulerConfig};

/// Installs the fmt subscriber. The level comes from `KAIROS_LOG_LEVEL` (default `INFO`).
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let level: Level = env_or("KAIROS_LOG_LEVEL", Level::INFO);
    let _ = tracing_subscriber::fmt().with_max_level(level).with_line_number(true).try_init();
}

/// Wires a [`Scheduler`] to its queue from configuration.
#[derive(Debug)]
pub struct Manager {
    scheduler: Scheduler,
    db: Option<Arc<Db>>,
}

impl Manager {

    /// Scheduler over an in-process queue; jobs do not survive a restart.
    pub fn in_memory(config: SchedulerConfig) -> Self {
        init_tracing();
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
        Self {
            scheduler: Scheduler::new(queue, config),
            db: None,
        }
    }

    /// Scheduler over a SurrealDB queue. `registry` must know every job type stored in the table.
    pub async fn durable(connection: Option<DbConnection>, config: SchedulerConfig, registry: JobRegistry) -> Result<Self> {
        init_tracing();
        let db: Arc<Db> = Arc::new(Db::new(connection).await?);
        let queue: Arc<dyn JobQueue> = Arc::new(SurrealJobQueue::with_table(
            db.clone(),
            Arc::new(registry),
            config.queue_table.clone(),
        ));
        info!(table = %config.queue_table, "using durable job queue");
        Ok(Self {
            scheduler: Scheduler::new(queue, config),
            db: Some(db),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Database handle of a durable manager.
    pub fn db(&self) -> Option<&Arc<Db>> {
        self.db.as_ref()
    }

    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    /// Stops the scheduler loop and waits for the jobs it already dispatched.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.scheduler.wait().await;
    }
}
