#[cfg(test)]
mod test_worker {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;
    use async_trait::async_trait;
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
    use crate::error::SchedulerError;
    use crate::job::{Job, JobDetail, JobDetailOptions, JobKey};
    use crate::sink::{ErrorSink, TracingErrorSink};
    use crate::tests::test_helper::{FlakyJob, SleepJob};
    use crate::worker::{execute, WorkerPool};

    fn detail(job: Arc<dyn Job>, name: &str, max_retries: u32, timeout: Option<Duration>) -> JobDetail {
        JobDetail::with_options(job, JobKey::new(name), JobDetailOptions {
            max_retries,
            timeout,
            replace: false,
        })
    }

    fn channel_pool(max_concurrent_jobs: usize) -> (WorkerPool, UnboundedReceiver<SchedulerError>) {
        let (sender, receiver): (UnboundedSender<SchedulerError>, UnboundedReceiver<SchedulerError>) = mpsc::unbounded_channel();
        (WorkerPool::new(max_concurrent_jobs, Arc::new(sender)), receiver)
    }

    struct PanicJob;

    #[async_trait]
    impl Job for PanicJob {
        async fn execute(&self) -> Result<(),String> {
            panic!("boom");
        }
        fn tag(&self) -> &str {
            "Panic"
        }
    }

    /// Tracks how many instances run at the same time.
    struct GaugeJob {
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for GaugeJob {
        async fn execute(&self) -> Result<(),String> {
            let now: usize = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
        fn tag(&self) -> &str {
            "Gauge"
        }
    }

    #[tokio::test]
    async fn test_retries_until_success(){
        let attempts: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let job: Arc<dyn Job> = Arc::new(FlakyJob { failures: 2, attempts: attempts.clone() });
        let result = execute(&detail(job, "flaky", 2, None)).await;
        assert_eq!(result,Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst),3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_reported(){
        let attempts: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let job: Arc<dyn Job> = Arc::new(FlakyJob { failures: 10, attempts: attempts.clone() });
        let (pool, mut receiver) = channel_pool(2);
        pool.submit(detail(job, "hopeless", 1, None));
        pool.wait().await;

        assert_eq!(attempts.load(Ordering::SeqCst),2);
        let reported: SchedulerError = receiver.recv().await.unwrap();
        assert_eq!(reported,SchedulerError::DispatchFailure {
            key: JobKey::new("hopeless"),
            attempts: 2,
            message: "attempt 2 failed".to_string(),
        });
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure(){
        let job: Arc<dyn Job> = Arc::new(SleepJob { millis: 500 });
        let result = execute(&detail(job, "slow", 0, Some(Duration::from_millis(20)))).await;
        match result {
            Err(SchedulerError::DispatchFailure { attempts, message, .. }) => {
                assert_eq!(attempts,1);
                assert!(message.contains("timed out"),"{}",message);
            }
            other => panic!("expected a dispatch failure, got {:?}",other),
        }
    }

    #[tokio::test]
    async fn test_panic_counts_as_failure(){
        let (pool, mut receiver) = channel_pool(1);
        pool.submit(detail(Arc::new(PanicJob), "panics", 1, None));
        pool.wait().await;
        match receiver.recv().await {
            Some(SchedulerError::DispatchFailure { key, attempts, message }) => {
                assert_eq!(key,JobKey::new("panics"));
                assert_eq!(attempts,2);
                assert_eq!(message,"job panicked");
            }
            other => panic!("expected a dispatch failure, got {:?}",other),
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded(){
        let running: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let peak: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let pool: WorkerPool = WorkerPool::new(3, Arc::new(TracingErrorSink));
        for i in 0..12 {
            let job: Arc<dyn Job> = Arc::new(GaugeJob { running: running.clone(), peak: peak.clone() });
            pool.submit(detail(job, format!("gauge-{}",i).as_str(), 0, None));
        }
        assert!(pool.in_flight() > 0);
        pool.wait().await;
        assert_eq!(pool.in_flight(),0);
        assert_eq!(running.load(Ordering::SeqCst),0);
        assert!(peak.load(Ordering::SeqCst) <= 3,"peak was {}",peak.load(Ordering::SeqCst));
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_submit_does_not_block(){
        let pool: WorkerPool = WorkerPool::new(0, Arc::new(TracingErrorSink));
        assert_eq!(pool.max_concurrent_jobs(),1);
        let started: std::time::Instant = std::time::Instant::now();
        for i in 0..4 {
            pool.submit(detail(Arc::new(SleepJob { millis: 100 }), format!("sleep-{}",i).as_str(), 0, None));
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(pool.in_flight(),4);
        pool.wait().await;
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver(){
        let (sender, receiver) = mpsc::unbounded_channel::<SchedulerError>();
        drop(receiver);
        sender.report(SchedulerError::EmptyQueue);
    }

    struct SlowFlagJob {
        done: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Job for SlowFlagJob {
        async fn execute(&self) -> Result<(),String> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.done.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn tag(&self) -> &str {
            "SlowFlag"
        }
    }

    #[tokio::test]
    async fn test_dropped_pool_lets_jobs_finish(){
        let done: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
        let pool: WorkerPool = WorkerPool::new(1, Arc::new(TracingErrorSink));
        pool.submit(detail(Arc::new(SlowFlagJob { done: done.clone() }), "slow-flag", 0, None));
        drop(pool);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(done.load(Ordering::SeqCst));
    }
}
