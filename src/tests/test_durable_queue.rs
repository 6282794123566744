#[cfg(test)]
mod test_durable_queue {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;
    use chrono::{DateTime, TimeDelta, Utc};
    use fake::{Fake, faker::name::en::Name};
    use serde::{Deserialize, Serialize};
    use surrealdb::RecordId;
    use crate::database::Db;
    use crate::durable_queue::{QuarantineData, SurrealJobQueue};
    use crate::error::{DecodeError, SchedulerError};
    use crate::job::{JobDetail, JobKey, ScheduledJob};
    use crate::queue::{JobQueue, Matcher};
    use crate::registry::JobRegistry;
    use crate::tests::test_helper::{fire_log, memory_db, recording_job, test_registry, FireLog};
    use crate::trigger::Trigger;

    fn job(key: JobKey, next_run_time: DateTime<Utc>, log: &FireLog) -> ScheduledJob {
        ScheduledJob::new(
            JobDetail::new(recording_job(key.name(), log), key),
            Trigger::interval(Duration::from_secs(2)).unwrap(),
            next_run_time,
        )
    }

    async fn queue(log: &FireLog) -> (Arc<Db>, SurrealJobQueue) {
        let db: Arc<Db> = memory_db().await;
        let queue: SurrealJobQueue = SurrealJobQueue::new(db.clone(), Arc::new(test_registry(log)));
        (db, queue)
    }

    #[tokio::test]
    async fn test_push_pop_in_order(){
        let log: FireLog = fire_log();
        let (_db, queue) = queue(&log).await;
        let now: DateTime<Utc> = Utc::now();
        queue.push(job(JobKey::with_group("b", "g"), now + TimeDelta::seconds(20), &log)).await.unwrap();
        queue.push(job(JobKey::with_group("a", "g"), now + TimeDelta::seconds(10), &log)).await.unwrap();
        queue.push(job(JobKey::with_group("c", "g"), now + TimeDelta::seconds(10), &log)).await.unwrap();
        assert_eq!(queue.size().await.unwrap(),3);

        let head: ScheduledJob = queue.head().await.unwrap();
        assert_eq!(head.key(),&JobKey::with_group("a", "g"));
        assert_eq!(queue.size().await.unwrap(),3);

        let first: ScheduledJob = queue.pop().await.unwrap();
        assert_eq!(first.key(),&JobKey::with_group("a", "g"));
        assert_eq!(first.next_run_time(),head.next_run_time());
        assert_eq!(queue.pop().await.unwrap().key(),&JobKey::with_group("c", "g"));
        assert_eq!(queue.pop().await.unwrap().key(),&JobKey::with_group("b", "g"));
        assert_eq!(queue.pop().await.unwrap_err(),SchedulerError::EmptyQueue);
        assert_eq!(queue.head().await.unwrap_err(),SchedulerError::EmptyQueue);
    }

    #[tokio::test]
    async fn test_duplicate_get_remove(){
        let log: FireLog = fire_log();
        let (_db, queue) = queue(&log).await;
        let key: JobKey = JobKey::with_group(Name().fake::<String>(), "people");
        queue.push(job(key.clone(), Utc::now(), &log)).await.unwrap();
        let result = queue.push(job(key.clone(), Utc::now(), &log)).await;
        assert_eq!(result.unwrap_err(),SchedulerError::DuplicateKey(key.clone()));
        assert_eq!(queue.size().await.unwrap(),1);

        let stored: ScheduledJob = queue.get(&key).await.unwrap();
        assert_eq!(stored.job_detail().job().description(),format!("Record::{}",key.name()));
        queue.remove(&key).await.unwrap();
        assert_eq!(queue.get(&key).await.unwrap_err(),SchedulerError::NotFound(key.clone()));
        assert_eq!(queue.remove(&key).await.unwrap_err(),SchedulerError::NotFound(key));
        assert_eq!(queue.size().await.unwrap(),0);
    }

    #[tokio::test]
    async fn test_scheduled_jobs_and_clear(){
        let log: FireLog = fire_log();
        let (_db, queue) = queue(&log).await;
        let now: DateTime<Utc> = Utc::now();
        for i in 0..6 {
            let group: &str = if i % 2 == 0 { "even" } else { "odd" };
            queue.push(job(JobKey::with_group(format!("job-{}",i), group), now + TimeDelta::seconds(i), &log)).await.unwrap();
        }
        let even: Vec<ScheduledJob> = queue.scheduled_jobs(&[Matcher::group_equals("even")]).await.unwrap();
        let names: Vec<&str> = even.iter().map(|job| job.key().name()).collect();
        assert_eq!(names,vec!["job-0","job-2","job-4"]);
        assert_eq!(queue.scheduled_jobs(&[Matcher::group_equals("odd"), Matcher::name_equals("job-3")]).await.unwrap().len(),1);
        assert_eq!(queue.scheduled_jobs(&[Matcher::trigger_type("Interval")]).await.unwrap().len(),6);

        queue.clear().await.unwrap();
        assert_eq!(queue.size().await.unwrap(),0);
    }

    #[tokio::test]
    async fn test_keys_next_to_the_separator_get_their_own_records(){
        let log: FireLog = fire_log();
        let (_db, queue) = queue(&log).await;
        let left: JobKey = JobKey::with_group("n", "g:");
        let right: JobKey = JobKey::with_group(":n", "g");
        queue.push(job(left.clone(), Utc::now(), &log)).await.unwrap();
        queue.push(job(right.clone(), Utc::now() + TimeDelta::seconds(1), &log)).await.unwrap();
        assert_eq!(queue.size().await.unwrap(),2);
        assert_eq!(queue.get(&left).await.unwrap().key(),&left);
        assert_eq!(queue.get(&right).await.unwrap().key(),&right);
        assert_eq!(queue.pop().await.unwrap().key(),&left);
        assert_eq!(queue.remove(&right).await.unwrap().key(),&right);
    }

    #[tokio::test]
    async fn test_second_instance_resumes_from_store(){
        let log: FireLog = fire_log();
        let (db, queue) = queue(&log).await;
        let due: DateTime<Utc> = Utc::now() + TimeDelta::seconds(30);
        queue.push(job(JobKey::new("persisted"), due, &log)).await.unwrap();
        drop(queue);

        let restarted: SurrealJobQueue = SurrealJobQueue::new(db, Arc::new(test_registry(&log)));
        let job: ScheduledJob = restarted.pop().await.unwrap();
        assert_eq!(job.key(),&JobKey::new("persisted"));
        assert_eq!(job.next_run_time().timestamp_millis(),due.timestamp_millis());
    }

    #[tokio::test]
    async fn test_concurrent_pop_from_two_instances(){
        let log: FireLog = fire_log();
        let db: Arc<Db> = memory_db().await;
        let registry: Arc<JobRegistry> = Arc::new(test_registry(&log));
        let first: Arc<SurrealJobQueue> = Arc::new(SurrealJobQueue::new(db.clone(), registry.clone()));
        let second: Arc<SurrealJobQueue> = Arc::new(SurrealJobQueue::new(db.clone(), registry.clone()));
        let now: DateTime<Utc> = Utc::now();
        for i in 0..40 {
            first.push(job(JobKey::new(format!("job-{:02}",i)), now + TimeDelta::milliseconds(i % 7), &log)).await.unwrap();
        }

        let mut handles = Vec::new();
        for queue in [first.clone(), second.clone()] {
            handles.push(tokio::spawn(async move {
                let mut popped: Vec<JobKey> = Vec::new();
                loop {
                    match queue.pop().await {
                        Ok(job) => popped.push(job.key().clone()),
                        Err(SchedulerError::EmptyQueue) => break,
                        Err(error) => panic!("unexpected pop error: {}",error),
                    }
                }
                popped
            }));
        }
        let mut seen: HashSet<JobKey> = HashSet::new();
        for handle in handles {
            for key in handle.await.unwrap() {
                assert!(seen.insert(key.clone()),"{} was popped by both instances",key);
            }
        }
        assert_eq!(seen.len(),40);
        assert_eq!(second.size().await.unwrap(),0);
    }

    #[derive(Serialize, Deserialize)]
    struct RawRecord {
        #[serde(skip_serializing_if="Option::is_none")]
        id: Option<RecordId>,
        job_group: String,
        job_name: String,
        job_type: String,
        trigger_type: String,
        next_run_time: i64,
        payload: String,
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_quarantined(){
        let log: FireLog = fire_log();
        let (db, queue) = queue(&log).await;
        let key: JobKey = JobKey::new("ghost");
        let payload: String = serde_json::json!({
            "version": 1,
            "job": "Ghost::boo",
            "job_key": key.to_string(),
            "options": { "max_retries": 0, "timeout": null },
            "trigger": "Interval::1000",
            "next_run_time": Utc::now().timestamp_millis(),
        }).to_string();
        let created: Option<RawRecord> = db.client.create((queue.table(), key.to_string())).content(RawRecord {
            id: None,
            job_group: key.group().to_string(),
            job_name: key.name().to_string(),
            job_type: "Ghost".to_string(),
            trigger_type: "Interval".to_string(),
            next_run_time: Utc::now().timestamp_millis(),
            payload,
        }).await.unwrap();
        assert!(created.is_some());

        let unknown: SchedulerError = SchedulerError::Decode(DecodeError::UnknownJobType("Ghost".to_string()));
        assert_eq!(queue.head().await.unwrap_err(),unknown);
        assert!(queue.scheduled_jobs(&[]).await.unwrap().is_empty());
        assert_eq!(queue.pop().await.unwrap_err(),unknown);
        assert_eq!(queue.size().await.unwrap(),0);

        let quarantined: Vec<QuarantineData> = queue.quarantined().await.unwrap();
        assert_eq!(quarantined.len(),1);
        assert_eq!(quarantined[0].job_key,key.to_string());
        assert!(quarantined[0].message.contains("Ghost"));
    }
}
