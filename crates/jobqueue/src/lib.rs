pub mod queue;
pub mod record;

pub use queue::{JobQueue, JobQueueConfig};
pub use record::{ClaimedJob, JobRecord};

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::KbPath;

    #[tokio::test]
    async fn push_claim_complete_round_trips() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping push_claim_complete_round_trips: no database configured");
            return;
        };

        let path: KbPath = "jobqueue_test.round_trip".parse().unwrap();
        sqlx::query("INSERT INTO job_table.job_table (path) VALUES ($1::ltree)")
            .bind(path.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let queue = JobQueue::new(pool.clone(), JobQueueConfig::default());
        assert_eq!(queue.count_free(&path).await.unwrap(), 1);

        let id = queue.push(&path, serde_json::json!({"task": "ping"})).await.unwrap();
        assert_eq!(queue.count_pending(&path).await.unwrap(), 1);

        let claimed = queue.claim(&path).await.unwrap().expect("job should be claimable");
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.data["task"], "ping");

        queue.complete(id).await.unwrap();
        assert_eq!(queue.count_free(&path).await.unwrap(), 1);
        assert_eq!(queue.count_pending(&path).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn push_errors_when_no_free_slot() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping push_errors_when_no_free_slot: no database configured");
            return;
        };

        let path: KbPath = "jobqueue_test.no_slots".parse().unwrap();
        let queue = JobQueue::new(pool, JobQueueConfig::default());
        let err = queue.push(&path, serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, kb_core::KbError::QueueFull));
    }

    #[tokio::test]
    async fn complete_unknown_id_is_no_matching_record() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping complete_unknown_id_is_no_matching_record: no database configured");
            return;
        };

        let queue = JobQueue::new(pool, JobQueueConfig::default());
        let err = queue.complete(i32::MAX).await.unwrap_err();
        assert!(matches!(err, kb_core::KbError::NoMatchingRecord));
    }
}
