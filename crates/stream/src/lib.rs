pub mod record;
pub mod stream;

pub use record::StreamRecord;
pub use stream::{Stream, StreamConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::KbPath;

    #[tokio::test]
    async fn push_overwrites_oldest_sample() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping push_overwrites_oldest_sample: no database configured");
            return;
        };

        let path: KbPath = "stream_test.ring".parse().unwrap();
        for _ in 0..2 {
            sqlx::query("INSERT INTO stream_table.stream_table (path) VALUES ($1::ltree)")
                .bind(path.to_string())
                .execute(&pool)
                .await
                .unwrap();
        }

        let stream = Stream::new(pool.clone());
        stream.push(&path, serde_json::json!({"v": 1})).await.unwrap();
        stream.push(&path, serde_json::json!({"v": 2})).await.unwrap();
        stream.push(&path, serde_json::json!({"v": 3})).await.unwrap();

        let rows = stream.list(&path, None, 0, None, None).await.unwrap();
        assert_eq!(rows.len(), 2, "ring buffer must stay at its declared depth");
        let values: Vec<_> = rows.iter().map(|r| r.data["v"].as_i64().unwrap()).collect();
        assert!(values.contains(&2) && values.contains(&3));
    }

    #[tokio::test]
    async fn push_with_no_rows_is_no_slot_available() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping push_with_no_rows_is_no_slot_available: no database configured");
            return;
        };

        let path: KbPath = "stream_test.empty".parse().unwrap();
        let stream = Stream::new(pool);
        let err = stream.push(&path, serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, kb_core::KbError::NoSlotAvailable));
    }
}
