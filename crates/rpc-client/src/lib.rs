pub mod inbox;
pub mod record;

pub use inbox::{RpcClientInbox, RpcClientInboxConfig};
pub use record::{PendingReply, PushedReply, RpcClientRow};

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::KbPath;

    #[tokio::test]
    async fn push_peek_release_round_trips() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping push_peek_release_round_trips: no database configured");
            return;
        };

        let client_path: KbPath = "rpc_client_test.round_trip".parse().unwrap();
        let server_path: KbPath = "rpc_server_test.round_trip".parse().unwrap();
        sqlx::query(
            "INSERT INTO rpc_client_table.rpc_client_table (client_path, server_path) VALUES ($1::ltree, $1::ltree)",
        )
        .bind(client_path.to_string())
        .execute(&pool)
        .await
        .unwrap();

        let inbox = RpcClientInbox::new(pool.clone(), RpcClientInboxConfig::default());
        assert_eq!(inbox.count_free(&client_path).await.unwrap(), 1);
        assert_eq!(inbox.count_queued(&client_path).await.unwrap(), 0);

        let pushed = inbox
            .push_reply(&client_path, None, &server_path, "compute", serde_json::json!({"result": 1}))
            .await
            .unwrap();

        assert_eq!(inbox.count_queued(&client_path).await.unwrap(), 1);

        let pending = inbox.peek_reply(&client_path).await.unwrap().expect("reply should be waiting");
        assert_eq!(pending.id, pushed.id);
        assert_eq!(pending.rpc_action, "compute");

        assert!(inbox.release(&client_path, pending.id).await.unwrap());
        assert_eq!(inbox.count_free(&client_path).await.unwrap(), 1);
        assert_eq!(inbox.count_queued(&client_path).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn push_reply_errors_when_no_free_slot() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping push_reply_errors_when_no_free_slot: no database configured");
            return;
        };

        let client_path: KbPath = "rpc_client_test.no_slots".parse().unwrap();
        let server_path: KbPath = "rpc_server_test.no_slots".parse().unwrap();
        let inbox = RpcClientInbox::new(pool, RpcClientInboxConfig::default());
        let err = inbox
            .push_reply(&client_path, None, &server_path, "compute", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, kb_core::KbError::ReplyInboxFull));
    }

    #[tokio::test]
    async fn count_free_on_unreconciled_path_is_no_matching_record() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping count_free_on_unreconciled_path_is_no_matching_record: no database configured");
            return;
        };

        let client_path: KbPath = "rpc_client_test.never_reconciled".parse().unwrap();
        let inbox = RpcClientInbox::new(pool, RpcClientInboxConfig::default());
        let err = inbox.count_free(&client_path).await.unwrap_err();
        assert!(matches!(err, kb_core::KbError::NoMatchingRecord));
    }
}
