pub mod inbox;
pub mod lock;
pub mod record;
pub mod state;

pub use inbox::{RpcServerInbox, RpcServerInboxConfig};
pub use record::{AdmittedRequest, ClaimedRequest, RpcServerRow};
pub use state::RpcServerState;

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::KbPath;

    #[tokio::test]
    async fn push_peek_complete_round_trips() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping push_peek_complete_round_trips: no database configured");
            return;
        };

        let path: KbPath = "rpc_server_test.round_trip".parse().unwrap();
        sqlx::query("INSERT INTO rpc_server_table.rpc_server_table (server_path) VALUES ($1::ltree)")
            .bind(path.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let inbox = RpcServerInbox::new(pool.clone(), RpcServerInboxConfig::default());
        assert_eq!(inbox.count_by_state(&path, RpcServerState::Empty).await.unwrap(), 1);

        let admitted = inbox
            .push(&path, None, "ping", serde_json::json!({}), "tag-1", 0, None)
            .await
            .unwrap();

        let claimed = inbox.peek(&path).await.unwrap().expect("job should be claimable");
        assert_eq!(claimed.id, admitted.id);
        assert_eq!(claimed.rpc_action, "ping");

        inbox.complete(&path, claimed.id).await.unwrap();
        assert_eq!(inbox.count_by_state(&path, RpcServerState::Empty).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn push_with_no_empty_slot_is_no_slot_available() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping push_with_no_empty_slot_is_no_slot_available: no database configured");
            return;
        };

        let path: KbPath = "rpc_server_test.no_slots".parse().unwrap();
        let inbox = RpcServerInbox::new(pool, RpcServerInboxConfig::default());
        let err = inbox
            .push(&path, None, "ping", serde_json::json!({}), "tag-1", 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, kb_core::KbError::NoSlotAvailable));
    }
}
