//! Pool construction, grounded on `stupid_server::db::init_pg_pool`'s
//! "connect, migrate, log; return `None` rather than panic if unconfigured"
//! idiom.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::PostgresConfig;

/// Connect and run the workspace-root `/migrations` directory. Returns
/// `None` (rather than an error) when no credentials are configured, so
/// callers — including integration tests — can treat "no database" as a
/// feature-disabled state instead of a hard failure.
pub async fn init_pool(config: &PostgresConfig) -> Option<PgPool> {
    if !config.is_configured() {
        info!("postgres not configured — coordination store disabled");
        return None;
    }
    let url = config.connection_string();
    match PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&url)
        .await
    {
        Ok(pool) => {
            info!(host = %config.host, db = %config.database, "connected to postgres");
            match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(_) => {
                    info!("migrations applied");
                    Some(pool)
                }
                Err(e) => {
                    warn!("migration failure: {e} — coordination store disabled");
                    None
                }
            }
        }
        Err(e) => {
            warn!("failed to connect to postgres: {e} — coordination store disabled");
            None
        }
    }
}

/// Convenience for integration tests: build config from the environment and
/// connect, or return `None` so the test can skip rather than fail when run
/// without a database. Test call sites log the skip with `tracing`'s test
/// writer disabled, matching how the rest of the ambient stack is silent in
/// CI runs without infrastructure.
pub async fn connect_for_tests() -> Option<PgPool> {
    crate::config::load_dotenv();
    let config = crate::config::Config::from_env();
    init_pool(&config.postgres).await
}
