//! Environment-backed configuration, profiled the way
//! `stupid_core::config::Config` is: every key is first looked up as
//! `{PROFILE}_{KEY}`, falling back to the unprefixed `{KEY}`.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load `.env` (silently ignored if missing). Call once at process startup.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{profile}_{key}");
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// Build config from environment variables. Profile comes from
    /// `KB_PROFILE` (e.g. `PROD`); when set, every key is first looked up as
    /// `{PROFILE}_{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("KB_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        Self {
            profile: p.clone(),
            postgres: PostgresConfig::from_env_profiled(&p),
            retry: RetryConfig::from_env_profiled(&p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Redacted summary suitable for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("config loaded (profile: {})", self.profile_label());
        tracing::info!(
            "  postgres: host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
        tracing::info!(
            "  retry: max_attempts={}, base_delay_ms={}",
            self.retry.max_attempts,
            self.retry.base_delay_ms
        );
    }
}

// ── PostgreSQL ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "knowledge_base"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    /// Matches `stupid_core::config::PostgresConfig::is_configured` —
    /// callers use this to decide whether to skip database-backed tests and
    /// features rather than failing outright.
    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Retry defaults ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_attempts: profiled_env_u32(p, "KB_RETRY_MAX_ATTEMPTS", 5),
            base_delay_ms: profiled_env_u32(p, "KB_RETRY_BASE_DELAY_MS", 500) as u64,
            max_delay_ms: profiled_env_u32(p, "KB_RETRY_MAX_DELAY_MS", 8000) as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_profile() {
        let cfg = Config::for_profile("");
        assert_eq!(cfg.profile_label(), "default");
        assert_eq!(cfg.postgres.host, "localhost");
        assert_eq!(cfg.retry.max_attempts, 5);
    }
}
