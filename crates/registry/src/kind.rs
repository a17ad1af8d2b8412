use std::fmt;
use std::str::FromStr;

use kb_core::KbError;
use serde::{Deserialize, Serialize};

/// The registry's closed set of entry kinds, stored as fixed strings in
/// the `kind` column. Modeled as an enum rather than a bare string so a
/// stale or malformed value fails to decode loudly instead of silently
/// matching nothing in a satellite reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryKind {
    /// Structural grouping node — never has a satellite table.
    Header,
    Status,
    Job,
    Stream,
    RpcServer,
    RpcClient,
}

impl RegistryKind {
    pub const SATELLITE_KINDS: [RegistryKind; 5] = [
        RegistryKind::Status,
        RegistryKind::Job,
        RegistryKind::Stream,
        RegistryKind::RpcServer,
        RegistryKind::RpcClient,
    ];

    /// Whether this kind's `properties` must carry a non-negative
    /// `queue_depth` integer.
    pub fn requires_queue_depth(self) -> bool {
        !matches!(self, RegistryKind::Header | RegistryKind::Status)
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistryKind::Header => "HEADER",
            RegistryKind::Status => "KB_STATUS_FIELD",
            RegistryKind::Job => "KB_JOB_QUEUE",
            RegistryKind::Stream => "KB_STREAM_FIELD",
            RegistryKind::RpcServer => "KB_RPC_SERVER_FIELD",
            RegistryKind::RpcClient => "KB_RPC_CLIENT_FIELD",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RegistryKind {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEADER" => Ok(RegistryKind::Header),
            "KB_STATUS_FIELD" => Ok(RegistryKind::Status),
            "KB_JOB_QUEUE" => Ok(RegistryKind::Job),
            "KB_STREAM_FIELD" => Ok(RegistryKind::Stream),
            "KB_RPC_SERVER_FIELD" => Ok(RegistryKind::RpcServer),
            "KB_RPC_CLIENT_FIELD" => Ok(RegistryKind::RpcClient),
            other => Err(KbError::Validation(format!("unknown registry kind {other:?}"))),
        }
    }
}
