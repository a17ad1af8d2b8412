use std::fmt;
use std::str::FromStr;

use kb_core::KbError;

/// A server-inbox slot's lifecycle: an admitted request sits as `new_job`
/// until a worker claims it (`processing`), then frees back to `empty` on
/// completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcServerState {
    Empty,
    NewJob,
    Processing,
}

impl fmt::Display for RpcServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcServerState::Empty => "empty",
            RpcServerState::NewJob => "new_job",
            RpcServerState::Processing => "processing",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RpcServerState {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty" => Ok(RpcServerState::Empty),
            "new_job" => Ok(RpcServerState::NewJob),
            "processing" => Ok(RpcServerState::Processing),
            other => Err(KbError::Validation(format!("unknown rpc server state {other:?}"))),
        }
    }
}
