use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Deterministic 64-bit advisory lock key for a server path, used to admit
/// at most one request at a time into that path's inbox across processes.
/// `std::hash::Hasher` rather than a salted per-process hash — the key
/// must agree across every connection taking the lock.
pub fn advisory_lock_key(server_path: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    format!("rpc_server_table:{server_path}").hash(&mut hasher);
    hasher.finish() as i64
}
