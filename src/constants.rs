//! Crate-wide constants.

/// Default session timeout when the configuration does not override it.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;

/// Default per-operation timeout when the configuration does not override it.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 10_000;

/// Default coordination-service port.
pub const DEFAULT_PORT: u16 = 2181;

/// Timeout for establishing the TCP connection to a single endpoint.
pub const CONNECTION_TIMEOUT_MS: u64 = 1_000;

/// Maximum number of sub-operations packed into one multi-transaction
/// during bulk subtree removal. Caps both the transaction size and the
/// amount of per-node fallback work after a failed batch.
pub const MULTI_BATCH_SIZE: usize = 100;

/// Poll interval for liveness re-checks while waiting on a watch.
pub const DISAPPEAR_POLL_INTERVAL_MS: u64 = 1_000;
