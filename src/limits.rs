/// Longest request line the wire codec will buffer.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Concurrent client connections when `ROOMBOOK_MAX_CONNECTIONS` is unset.
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// How long shutdown waits for in-flight connections.
pub const DRAIN_TIMEOUT_SECS: u64 = 10;
