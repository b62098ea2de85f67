/// Reply written for every request when none is configured.
pub const DEFAULT_REPLY: &[u8] = b"+OK\r\n";

/// Initial capacity of each connection's inbound buffer.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;
