pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Leading zero bytes the stock shell validator demands.
pub const DEFAULT_DIFFICULTY_BYTES: usize = 3;
pub const DEFAULT_MAX_ATTEMPTS: u64 = i64::MAX as u64;
/// How many nonces a miner tries between progress events.
pub const PROGRESS_INTERVAL: u64 = 1 << 20;
