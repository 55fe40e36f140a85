use crate::time::TimestampSeconds;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Reserved sender address for system (mining reward) transactions
pub const SYSTEM_SENDER: &str = "0";

// previous_hash of the genesis block, accepted by convention
pub const GENESIS_PREVIOUS_HASH: &str = "0";

// Accounts are created lazily: the first time an address appears as a sender
// it is opened with this balance, recipients start empty
pub const INITIAL_SENDER_BALANCE: f64 = 100.0;

pub const DEFAULT_MINING_REWARD: f64 = 1.0;

// A block is mined as soon as exactly this many non-system transactions are
// pending on a miner node
pub const TRANSACTIONS_PER_BLOCK: usize = 3;

// Number of leading zero hex characters a block hash must carry
pub const DEFAULT_DIFFICULTY: usize = 4;

// bind address
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

pub const DEFAULT_MINING_INTERVAL_SECS: u64 = 30;

// Peers file, created on first start if absent
pub const DEFAULT_NODES_CONFIG_FILE: &str = "nodes_config.json";

// A peer that has not announced itself within this window is considered
// inactive until a direct probe proves otherwise
pub const ACTIVITY_TIMEOUT_SECS: TimestampSeconds = 300;

// Outbound HTTP timeouts
pub const LIVENESS_PROBE_TIMEOUT_SECS: u64 = 2;
pub const BROADCAST_TIMEOUT_SECS: u64 = 5;

// The rejected pool is diagnostics only, evict oldest entries past this size
pub const MAX_REJECTED_TRANSACTIONS: usize = 10_000;
