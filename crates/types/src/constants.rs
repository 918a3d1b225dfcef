use solana_native_token::LAMPORTS_PER_SOL;

pub const DEFAULT_RPC_PORT: u16 = 8899;
pub const DEFAULT_WS_PORT: u16 = 8900;
pub const DEFAULT_NETWORK_HOST: &str = "127.0.0.1";
pub const DEFAULT_SLOT_TIME_MS: u64 = 1000;
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

pub const DEFAULT_FAUCET_KEYPAIR_PATH: &str = ".solforge/faucet.json";
pub const DEFAULT_FAUCET_TARGET_LAMPORTS: u64 = 500_000 * LAMPORTS_PER_SOL;
pub const DEFAULT_MAX_AIRDROP_LAMPORTS: u64 = 10_000 * LAMPORTS_PER_SOL;
pub const DEFAULT_MAX_TOP_UP_ITERATIONS: usize = 100;

/// Flat fee charged per signature by the embedded engine.
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Number of blocks a blockhash stays usable after it was issued.
pub const MAX_RECENT_BLOCKHASHES: u64 = 150;

pub const SLOTS_PER_EPOCH: u64 = 432_000;

/// Slot distance after which a recorded transaction is reported as `confirmed`.
pub const CONFIRMED_SLOT_DEPTH: u64 = 1;
/// Slot distance after which a recorded transaction is reported as `finalized`.
pub const FINALIZED_SLOT_DEPTH: u64 = 31;

pub const SIGNATURE_POLL_INTERVAL_MS: u64 = 50;
pub const SIGNATURE_POLL_MAX_ATTEMPTS: usize = 40;

pub const DEFAULT_SIGNATURES_FOR_ADDRESS_LIMIT: usize = 1000;
pub const DEFAULT_OWNER_SCAN_LIMIT: usize = 10_000;
pub const MAX_GET_BLOCKS_RANGE: u64 = 500_000;
