#![forbid(unsafe_code)]

mod error;

pub use error::*;

// --- Namespace de chaves no store ---

pub const CACHE_KEY_PREFIX: &str = "cache:";
pub const LOCK_KEY_PREFIX: &str = "lock:";
pub const ID_COUNTER_PREFIX: &str = "icr:";
pub const FLASH_STOCK_PREFIX: &str = "seckill:stock:";
pub const FLASH_BUYERS_PREFIX: &str = "seckill:order:";

// --- TTLs e tuning padrão ---

pub const CACHE_TTL_SECS: u64 = 30 * 60; // 30 min
pub const CACHE_NULL_TTL_SECS: u64 = 2 * 60; // 2 min (marcador negativo)
pub const LOCK_TTL_SECS: u64 = 10;
pub const LOCK_RETRY_INTERVAL_MS: u64 = 50;
pub const LOCK_MAX_RETRIES: u32 = 20;

// --- Gerador de IDs ---

/// Epoch fixo do gerador: 2023-01-01T00:00:00Z.
pub const ID_EPOCH_SECS: i64 = 1_672_531_200;
/// Bits reservados para o contador diário.
pub const ID_COUNT_BITS: u32 = 32;

// --- Pool de rebuild ---

pub const REBUILD_WORKERS: usize = 10;
pub const REBUILD_QUEUE_CAPACITY: usize = 128;
