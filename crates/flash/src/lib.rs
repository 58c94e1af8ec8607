#![forbid(unsafe_code)]

mod coordinator;
mod order;

pub use coordinator::{FlashCoordinator, PurchaseOutcome};
pub use order::{MemoryOrderWriter, Order, OrderWriter, Promotion};
