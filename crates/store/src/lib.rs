#![forbid(unsafe_code)]

mod entry;
mod kv;
mod memory;

pub use entry::{Entry, Value};
pub use kv::{AdmitCode, KvStore};
pub use memory::MemoryStore;
