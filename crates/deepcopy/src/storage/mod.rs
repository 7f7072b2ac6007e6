//! Storage engines implementing [`Storage`](crate::core::Storage).

mod memory;

pub use memory::{Dataset, MemoryStorage, MemoryTable};
