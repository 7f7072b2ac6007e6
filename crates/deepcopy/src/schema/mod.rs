//! Schema model: tables and references, validated once against the live
//! schema and immutable for the rest of the run.

mod policy;
mod table;

pub use policy::CopyPolicy;
pub use table::{BackReference, TableDescriptor, TableIdx, Tables};
