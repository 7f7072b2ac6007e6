//! Core abstractions shared by the schema model, the controllers and the
//! storage engines:
//!
//! - [`value`]: row values and object identities
//! - [`schema`]: live schema snapshot used for configuration validation
//! - [`traits`]: the storage capability the engine consumes
//! - [`catalog`]: registry mapping configuration names to strategy factories

pub mod catalog;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::{ExtensionCatalog, ModifierFactory, ReferenceBuild, ReferenceFactory};
pub use schema::LiveSchema;
pub use traits::{Condition, Filter, Storage};
pub use value::{row, ObjectId, Row, Value};
