//! Extension points consulted by the orchestrator and controllers:
//!
//! - [`ReferenceRestrictor`]: vetoes traversal edges
//! - [`ObjectModificator`]: adjusts copied rows
//! - [`ExclusionPolicy`]: keeps rows out of the copy

mod exclusion;
mod modifier;
mod restrictor;

pub use exclusion::{ExclusionPolicy, StaticExclusions};
pub use modifier::{ModifyContext, ObjectModificator, PrefixModifier, SetValueModifier};
pub use restrictor::{ReferenceRestrictor, RuleRestrictor};
