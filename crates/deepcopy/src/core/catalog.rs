//! Extension catalog for explicit strategy registration.
//!
//! The configuration names reference implementations (`resolver: typed`) and
//! modifiers (`type: prefix`) by string. The [`ExtensionCatalog`] maps those
//! strings to factories. It is explicitly constructed and handed to the
//! schema loader, so unknown names surface as configuration errors at load
//! time and tests can register their own strategies.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ModifierConfig, ReferenceConfig};
use crate::extension::{ObjectModificator, PrefixModifier, SetValueModifier};
use crate::reference::{NormalReference, ReferenceDescriptor, TypedReference};
use crate::schema::{CopyPolicy, TableIdx};

/// Everything a reference factory needs to bind a reference.
pub struct ReferenceBuild<'a> {
    /// Table owning the reference.
    pub owner: TableIdx,
    /// Id of the owning table.
    pub owner_id: &'a str,
    /// The raw reference declaration.
    pub config: &'a ReferenceConfig,
    table_ids: &'a HashMap<String, TableIdx>,
}

impl<'a> ReferenceBuild<'a> {
    pub fn new(
        owner: TableIdx,
        owner_id: &'a str,
        config: &'a ReferenceConfig,
        table_ids: &'a HashMap<String, TableIdx>,
    ) -> Self {
        Self {
            owner,
            owner_id,
            config,
            table_ids,
        }
    }

    /// Resolve a table id to its index.
    pub fn table(&self, id: &str) -> Result<TableIdx, String> {
        self.table_ids
            .get(id)
            .copied()
            .ok_or_else(|| format!("target table '{}' does not exist", id))
    }

    /// The effective link column.
    pub fn link_column(&self) -> Result<String, String> {
        self.config
            .link_column()
            .ok_or_else(|| "reference has no link column".to_string())
    }

    pub fn forward_policy(&self) -> CopyPolicy {
        CopyPolicy::from_setting(self.config.forward.as_ref())
    }

    pub fn backward_policy(&self) -> CopyPolicy {
        CopyPolicy::from_setting(self.config.backward.as_ref())
    }

    /// A string property of the reference declaration.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.config.properties.get(key).and_then(|v| v.as_str())
    }
}

/// Builds a reference descriptor from its declaration.
pub type ReferenceFactory =
    Arc<dyn Fn(&ReferenceBuild<'_>) -> Result<Arc<dyn ReferenceDescriptor>, String> + Send + Sync>;

/// Builds a modifier from its declaration.
pub type ModifierFactory =
    Arc<dyn Fn(&ModifierConfig) -> Result<Arc<dyn ObjectModificator>, String> + Send + Sync>;

/// Registry of reference and modifier implementations.
///
/// # Example
///
/// ```rust,ignore
/// let mut catalog = ExtensionCatalog::with_builtins();
/// catalog.register_reference("contentset", Arc::new(ContentSetReference::build));
/// let tables = Tables::load_and_validate(&config, &live, &catalog)?;
/// ```
#[derive(Default)]
pub struct ExtensionCatalog {
    references: HashMap<String, ReferenceFactory>,
    modifiers: HashMap<String, ModifierFactory>,
}

impl ExtensionCatalog {
    /// Name used for references that declare a static target and no resolver.
    pub const DEFAULT_REFERENCE: &'static str = "normal";

    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the built-in strategies registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register_reference(Self::DEFAULT_REFERENCE, Arc::new(NormalReference::build));
        catalog.register_reference("typed", Arc::new(TypedReference::build));
        catalog.register_modifier("set", Arc::new(SetValueModifier::build));
        catalog.register_modifier("prefix", Arc::new(PrefixModifier::build));
        catalog
    }

    pub fn register_reference(&mut self, name: impl Into<String>, factory: ReferenceFactory) {
        self.references.insert(name.into(), factory);
    }

    pub fn register_modifier(&mut self, name: impl Into<String>, factory: ModifierFactory) {
        self.modifiers.insert(name.into(), factory);
    }

    /// Build the descriptor for a reference declaration.
    pub fn build_reference(
        &self,
        ctx: &ReferenceBuild<'_>,
    ) -> Result<Arc<dyn ReferenceDescriptor>, String> {
        let name = ctx
            .config
            .resolver
            .as_deref()
            .unwrap_or(Self::DEFAULT_REFERENCE);
        let factory = self
            .references
            .get(name)
            .ok_or_else(|| format!("unknown reference resolver '{}'", name))?;
        factory(ctx)
    }

    /// Build a modifier from its declaration.
    pub fn build_modifier(
        &self,
        config: &ModifierConfig,
    ) -> Result<Arc<dyn ObjectModificator>, String> {
        let factory = self
            .modifiers
            .get(&config.kind)
            .ok_or_else(|| format!("unknown modifier '{}'", config.kind))?;
        factory(config)
    }

    pub fn has_reference(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    pub fn has_modifier(&self, name: &str) -> bool {
        self.modifiers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicySetting;

    #[test]
    fn test_builtins_registered() {
        let catalog = ExtensionCatalog::with_builtins();
        assert!(catalog.has_reference("normal"));
        assert!(catalog.has_reference("typed"));
        assert!(catalog.has_modifier("set"));
        assert!(catalog.has_modifier("prefix"));
        assert!(!catalog.has_reference("contentset"));
    }

    #[test]
    fn test_build_normal_reference() {
        let catalog = ExtensionCatalog::with_builtins();
        let ids: HashMap<String, TableIdx> = [
            ("page".to_string(), TableIdx::new(0)),
            ("template".to_string(), TableIdx::new(1)),
        ]
        .into_iter()
        .collect();
        let config = ReferenceConfig {
            target: Some("template".into()),
            forward: Some(PolicySetting::Text("ask".into())),
            ..Default::default()
        };
        let reference = catalog
            .build_reference(&ReferenceBuild::new(TableIdx::new(0), "page", &config, &ids))
            .unwrap();
        assert_eq!(reference.name(), "page.template_id");
        assert_eq!(reference.forward_policy(), CopyPolicy::Ask);
        assert_eq!(reference.backward_policy(), CopyPolicy::Always);
    }

    #[test]
    fn test_unknown_resolver_and_target() {
        let catalog = ExtensionCatalog::with_builtins();
        let ids: HashMap<String, TableIdx> =
            [("page".to_string(), TableIdx::new(0))].into_iter().collect();

        let config = ReferenceConfig {
            resolver: Some("contentset".into()),
            column: Some("cs_id".into()),
            ..Default::default()
        };
        let err = catalog
            .build_reference(&ReferenceBuild::new(TableIdx::new(0), "page", &config, &ids))
            .unwrap_err();
        assert!(err.contains("unknown reference resolver"));

        let config = ReferenceConfig {
            target: Some("template".into()),
            ..Default::default()
        };
        let err = catalog
            .build_reference(&ReferenceBuild::new(TableIdx::new(0), "page", &config, &ids))
            .unwrap_err();
        assert!(err.contains("does not exist"));
    }
}
