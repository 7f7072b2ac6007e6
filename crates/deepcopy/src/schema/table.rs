//! Table descriptors and schema-model loading.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::{CopyConfig, TableConfig};
use crate::controller::CopyController;
use crate::core::{ExtensionCatalog, LiveSchema, ReferenceBuild, Value};
use crate::error::{ConfigError, CopyError, Result};
use crate::extension::ObjectModificator;
use crate::reference::ReferenceDescriptor;

use super::CopyPolicy;

/// Stable index of a table inside [`Tables`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableIdx(usize);

impl TableIdx {
    pub fn new(idx: usize) -> Self {
        Self(idx)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TableIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reference of another table that can point at this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackReference {
    /// Table owning the reference.
    pub table: TableIdx,
    /// Position of the reference in the owner's reference list.
    pub reference: usize,
}

/// Validated, immutable description of one table.
#[derive(Debug)]
pub struct TableDescriptor {
    idx: TableIdx,
    id: String,
    name: String,
    cross: bool,
    root: bool,
    id_columns: Vec<String>,
    columns: Vec<String>,
    copyable_columns: Vec<String>,
    data_columns: Vec<String>,
    reference_columns: Vec<String>,
    references: Vec<Arc<dyn ReferenceDescriptor>>,
    back_references: Vec<BackReference>,
    deep_back_references: Vec<BackReference>,
    default_values: BTreeMap<String, Value>,
    omitted_columns: Vec<String>,
    modifiers: Vec<Arc<dyn ObjectModificator>>,
}

impl TableDescriptor {
    pub fn idx(&self) -> TableIdx {
        self.idx
    }

    /// Configured table id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Physical table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cross(&self) -> bool {
        self.cross
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Identity column(s): one for normal tables, the composite key for cross tables.
    pub fn id_columns(&self) -> &[String] {
        &self.id_columns
    }

    /// Identity column of a normal table.
    pub fn id_column(&self) -> Option<&str> {
        if self.cross {
            None
        } else {
            self.id_columns.first().map(String::as_str)
        }
    }

    /// Every physical column.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Physical columns minus omitted ones.
    pub fn copyable_columns(&self) -> &[String] {
        &self.copyable_columns
    }

    /// Copyable columns that are not reference columns; fetched lazily.
    pub fn data_columns(&self) -> &[String] {
        &self.data_columns
    }

    /// Columns always read during discovery: identity plus link columns.
    pub fn reference_columns(&self) -> &[String] {
        &self.reference_columns
    }

    /// Forward references, in declaration order.
    pub fn references(&self) -> &[Arc<dyn ReferenceDescriptor>] {
        &self.references
    }

    /// Every reference of any table that can point here.
    pub fn back_references(&self) -> &[BackReference] {
        &self.back_references
    }

    /// Back references whose backward policy is ALWAYS.
    pub fn deep_back_references(&self) -> &[BackReference] {
        &self.deep_back_references
    }

    pub fn default_values(&self) -> &BTreeMap<String, Value> {
        &self.default_values
    }

    pub fn omitted_columns(&self) -> &[String] {
        &self.omitted_columns
    }

    pub fn modifiers(&self) -> &[Arc<dyn ObjectModificator>] {
        &self.modifiers
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// The validated schema model of a copy run.
#[derive(Debug)]
pub struct Tables {
    tables: Vec<TableDescriptor>,
    by_id: HashMap<String, TableIdx>,
    root: TableIdx,
}

impl Tables {
    /// Validate the configuration against the live schema and build the model.
    ///
    /// Errors are collected rather than returned on the first problem, so a
    /// single load reports everything that is wrong with the configuration.
    pub fn load_and_validate(
        config: &CopyConfig,
        live: &LiveSchema,
        catalog: &ExtensionCatalog,
    ) -> std::result::Result<Tables, Vec<ConfigError>> {
        let mut errors = Vec::new();

        let by_id: HashMap<String, TableIdx> = config
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), TableIdx::new(i)))
            .collect();

        let roots: Vec<&TableConfig> = config.tables.iter().filter(|t| t.is_root()).collect();
        match roots.as_slice() {
            [] => errors.push(ConfigError::global("no table is marked as root")),
            [root] if root.cross => errors.push(ConfigError::table(
                &root.id,
                "a cross table cannot be the root table",
            )),
            [_] => {}
            many => errors.push(ConfigError::global(format!(
                "exactly one root table is allowed, found {}: {}",
                many.len(),
                many.iter().map(|t| t.id.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }

        let mut tables = Vec::with_capacity(config.tables.len());
        for (i, table_config) in config.tables.iter().enumerate() {
            tables.push(build_table(
                TableIdx::new(i),
                table_config,
                live,
                catalog,
                &by_id,
                &mut errors,
            ));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        link_back_references(&mut tables);

        let root = roots
            .first()
            .and_then(|t| by_id.get(&t.id).copied())
            .ok_or_else(|| vec![ConfigError::global("no table is marked as root")])?;

        debug!(
            "Schema model loaded: {} tables, root '{}'",
            tables.len(),
            tables[root.index()].id
        );

        Ok(Tables {
            tables,
            by_id,
            root,
        })
    }

    /// Build the model with the live schema reported by a controller.
    pub async fn from_controller(
        config: &CopyConfig,
        controller: &dyn CopyController,
        catalog: &ExtensionCatalog,
    ) -> Result<Tables> {
        let mut live = LiveSchema::new();
        for table in &config.tables {
            if let Some(columns) = controller
                .get_object_structure(table.physical_name())
                .await?
            {
                live.add_table(table.physical_name(), columns);
            }
        }
        Self::load_and_validate(config, &live, catalog).map_err(CopyError::InvalidSchema)
    }

    pub fn get(&self, idx: TableIdx) -> &TableDescriptor {
        &self.tables[idx.index()]
    }

    pub fn by_id(&self, id: &str) -> Option<&TableDescriptor> {
        self.by_id.get(id).map(|idx| self.get(*idx))
    }

    pub fn root(&self) -> &TableDescriptor {
        self.get(self.root)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Reference `position` of table `owner`.
    pub fn reference(&self, back: BackReference) -> &Arc<dyn ReferenceDescriptor> {
        &self.get(back.table).references[back.reference]
    }
}

fn build_table(
    idx: TableIdx,
    config: &TableConfig,
    live: &LiveSchema,
    catalog: &ExtensionCatalog,
    by_id: &HashMap<String, TableIdx>,
    errors: &mut Vec<ConfigError>,
) -> TableDescriptor {
    let name = config.physical_name().to_string();
    let columns = match live.columns(&name) {
        Some(columns) => columns.to_vec(),
        None => {
            errors.push(ConfigError::table(
                &config.id,
                format!("table '{}' does not exist", name),
            ));
            Vec::new()
        }
    };
    let table_exists = live.has_table(&name);
    let check_column = |column: &str, what: &str, errors: &mut Vec<ConfigError>| {
        if table_exists && !columns.iter().any(|c| c == column) {
            errors.push(ConfigError::item(
                &config.id,
                column,
                format!("{} column '{}' does not exist in '{}'", what, column, name),
            ));
        }
    };

    let id_columns = config.identity_columns();
    for column in &id_columns {
        check_column(column, "identity", errors);
    }

    let mut references = Vec::with_capacity(config.references.len());
    for (i, reference_config) in config.references.iter().enumerate() {
        let label = reference_config
            .link_column()
            .unwrap_or_else(|| format!("reference #{}", i + 1));
        let ctx = ReferenceBuild::new(idx, &config.id, reference_config, by_id);
        match catalog.build_reference(&ctx) {
            Ok(reference) => {
                for column in reference.needed_columns() {
                    check_column(&column, "reference", errors);
                }
                references.push(reference);
            }
            Err(message) => errors.push(ConfigError::item(&config.id, label, message)),
        }
    }

    let mut modifiers = Vec::with_capacity(config.modifiers.len());
    for modifier in &config.modifiers {
        match catalog.build_modifier(modifier) {
            Ok(m) => modifiers.push(m),
            Err(message) => errors.push(ConfigError::item(&config.id, &modifier.kind, message)),
        }
    }

    let mut reference_columns: Vec<String> = id_columns.clone();
    for reference in &references {
        for column in reference.needed_columns() {
            if !reference_columns.contains(&column) {
                reference_columns.push(column);
            }
        }
    }

    let omitted_columns = config.omitted_columns();
    let omitted: BTreeSet<&str> = omitted_columns.iter().map(String::as_str).collect();
    let copyable_columns: Vec<String> = columns
        .iter()
        .filter(|c| !omitted.contains(c.as_str()))
        .cloned()
        .collect();
    let data_columns = copyable_columns
        .iter()
        .filter(|c| !reference_columns.contains(c))
        .cloned()
        .collect();

    TableDescriptor {
        idx,
        id: config.id.clone(),
        name,
        cross: config.cross,
        root: config.is_root(),
        id_columns,
        columns,
        copyable_columns,
        data_columns,
        reference_columns,
        references,
        back_references: Vec::new(),
        deep_back_references: Vec::new(),
        default_values: config.default_values(),
        omitted_columns,
        modifiers,
    }
}

fn link_back_references(tables: &mut [TableDescriptor]) {
    let mut back: Vec<(TableIdx, BackReference, CopyPolicy)> = Vec::new();
    for table in tables.iter() {
        for (position, reference) in table.references.iter().enumerate() {
            for target in reference.possible_targets() {
                back.push((
                    target,
                    BackReference {
                        table: table.idx,
                        reference: position,
                    },
                    reference.backward_policy(),
                ));
            }
        }
    }
    for (target, back_reference, policy) in back {
        let table = &mut tables[target.index()];
        table.back_references.push(back_reference);
        if policy.is_always() {
            table.deep_back_references.push(back_reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
tables:
  - id: folder
    properties:
      root: true
      omit: [cdate]
      name_default: "copy"
    references:
      - { target: folder, column: mother_id, forward: true, backward: false }
  - id: folder_perm
    cross: true
    id_columns: [folder_id, group_id]
    references:
      - { target: folder, forward: true, backward: true }
      - { target: usergroup, column: group_id, forward: false, backward: false }
  - id: usergroup
  - id: content_link
    references:
      - resolver: typed
        column: obj_id
        properties: { type_column: obj_type, types: { "10002": folder } }
"#;

    fn live() -> LiveSchema {
        LiveSchema::new()
            .with_table("folder", ["id", "mother_id", "name", "cdate"])
            .with_table("folder_perm", ["folder_id", "group_id"])
            .with_table("usergroup", ["id", "name"])
            .with_table("content_link", ["id", "obj_type", "obj_id", "label"])
    }

    fn load() -> Tables {
        let config = CopyConfig::from_yaml(CONFIG).unwrap();
        Tables::load_and_validate(&config, &live(), &ExtensionCatalog::with_builtins()).unwrap()
    }

    #[test]
    fn test_column_sets() {
        let tables = load();
        let folder = tables.by_id("folder").unwrap();
        assert!(folder.is_root());
        assert_eq!(folder.id_column(), Some("id"));
        assert_eq!(folder.reference_columns(), ["id", "mother_id"]);
        assert_eq!(folder.copyable_columns(), ["id", "mother_id", "name"]);
        assert_eq!(folder.data_columns(), ["name"]);
        assert_eq!(folder.default_values().get("name"), Some(&Value::from("copy")));

        let link = tables.by_id("content_link").unwrap();
        assert_eq!(link.reference_columns(), ["id", "obj_id", "obj_type"]);
        assert_eq!(link.data_columns(), ["label"]);
    }

    #[test]
    fn test_identity_columns_are_reference_columns() {
        let tables = load();
        for table in tables.iter() {
            for column in table.id_columns() {
                assert!(table.reference_columns().contains(column));
            }
        }
        let perm = tables.by_id("folder_perm").unwrap();
        assert!(perm.is_cross());
        assert_eq!(perm.id_column(), None);
    }

    #[test]
    fn test_back_references() {
        let tables = load();
        let folder = tables.by_id("folder").unwrap();
        // mother_id, folder_perm.folder_id, content_link.obj_id
        assert_eq!(folder.back_references().len(), 3);
        let deep: Vec<&str> = folder
            .deep_back_references()
            .iter()
            .map(|b| tables.reference(*b).name())
            .collect();
        assert_eq!(deep, ["folder_perm.folder_id", "content_link.obj_id"]);

        let group = tables.by_id("usergroup").unwrap();
        assert_eq!(group.back_references().len(), 1);
        assert!(group.deep_back_references().is_empty());
    }

    #[test]
    fn test_errors_are_collected() {
        let yaml = r#"
tables:
  - id: page
    properties: { root: true }
    references:
      - { target: template }
      - { target: page, column: parent }
  - id: other
    properties: { root: true }
    modifiers:
      - type: shout
  - id: ghost
"#;
        let config = CopyConfig::from_yaml(yaml).unwrap();
        let live = LiveSchema::new()
            .with_table("page", ["id", "template_id"])
            .with_table("other", ["id"]);
        let errors =
            Tables::load_and_validate(&config, &live, &ExtensionCatalog::with_builtins())
                .unwrap_err();
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();

        assert_eq!(errors.len(), 5, "{:?}", messages);
        assert!(messages.iter().any(|m| m.contains("exactly one root")));
        assert!(messages.iter().any(|m| m.contains("'template' does not exist")));
        assert!(messages.iter().any(|m| m.contains("column 'parent'")));
        assert!(messages.iter().any(|m| m.contains("unknown modifier 'shout'")));
        assert!(messages.iter().any(|m| m.contains("table 'ghost' does not exist")));
    }

    #[test]
    fn test_cross_root_rejected() {
        let yaml = r#"
tables:
  - id: link
    cross: true
    id_columns: [a_id, b_id]
    properties: { root: true }
"#;
        let config = CopyConfig::from_yaml(yaml).unwrap();
        let live = LiveSchema::new().with_table("link", ["a_id", "b_id"]);
        let errors =
            Tables::load_and_validate(&config, &live, &ExtensionCatalog::with_builtins())
                .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("cannot be the root"));
    }
}
