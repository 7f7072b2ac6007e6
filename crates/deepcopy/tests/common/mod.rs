//! Shared fixtures for the engine tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deepcopy::config::ModifierConfig;
use deepcopy::extension::{ModifyContext, ObjectModificator};
use deepcopy::{
    CopyAction, CopyConfig, CopyContext, CopyController, CopyError, CopyOrchestrator, CopyOutcome,
    ExtensionCatalog, Exclusion, Filter, MemoryStorage, NodeId, ObjectId, ReadScope, Result, Row,
    StorageController, TableDescriptor, Tables, UnsatisfiedLink, UnsatisfiedLinkAction, Value,
};

/// A configuration plus the storage it runs against.
pub struct Harness {
    pub config: CopyConfig,
    pub storage: Arc<MemoryStorage>,
}

impl Harness {
    pub fn new(yaml: &str, storage: MemoryStorage) -> Self {
        Self {
            config: CopyConfig::from_yaml(yaml).expect("valid config"),
            storage: Arc::new(storage),
        }
    }

    pub fn controller(&self) -> Arc<StorageController<MemoryStorage>> {
        Arc::new(self.controller_inner())
    }

    /// A storage controller configured from the `copy` section.
    pub fn controller_inner(&self) -> StorageController<MemoryStorage> {
        StorageController::from_config(self.storage.clone(), &self.config.copy)
    }

    pub async fn orchestrator_with(&self, controller: Arc<dyn CopyController>) -> CopyOrchestrator {
        self.orchestrator_with_catalog(controller, &ExtensionCatalog::with_builtins())
            .await
    }

    pub async fn orchestrator_with_catalog(
        &self,
        controller: Arc<dyn CopyController>,
        catalog: &ExtensionCatalog,
    ) -> CopyOrchestrator {
        let tables = Tables::from_controller(&self.config, controller.as_ref(), catalog)
            .await
            .expect("schema model");
        CopyOrchestrator::from_config(&self.config, tables, controller)
    }

    pub async fn orchestrator(&self) -> CopyOrchestrator {
        self.orchestrator_with(self.controller()).await
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.storage.rows(table).expect("rows")
    }

    /// The row of `table` whose `id` column equals `id`.
    pub fn row(&self, table: &str, id: i64) -> Row {
        self.rows(table)
            .into_iter()
            .find(|r| r.get("id") == Some(&Value::Int(id)))
            .unwrap_or_else(|| panic!("{} {} not found", table, id))
    }
}

pub fn values<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

// Self-referencing folders with a permission join table.
pub const FOLDERS: &str = r#"
tables:
  - id: folder
    properties: { root: true }
    references:
      - { target: folder, column: mother_id, forward: true, backward: false }
  - id: folder_perm
    cross: true
    id_columns: [folder_id, group_id]
    references:
      - { target: folder, forward: true, backward: true }
      - { target: usergroup, column: group_id, forward: false, backward: false }
  - id: usergroup
"#;

pub fn folder(id: i64, mother_id: i64, name: &str) -> Row {
    values([
        ("id", Value::Int(id)),
        ("mother_id", Value::Int(mother_id)),
        ("name", Value::from(name)),
    ])
}

pub fn folder_storage() -> MemoryStorage {
    MemoryStorage::new()
        .with_table("folder", ["id", "mother_id", "name"])
        .with_table("folder_perm", ["folder_id", "group_id"])
        .with_table("usergroup", ["id", "name"])
        .with_rows("folder", [folder(1, 0, "root"), folder(2, 1, "sub")])
        .with_next_id("folder", 101)
        .with_rows(
            "folder_perm",
            [values([("folder_id", Value::Int(2)), ("group_id", Value::Int(9))])],
        )
        .with_rows(
            "usergroup",
            [values([("id", Value::Int(9)), ("name", Value::from("staff"))])],
        )
}

// Pages pointing at templates.
pub const PAGES: &str = r#"
tables:
  - id: page
    properties: { root: true }
    references:
      - { target: template, forward: true, backward: false }
  - id: template
"#;

pub fn page(id: i64, template_id: i64, title: &str) -> Row {
    values([
        ("id", Value::Int(id)),
        ("template_id", Value::Int(template_id)),
        ("title", Value::from(title)),
    ])
}

pub fn page_storage(pages: Vec<Row>, templates: &[i64]) -> MemoryStorage {
    MemoryStorage::new()
        .with_table("page", ["id", "template_id", "title"])
        .with_table("template", ["id", "name"])
        .with_rows("page", pages)
        .with_rows(
            "template",
            templates
                .iter()
                .map(|id| values([("id", Value::Int(*id)), ("name", Value::from("tpl"))])),
        )
}

/// Controller that records every hook call and checks phase ordering.
pub struct Recording {
    inner: StorageController<MemoryStorage>,
    events: Mutex<Vec<String>>,
}

impl Recording {
    pub fn new(inner: StorageController<MemoryStorage>) -> Self {
        Self {
            inner,
            events: Mutex::new(Vec::new()),
        }
    }

    fn log(&self, event: impl Into<String>) {
        self.events.lock().expect("events").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events").clone()
    }

    /// Index of the first event that is `name` or starts with `name `.
    pub fn position(&self, name: &str) -> usize {
        self.events()
            .iter()
            .position(|e| is_event(e, name))
            .unwrap_or_else(|| panic!("no '{}' event in {:?}", name, self.events()))
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| is_event(e, name)).count()
    }
}

fn is_event(event: &str, name: &str) -> bool {
    event == name || event.strip_prefix(name).is_some_and(|rest| rest.starts_with(' '))
}

#[async_trait]
impl CopyController for Recording {
    async fn start_copy(&self) -> Result<()> {
        self.log("start_copy");
        self.inner.start_copy().await
    }

    async fn finish_copy(&self) -> Result<()> {
        self.log("finish_copy");
        self.inner.finish_copy().await
    }

    async fn handle_errors(&self, error: &CopyError) -> Result<()> {
        self.log(format!("handle_errors {}", error));
        self.inner.handle_errors(error).await
    }

    async fn begin_copy_objects(&self, ctx: &CopyContext<'_>) -> Result<()> {
        self.log("begin_copy_objects");
        self.inner.begin_copy_objects(ctx).await
    }

    async fn finish_copy_objects(&self, ctx: &CopyContext<'_>) -> Result<()> {
        self.log("finish_copy_objects");
        self.inner.finish_copy_objects(ctx).await
    }

    async fn commit(&self) -> Result<()> {
        self.log("commit");
        self.inner.commit().await
    }

    async fn post_commit(&self, ctx: &CopyContext<'_>) -> Result<()> {
        self.log("post_commit");
        self.inner.post_commit(ctx).await
    }

    async fn get_object_structure(&self, table: &str) -> Result<Option<Vec<String>>> {
        self.inner.get_object_structure(table).await
    }

    async fn get_objects(&self, table: &TableDescriptor, filter: &Filter) -> Result<Vec<Row>> {
        self.inner.get_objects(table, filter).await
    }

    async fn get_object_by_id(
        &self,
        table: &TableDescriptor,
        id: &ObjectId,
        scope: ReadScope,
    ) -> Result<Option<Row>> {
        self.inner.get_object_by_id(table, id, scope).await
    }

    async fn copy_object(&self, ctx: &CopyContext<'_>, node: NodeId) -> Result<CopyOutcome> {
        let object = ctx.graph.node(node);
        let table = ctx.table_of(node);
        if table.is_cross() {
            for target in object.forward_refs().values().flatten() {
                let target = ctx.graph.node(*target);
                assert!(
                    target.is_excluded() || target.new_id().is_some(),
                    "cross row copied before its target"
                );
            }
        } else {
            assert!(object.new_id().is_none(), "object copied twice");
        }
        self.log(format!("copy {} {}", table.id(), object.original_id()));
        self.inner.copy_object(ctx, node).await
    }

    async fn update_object(
        &self,
        table: &TableDescriptor,
        id: &ObjectId,
        values: &Row,
    ) -> Result<()> {
        self.inner.update_object(table, id, values).await
    }

    async fn update_object_links(
        &self,
        ctx: &CopyContext<'_>,
        node: NodeId,
        values: &Row,
    ) -> Result<()> {
        let object = ctx.graph.node(node);
        assert!(object.new_id().is_some(), "relinked before copy");
        self.log(format!(
            "relink {} {}",
            ctx.table_of(node).id(),
            object.original_id()
        ));
        self.inner.update_object_links(ctx, node, values).await
    }

    async fn handle_unsatisfied_link(&self, link: &UnsatisfiedLink) -> Result<UnsatisfiedLinkAction> {
        self.log(format!("unsatisfied {} {}", link.reference, link.id));
        self.inner.handle_unsatisfied_link(link).await
    }

    async fn is_excluded(&self, table: &TableDescriptor, id: &ObjectId) -> Result<Exclusion> {
        self.inner.is_excluded(table, id).await
    }

    fn controller_type(&self) -> &str {
        "recording"
    }
}

/// Controller that answers `copy_object` with a fixed action for chosen rows.
///
/// `Updated` keeps the row in place (the new identity is the original one);
/// every other row goes to the wrapped storage controller.
pub struct Scripted {
    inner: StorageController<MemoryStorage>,
    actions: HashMap<(String, i64), CopyAction>,
    structures: Mutex<Vec<String>>,
}

impl Scripted {
    pub fn new(inner: StorageController<MemoryStorage>) -> Self {
        Self {
            inner,
            actions: HashMap::new(),
            structures: Mutex::new(Vec::new()),
        }
    }

    pub fn with_action(mut self, table: &str, id: i64, action: CopyAction) -> Self {
        self.actions.insert((table.to_string(), id), action);
        self
    }

    /// Rows `copy_object_structure` was called for, as "table id".
    pub fn structures(&self) -> Vec<String> {
        let mut seen = self.structures.lock().expect("structures").clone();
        seen.sort();
        seen
    }
}

#[async_trait]
impl CopyController for Scripted {
    async fn start_copy(&self) -> Result<()> {
        self.inner.start_copy().await
    }

    async fn handle_errors(&self, error: &CopyError) -> Result<()> {
        self.inner.handle_errors(error).await
    }

    async fn commit(&self) -> Result<()> {
        self.inner.commit().await
    }

    async fn get_object_structure(&self, table: &str) -> Result<Option<Vec<String>>> {
        self.inner.get_object_structure(table).await
    }

    async fn get_objects(&self, table: &TableDescriptor, filter: &Filter) -> Result<Vec<Row>> {
        self.inner.get_objects(table, filter).await
    }

    async fn get_object_by_id(
        &self,
        table: &TableDescriptor,
        id: &ObjectId,
        scope: ReadScope,
    ) -> Result<Option<Row>> {
        self.inner.get_object_by_id(table, id, scope).await
    }

    async fn copy_object(&self, ctx: &CopyContext<'_>, node: NodeId) -> Result<CopyOutcome> {
        let object = ctx.graph.node(node);
        let key = object
            .original_id()
            .as_single()
            .map(|id| (ctx.table_of(node).id().to_string(), id));
        match key.and_then(|key| self.actions.get(&key)) {
            Some(CopyAction::Updated) => Ok(CopyOutcome::updated(object.original_id().clone())),
            Some(CopyAction::Removed) => Ok(CopyOutcome::removed()),
            Some(CopyAction::Ignored) => Ok(CopyOutcome::ignored()),
            Some(CopyAction::Created) | None => self.inner.copy_object(ctx, node).await,
        }
    }

    async fn copy_object_structure(
        &self,
        ctx: &CopyContext<'_>,
        node: NodeId,
        new_id: &ObjectId,
    ) -> Result<()> {
        self.structures.lock().expect("structures").push(format!(
            "{} {}",
            ctx.table_of(node).id(),
            ctx.graph.node(node).original_id()
        ));
        self.inner.copy_object_structure(ctx, node, new_id).await
    }

    async fn update_object(
        &self,
        table: &TableDescriptor,
        id: &ObjectId,
        values: &Row,
    ) -> Result<()> {
        self.inner.update_object(table, id, values).await
    }

    async fn handle_unsatisfied_link(&self, link: &UnsatisfiedLink) -> Result<UnsatisfiedLinkAction> {
        self.inner.handle_unsatisfied_link(link).await
    }

    async fn is_excluded(&self, table: &TableDescriptor, id: &ObjectId) -> Result<Exclusion> {
        self.inner.is_excluded(table, id).await
    }

    fn controller_type(&self) -> &str {
        "scripted"
    }
}

/// Modifier (`type: record`) that remembers which action each row got.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    seen: Arc<Mutex<Vec<(String, CopyAction)>>>,
}

impl ActionLog {
    /// Catalog with the built-ins plus this log registered as `record`.
    pub fn catalog(&self) -> ExtensionCatalog {
        let mut catalog = ExtensionCatalog::with_builtins();
        let log = self.clone();
        catalog.register_modifier(
            "record",
            Arc::new(
                move |_: &ModifierConfig| -> std::result::Result<Arc<dyn ObjectModificator>, String> {
                    Ok(Arc::new(log.clone()))
                },
            ),
        );
        catalog
    }

    pub fn seen(&self) -> Vec<(String, CopyAction)> {
        let mut seen = self.seen.lock().expect("seen").clone();
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        seen
    }
}

#[async_trait]
impl ObjectModificator for ActionLog {
    fn name(&self) -> &str {
        "record"
    }

    async fn modify_object(
        &self,
        ctx: &ModifyContext<'_>,
        node: NodeId,
        action: CopyAction,
    ) -> Result<()> {
        let entry = format!(
            "{} {}",
            ctx.copy.table_of(node).id(),
            ctx.copy.graph.node(node).original_id()
        );
        self.seen.lock().expect("seen").push((entry, action));
        Ok(())
    }
}
