//! Copy orchestrator - main workflow coordinator.

mod copy;
mod discovery;

pub use discovery::{CopyRequest, Pass};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CopyConfig;
use crate::controller::{CopyContext, CopyController, UnsatisfiedLink};
use crate::error::Result;
use crate::extension::{ReferenceRestrictor, RuleRestrictor};
use crate::graph::{CreationCause, ObjectGraph};
use crate::schema::Tables;

use discovery::Discovery;

/// Default traversal depth ceiling.
pub const DEFAULT_MAX_DEPTH: usize = 10_000;

/// Copy orchestrator.
///
/// Drives discovery, the two copy passes and the relink pass against a
/// [`CopyController`]. The orchestrator itself never touches storage.
pub struct CopyOrchestrator {
    tables: Tables,
    controller: Arc<dyn CopyController>,
    restrictors: Vec<Arc<dyn ReferenceRestrictor>>,
    max_depth: usize,
    config_hash: String,
}

/// Result of a copy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Hash of the configuration the run used.
    pub config_hash: String,

    /// Objects in the identity map, placeholders excluded.
    pub objects_discovered: usize,

    /// Objects that left a new row behind.
    pub objects_copied: usize,

    /// Copied objects per table id.
    pub copied_per_table: BTreeMap<String, usize>,

    /// Original id → new id of every copied root object.
    pub root_id_map: BTreeMap<i64, i64>,

    /// Links reported to the controller as unsatisfied.
    pub unsatisfied_links: Vec<UnsatisfiedLink>,
}

impl CopyResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Outcome of discovery, without copying anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Root table id.
    pub root_table: String,

    /// Number of selected root objects.
    pub roots: usize,

    /// Objects that would be copied.
    pub objects: usize,

    /// Objects per table id.
    pub per_table: BTreeMap<String, usize>,

    /// Excluded objects kept as placeholders.
    pub placeholders: usize,

    /// Links that could not be resolved.
    pub unsatisfied_links: Vec<UnsatisfiedLink>,
}

impl DiscoveryReport {
    pub fn from_graph(graph: &ObjectGraph, tables: &Tables) -> Self {
        let mut per_table: BTreeMap<String, usize> =
            tables.iter().map(|t| (t.id().to_string(), 0)).collect();
        let mut roots = 0;
        let mut placeholders = 0;
        for (_, node) in graph.iter() {
            if node.is_excluded() {
                placeholders += 1;
                continue;
            }
            if node.creation_cause() == Some(&CreationCause::Root) {
                roots += 1;
            }
            *per_table
                .entry(tables.get(node.table()).id().to_string())
                .or_default() += 1;
        }

        Self {
            root_table: tables.root().id().to_string(),
            roots,
            objects: graph.len() - placeholders,
            per_table,
            placeholders,
            unsatisfied_links: graph.unsatisfied().to_vec(),
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl CopyOrchestrator {
    /// Create a new orchestrator.
    pub fn new(tables: Tables, controller: Arc<dyn CopyController>) -> Self {
        Self {
            tables,
            controller,
            restrictors: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            config_hash: String::new(),
        }
    }

    /// Create an orchestrator with the `copy` settings of a configuration
    /// applied: depth ceiling, restriction rules and config hash.
    pub fn from_config(
        config: &CopyConfig,
        tables: Tables,
        controller: Arc<dyn CopyController>,
    ) -> Self {
        let mut orchestrator = Self::new(tables, controller)
            .with_max_depth(config.copy.max_depth)
            .with_config_hash(config.hash());
        if !config.copy.restrictions.is_empty() {
            orchestrator = orchestrator.with_restrictor(Arc::new(RuleRestrictor::from_config(
                &config.copy.restrictions,
            )));
        }
        orchestrator
    }

    /// Add a traversal restrictor.
    #[must_use]
    pub fn with_restrictor(mut self, restrictor: Arc<dyn ReferenceRestrictor>) -> Self {
        self.restrictors.push(restrictor);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Run both discovery passes without copying anything.
    pub async fn discover(
        &self,
        request: &CopyRequest,
        cancel: &CancellationToken,
    ) -> Result<ObjectGraph> {
        let mut graph = ObjectGraph::new();
        self.discover_into(&mut graph, request, cancel).await?;
        Ok(graph)
    }

    async fn discover_into(
        &self,
        graph: &mut ObjectGraph,
        request: &CopyRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Discovery::new(
            &self.tables,
            self.controller.as_ref(),
            &self.restrictors,
            self.max_depth,
            cancel,
            graph,
        )
        .run(request)
        .await
    }

    /// Run the copy.
    ///
    /// On failure the controller's `handle_errors` hook is notified before
    /// the error is returned.
    pub async fn run(&self, request: &CopyRequest, cancel: CancellationToken) -> Result<CopyResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting copy run {} (controller: {})",
            run_id,
            self.controller.controller_type()
        );

        let mut graph = ObjectGraph::new();
        if let Err(e) = self.run_phases(&mut graph, request, &cancel).await {
            error!("Copy run {} failed: {}", run_id, e);
            if let Err(cleanup) = self.controller.handle_errors(&e).await {
                warn!("Error handler failed: {}", cleanup);
            }
            return Err(e);
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let result = self.build_result(&graph, run_id, started_at, completed_at, duration);

        info!(
            "Copy run {} completed: {} of {} objects copied in {:.2}s",
            result.run_id, result.objects_copied, result.objects_discovered, duration
        );
        Ok(result)
    }

    async fn run_phases(
        &self,
        graph: &mut ObjectGraph,
        request: &CopyRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.controller.start_copy().await?;

        info!("Phase 1: Discovering objects");
        self.discover_into(graph, request, cancel).await?;

        info!("Phase 2: Copying {} objects", graph.len());
        self.controller
            .begin_copy_objects(&CopyContext::new(&self.tables, graph))
            .await?;
        self.copy_normal_objects(graph, cancel).await?;

        info!("Phase 3: Copying cross-table objects");
        self.copy_cross_objects(graph, cancel).await?;

        info!("Phase 4: Relinking references");
        self.relink(graph, cancel).await?;

        info!("Phase 5: Finishing");
        let ctx = CopyContext::new(&self.tables, graph);
        self.controller.finish_copy_objects(&ctx).await?;
        self.controller.commit().await?;
        self.controller.post_commit(&ctx).await?;
        self.controller.finish_copy().await?;
        Ok(())
    }

    fn build_result(
        &self,
        graph: &ObjectGraph,
        run_id: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        duration_seconds: f64,
    ) -> CopyResult {
        let mut copied_per_table: BTreeMap<String, usize> = self
            .tables
            .iter()
            .map(|t| (t.id().to_string(), 0))
            .collect();
        let mut root_id_map = BTreeMap::new();
        let mut objects_discovered = 0;
        let mut objects_copied = 0;
        let root = self.tables.root().idx();

        for (_, node) in graph.iter() {
            if node.is_excluded() {
                continue;
            }
            objects_discovered += 1;
            if !node.copy_action().is_some_and(|a| a.has_new_row()) {
                continue;
            }
            objects_copied += 1;
            *copied_per_table
                .entry(self.tables.get(node.table()).id().to_string())
                .or_default() += 1;

            if node.table() == root {
                if let (Some(original), Some(new)) = (
                    node.original_id().as_single(),
                    node.new_id().and_then(|id| id.as_single()),
                ) {
                    root_id_map.insert(original, new);
                }
            }
        }

        CopyResult {
            run_id,
            status: "completed".to_string(),
            started_at,
            completed_at,
            duration_seconds,
            config_hash: self.config_hash.clone(),
            objects_discovered,
            objects_copied,
            copied_per_table,
            root_id_map,
            unsatisfied_links: graph.unsatisfied().to_vec(),
        }
    }
}
