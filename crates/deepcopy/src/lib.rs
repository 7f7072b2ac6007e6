//! # deepcopy
//!
//! Configuration-driven relational graph copy.
//!
//! Given a declarative description of tables and the references between
//! them, this library duplicates a selection of root rows together with
//! everything they need to stay internally consistent:
//!
//! - **Discovery** of the transitive closure over forward and backward
//!   references, with per-direction `always`/`never`/`ask` policies
//! - **Identity map** guaranteeing one node per (table, id), so cyclic data
//!   is copied exactly once
//! - **Two-pass copy**: normal tables first, then cross (join) tables with
//!   their links substituted by the new identities
//! - **Relink pass** rewriting stored references to the new identities
//! - **Pluggable backends** through the [`CopyController`] contract
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use deepcopy::{
//!     CopyConfig, CopyOrchestrator, CopyRequest, ExtensionCatalog, MemoryStorage,
//!     StorageController, Tables,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> deepcopy::Result<()> {
//!     let config = CopyConfig::load("deepcopy.yaml")?;
//!     let storage = Arc::new(MemoryStorage::load("data.json")?);
//!     let controller = Arc::new(StorageController::from_config(storage.clone(), &config.copy));
//!     let catalog = ExtensionCatalog::with_builtins();
//!     let tables = Tables::from_controller(&config, controller.as_ref(), &catalog).await?;
//!
//!     let orchestrator = CopyOrchestrator::from_config(&config, tables, controller);
//!     let result = orchestrator
//!         .run(&CopyRequest::ids([1]), CancellationToken::new())
//!         .await?;
//!     println!("Copied {} objects", result.objects_copied);
//!     storage.save("data.json")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod extension;
pub mod graph;
pub mod orchestrator;
pub mod reference;
pub mod schema;
pub mod storage;

// Re-exports for convenient access
pub use config::{CopyConfig, CopySettings, ReferenceConfig, TableConfig};
pub use controller::{
    CopyAction, CopyContext, CopyController, CopyOutcome, CrossExclusionPolicy, Exclusion,
    LinkFailure, ReadScope, StorageController, UnsatisfiedLink, UnsatisfiedLinkAction,
};
pub use crate::core::{ExtensionCatalog, Filter, LiveSchema, ObjectId, Row, Storage, Value};
pub use error::{ConfigError, CopyError, Result};
pub use graph::{NodeId, NodeKey, ObjectGraph, ObjectNode};
pub use orchestrator::{CopyOrchestrator, CopyRequest, CopyResult, DiscoveryReport};
pub use schema::{CopyPolicy, TableDescriptor, TableIdx, Tables};
pub use storage::MemoryStorage;
