//! Interfaces to the systems around the engine.
//!
//! All calls are blocking and receive the request context; implementations
//! must be shareable across threads.
pub mod memory;

use crate::graph::{ExecutionNode, QueryComponent};
use crate::store::{EntityMeta, MultiEntityData, Series};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use memory::{KeywordTermResolver, MemoryDataSource, MemoryProgress, MemoryTreeStore, MemoryUniverse};

/// Per-request state handed to every collaborator call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cooperative: collaborators check it and answer `Cancelled`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("'{field}' not found for {entity}")]
    NotFound { entity: String, field: String },
    #[error("request cancelled")]
    Cancelled,
    #[error("upstream failure: {0}")]
    Upstream(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("no saved entry '{0}'")]
    Missing(String),
    #[error("storage failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSeries {
    pub series: Series,
    pub display_name: String,
}

pub trait DataSource: Send + Sync {
    fn fetch_series(&self, ctx: &RequestContext, provider_id: &str, field: &QueryComponent)
        -> Result<FetchedSeries, FetchError>;
}

pub trait UniverseResolver: Send + Sync {
    fn resolve_universe(&self, ctx: &RequestContext, component: &QueryComponent) -> Result<Vec<EntityMeta>, FetchError>;
}

/// Turns free text into query components, in order of appearance.
pub trait TermResolver: Send + Sync {
    fn resolve_terms(&self, text: &str) -> Vec<QueryComponent>;
}

pub trait TreeStore: Send + Sync {
    fn save_tree(&self, id: &str, tree: &ExecutionNode) -> Result<(), StoreError>;
    fn load_tree(&self, id: &str) -> Result<ExecutionNode, StoreError>;
    fn save_result(&self, id: &str, result: &MultiEntityData) -> Result<(), StoreError>;
    fn load_result(&self, id: &str) -> Result<MultiEntityData, StoreError>;
}

pub trait ProgressReporter: Send + Sync {
    fn report_progress(&self, ctx: &RequestContext, message: &str, fraction: f64);
    /// Latest (message, fraction) reported for the request.
    fn progress(&self, request_id: &str) -> Option<(String, f64)>;
}

/// The collaborators a step may call.
#[derive(Clone)]
pub struct Collaborators {
    pub data: Arc<dyn DataSource>,
    pub universe: Arc<dyn UniverseResolver>,
    pub progress: Option<Arc<dyn ProgressReporter>>,
}

impl Collaborators {
    pub fn new(data: Arc<dyn DataSource>, universe: Arc<dyn UniverseResolver>) -> Self {
        Self { data, universe, progress: None }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }
}
