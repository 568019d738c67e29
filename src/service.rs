//! Glue between the evaluator and the systems around it: load a saved tree,
//! evaluate it, store the result and report completion.

use crate::collaborators::{Collaborators, RequestContext, StoreError, TreeStore};
use crate::config::EngineConfig;
use crate::execution::{Evaluator, ExecutionError, StepRegistry};
use crate::store::MultiEntityData;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub struct QueryService {
    evaluator: Evaluator,
    collaborators: Collaborators,
    trees: Arc<dyn TreeStore>,
}

impl QueryService {
    pub fn new(
        registry: Arc<StepRegistry>,
        collaborators: Collaborators,
        trees: Arc<dyn TreeStore>,
        config: EngineConfig,
    ) -> Self {
        let evaluator = Evaluator::new(registry, collaborators.clone(), config);
        Self { evaluator, collaborators, trees }
    }

    /// Runs the tree saved under `tree_id`; the result is saved under the
    /// same id.
    pub fn run_saved(&self, ctx: &RequestContext, tree_id: &str) -> Result<MultiEntityData, ServiceError> {
        let tree = self.trees.load_tree(tree_id)?;
        info!(request = %ctx.request_id, tree = tree_id, "running saved tree");

        let result = match self.evaluator.execute(ctx, &tree) {
            Ok(result) => result,
            Err(e) => {
                warn!(request = %ctx.request_id, tree = tree_id, error = %e, "evaluation failed");
                self.report(ctx, &format!("Failed: {}", e), 1.0);
                return Err(e.into());
            }
        };

        self.trees.save_result(tree_id, &result)?;
        if let Some(trail) = result.error() {
            warn!(request = %ctx.request_id, tree = tree_id, errors = %trail, "completed with errors");
        }
        self.report(ctx, &format!("Completed: {}", result.title), 1.0);
        Ok(result)
    }

    fn report(&self, ctx: &RequestContext, message: &str, fraction: f64) {
        if let Some(reporter) = &self.collaborators.progress {
            reporter.report_progress(ctx, message, fraction);
        }
    }
}
