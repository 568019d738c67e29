//! Depth-first evaluation of an execution tree.
//!
//! Children are evaluated first (optionally in parallel, always reassembled in
//! order), then the node's step runs over their results. Only structural
//! problems and cancellation abort the run; everything else lands in the
//! result's error trail.

use super::registry::StepRegistry;
use super::steps::{Step, StepContext, StepError};
use crate::analysis::{topology, NodePath};
use crate::collaborators::{Collaborators, RequestContext};
use crate::config::EngineConfig;
use crate::display::{format_trace, title};
use crate::graph::{ExecutionNode, MajorType};
use crate::store::MultiEntityData;
use crate::validation::{StructuralError, Validator};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, debug_span};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("invalid execution tree: {}", .0.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "))]
    Structural(Vec<StructuralError>),
    #[error("no computation step for childless {0} node")]
    NoStepFound(MajorType),
    #[error("request cancelled")]
    Cancelled,
}

/// Lifecycle of a node during one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unevaluated,
    EvaluatingChildren,
    Computing,
    Done,
}

/// What happened at one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    pub path: NodePath,
    pub node_type: MajorType,
    pub title: String,
    pub step: &'static str,
    pub state: NodeState,
    pub children: usize,
    pub entity_count: usize,
    /// Trail entries this node added.
    pub errors: Vec<String>,
}

/// Per-node reports in completion (post) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTrace {
    pub reports: Vec<NodeReport>,
}

impl ExecutionTrace {
    pub fn render(&self) -> String {
        format_trace(self)
    }
}

struct Evaluated {
    data: MultiEntityData,
    title: String,
    reports: Vec<NodeReport>,
}

struct Progress {
    done: AtomicUsize,
    total: usize,
}

pub struct Evaluator {
    registry: Arc<StepRegistry>,
    collaborators: Collaborators,
    config: EngineConfig,
    title_override: Option<String>,
}

impl Evaluator {
    pub fn new(registry: Arc<StepRegistry>, collaborators: Collaborators, config: EngineConfig) -> Self {
        Self { registry, collaborators, config, title_override: None }
    }

    /// Replaces the synthesized title of the root result.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title_override = Some(title.into());
        self
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn execute(&self, ctx: &RequestContext, root: &ExecutionNode) -> Result<MultiEntityData, ExecutionError> {
        self.execute_traced(ctx, root).map(|(data, _)| data)
    }

    pub fn execute_traced(
        &self,
        ctx: &RequestContext,
        root: &ExecutionNode,
    ) -> Result<(MultiEntityData, ExecutionTrace), ExecutionError> {
        Validator::new(&self.registry, self.config.max_tree_depth)
            .validate(root)
            .map_err(ExecutionError::Structural)?;

        let progress = Progress { done: AtomicUsize::new(0), total: topology::node_count(root) };
        let mut path = Vec::new();
        let mut evaluated = self.eval_node(ctx, root, &mut path, &progress)?;

        if let Some(t) = &self.title_override {
            evaluated.data.title = t.clone();
            if let Some(root_report) = evaluated.reports.last_mut() {
                root_report.title = t.clone();
            }
        }
        Ok((evaluated.data, ExecutionTrace { reports: evaluated.reports }))
    }

    fn eval_node(
        &self,
        ctx: &RequestContext,
        node: &ExecutionNode,
        path: &mut NodePath,
        progress: &Progress,
    ) -> Result<Evaluated, ExecutionError> {
        let span = debug_span!("node", major = %node.node_type, path = ?path);
        let _guard = span.enter();
        debug!(state = ?NodeState::EvaluatingChildren, children = node.children.len());

        // 1. Children, in array order.
        let children: Vec<Evaluated> = if self.config.parallel_children && node.children.len() > 1 {
            let base = path.clone();
            node.children
                .par_iter()
                .enumerate()
                .map(|(i, child)| {
                    let mut child_path = base.clone();
                    child_path.push(i);
                    self.eval_node(ctx, child, &mut child_path, progress)
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut out = Vec::with_capacity(node.children.len());
            for (i, child) in node.children.iter().enumerate() {
                path.push(i);
                let result = self.eval_node(ctx, child, path, progress);
                path.pop();
                out.push(result?);
            }
            out
        };

        // 2. Step resolution and argument checking.
        let (step, mut notes) = match self.registry.resolve(node) {
            Some(kind) => {
                let (step, arg_errors) = Step::prepare(kind, node, &self.config);
                (step, arg_errors.into_iter().map(|e| e.to_string()).collect::<Vec<_>>())
            }
            None if node.is_leaf() => return Err(ExecutionError::NoStepFound(node.node_type)),
            None => (Step::Identity, vec![format!("no computation step found for {} node", node.node_type)]),
        };

        // 3. Compute.
        debug!(state = ?NodeState::Computing, step = step.name());
        let inputs: Vec<MultiEntityData> = children.iter().map(|c| c.data.clone()).collect();
        let step_ctx = StepContext { request: ctx, collaborators: &self.collaborators, config: &self.config };
        let mut data = match step.compute(&step_ctx, &inputs) {
            Ok(data) => data,
            Err(StepError::Cancelled) => return Err(ExecutionError::Cancelled),
            Err(e) => {
                notes.push(format!("{}: {}", title::phrase(node), e));
                inputs.first().cloned().unwrap_or_default()
            }
        };

        // 4. Trail, title and bookkeeping.
        let inherited: Vec<String> = inputs.iter().flat_map(|d| d.errors.iter().cloned()).collect();
        let produced = std::mem::take(&mut data.errors);
        let added: Vec<String> =
            produced.into_iter().chain(notes).filter(|e| !inherited.contains(e)).fold(Vec::new(), |mut acc, e| {
                if !acc.contains(&e) {
                    acc.push(e);
                }
                acc
            });
        data.errors = inherited;
        data.errors.extend(added.iter().cloned());

        let child_titles: Vec<String> = children.iter().map(|c| c.title.clone()).collect();
        let node_title = title::synthesize(node, &child_titles);
        data.title = node_title.clone();

        let done = progress.done.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(reporter) = &self.collaborators.progress {
            reporter.report_progress(ctx, &node_title, done as f64 / progress.total.max(1) as f64);
        }
        debug!(state = ?NodeState::Done, entities = data.len(), added = added.len(), "node complete");

        let mut reports: Vec<NodeReport> = children.into_iter().flat_map(|c| c.reports).collect();
        reports.push(NodeReport {
            path: path.clone(),
            node_type: node.node_type,
            title: node_title.clone(),
            step: step.name(),
            state: NodeState::Done,
            children: node.children.len(),
            entity_count: data.len(),
            errors: added,
        });

        Ok(Evaluated { data, title: node_title, reports })
    }
}
