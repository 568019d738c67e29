// Query Core: evaluates computation trees over multi-entity time series.
// A tree is validated, evaluated depth-first through the step registry,
// and turns into a chart-ready `MultiEntityData`.

// --- Data model ---
pub mod graph;
pub mod store;

// --- Formula language and analysis ---
pub mod analysis;
pub mod compute;

// --- Time-series machinery ---
pub mod aggregation;
pub mod resample;

// --- Evaluation ---
pub mod display;
pub mod execution;
pub mod validation;

// --- Surroundings ---
pub mod collaborators;
pub mod config;
pub mod service;

pub use collaborators::{Collaborators, RequestContext};
pub use config::EngineConfig;
pub use execution::{Evaluator, ExecutionError, ExecutionTrace, StepRegistry};
pub use graph::{ExecutionNode, MajorType, QueryComponent};
pub use service::{QueryService, ServiceError};
pub use store::{MultiEntityData, Series, SingleEntityData};
