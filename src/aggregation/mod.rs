//! Cross-entity aggregation and classification.
pub mod bundle;
pub mod reducers;

pub use bundle::{build_bundle, AggregationRow, DataForAggregation, FieldCategoryBundle};
pub use reducers::{cross_entity_aggregation, quantile_label, Reducer};
