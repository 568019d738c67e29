//! The time-series data model shared by every subsystem.
pub mod entity;
pub mod registry;
pub mod types;

pub use entity::{
    CategoryId, CategoryPoint, CategorySeries, EntityMeta, MultiEntityData, RenderHint,
    SingleEntityData, DEFAULT_CATEGORY,
};
pub use registry::{EntityRegistry, MergeKey};
pub use types::{epoch, DataPoint, ResamplePolicy, Series, SeriesMeta, Time};
