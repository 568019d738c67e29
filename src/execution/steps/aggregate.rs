use crate::aggregation::{cross_entity_aggregation, Reducer};
use crate::store::{MultiEntityData, RenderHint};

pub fn apply(reducer: Reducer, input: &MultiEntityData) -> MultiEntityData {
    let mut out = cross_entity_aggregation(reducer, input);
    out.render_hint = match reducer {
        Reducer::Boxplot => RenderHint::BoxPlot,
        Reducer::TopN(_) | Reducer::BottomN(_) | Reducer::Quantile(_) => input.render_hint,
        _ => RenderHint::Column,
    };
    out
}
