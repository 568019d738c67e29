use crate::resample::{align_event_before_after, EventAlignment};
use crate::store::{MultiEntityData, RenderHint};

pub fn align(cfg: EventAlignment, input: &MultiEntityData) -> MultiEntityData {
    let mut out = align_event_before_after(input, cfg);
    out.render_hint = RenderHint::Line;
    out
}
