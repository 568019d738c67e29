use super::{StepContext, StepError};
use crate::collaborators::FetchError;
use crate::graph::QueryComponent;
use crate::store::{EntityRegistry, MergeKey, MultiEntityData, SingleEntityData};
use tracing::debug;

/// Resolves every argument to its member list and unions the members by
/// `unique_id`. Entities already present in the inputs are kept.
pub fn resolve(
    ctx: &StepContext<'_>,
    components: &[QueryComponent],
    inputs: &[MultiEntityData],
) -> Result<MultiEntityData, StepError> {
    let mut registry = EntityRegistry::new(MergeKey::UniqueId);
    let mut errors = Vec::new();

    for entity in inputs.iter().flat_map(|d| d.entities.iter()) {
        registry.add(entity.clone(), None);
    }

    for component in components {
        match ctx.collaborators.universe.resolve_universe(ctx.request, component) {
            Ok(members) => {
                debug!(universe = %component.canonical_name, members = members.len(), "resolved universe");
                for meta in members {
                    registry.add(SingleEntityData::new(meta), None);
                }
            }
            Err(FetchError::Cancelled) => return Err(StepError::Cancelled),
            Err(e) => errors.push(format!("Universe '{}': {}", component.original_text, e)),
        }
    }

    let mut out = MultiEntityData::new(registry.into_entities());
    out.errors = inputs.iter().flat_map(|d| d.errors.iter().cloned()).collect();
    out.extend_errors(errors);
    Ok(out)
}
