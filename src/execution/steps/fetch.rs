use super::{StepContext, StepError};
use crate::collaborators::FetchError;
use crate::graph::QueryComponent;
use crate::store::{MultiEntityData, Series, SeriesMeta};
use tracing::debug;

/// Fetches every field argument for every entity. A miss leaves an empty
/// series under the field name and a note in the trail.
pub fn fetch_fields(
    ctx: &StepContext<'_>,
    components: &[QueryComponent],
    input: &MultiEntityData,
) -> Result<MultiEntityData, StepError> {
    let mut out = input.clone();
    let mut errors = Vec::new();

    for entity in out.entities.iter_mut() {
        for component in components {
            let fetched = ctx.collaborators.data.fetch_series(ctx.request, &entity.meta.unique_id, component);
            match fetched {
                Ok(f) => {
                    let mut series = f.series;
                    if !f.display_name.is_empty() {
                        series.meta.label = f.display_name;
                    }
                    debug!(entity = %entity.meta.unique_id, field = %series.meta.label, points = series.len(), "fetched");
                    entity.push_field(series);
                }
                Err(FetchError::Cancelled) => return Err(StepError::Cancelled),
                Err(e) => {
                    errors.push(format!("{}: {}", entity.meta.name, e));
                    entity.push_field(Series::empty(SeriesMeta::labelled(component.canonical_name.clone())));
                }
            }
        }
    }

    out.extend_errors(errors);
    Ok(out)
}

/// Installs the fetched series as each entity's weight.
pub fn fetch_weight(
    ctx: &StepContext<'_>,
    component: &QueryComponent,
    input: &MultiEntityData,
) -> Result<MultiEntityData, StepError> {
    let mut out = input.clone();
    let mut errors = Vec::new();

    for entity in out.entities.iter_mut() {
        match ctx.collaborators.data.fetch_series(ctx.request, &entity.meta.unique_id, component) {
            Ok(f) => entity.set_weight(f.series),
            Err(FetchError::Cancelled) => return Err(StepError::Cancelled),
            Err(e) => errors.push(format!("{}: {}", entity.meta.name, e)),
        }
    }

    out.extend_errors(errors);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Collaborators, MemoryDataSource, MemoryUniverse, RequestContext};
    use crate::config::EngineConfig;
    use crate::graph::MajorType;
    use crate::store::types::test_support::*;
    use crate::store::{EntityMeta, SingleEntityData};
    use std::sync::Arc;

    #[test]
    fn test_missing_field_yields_empty_series_and_note() {
        let data = Arc::new(MemoryDataSource::new());
        data.insert("AAPL", "Price", daily("Price", day(2024, 1, 1), &[1.0, 2.0]));
        let collaborators = Collaborators::new(data, Arc::new(MemoryUniverse::new()));
        let request = RequestContext::new("r");
        let config = EngineConfig::default();
        let ctx = StepContext { request: &request, collaborators: &collaborators, config: &config };

        let input = MultiEntityData::new(vec![
            SingleEntityData::new(EntityMeta::new("Apple", "AAPL")),
            SingleEntityData::new(EntityMeta::new("Microsoft", "MSFT")),
        ]);
        let fields = [QueryComponent::new(MajorType::Data, "price")];
        let out = fetch_fields(&ctx, &fields, &input).unwrap();

        assert_eq!(out.entities[0].field("Price").map(Series::len), Some(2));
        assert!(out.entities[1].field("price").is_some_and(Series::is_empty));
        assert_eq!(out.errors, vec!["Microsoft: 'price' not found for MSFT".to_string()]);
    }

    #[test]
    fn test_cancelled_fetch_is_fatal() {
        let collaborators = Collaborators::new(Arc::new(MemoryDataSource::new()), Arc::new(MemoryUniverse::new()));
        let request = RequestContext::new("r");
        request.cancel();
        let config = EngineConfig::default();
        let ctx = StepContext { request: &request, collaborators: &collaborators, config: &config };
        let input = MultiEntityData::new(vec![SingleEntityData::new(EntityMeta::new("Apple", "AAPL"))]);

        let err = fetch_weight(&ctx, &QueryComponent::new(MajorType::Data, "Weight"), &input).unwrap_err();
        assert_eq!(err, StepError::Cancelled);
    }
}
