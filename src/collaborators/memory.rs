//! In-memory collaborators for tests and embedding.

use super::*;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

fn key(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

#[derive(Default)]
pub struct MemoryDataSource {
    series: RwLock<HashMap<(String, String), FetchedSeries>>,
}

impl MemoryDataSource {
    pub fn new() -> Self { Self::default() }

    /// Registers `series` as `field` of the entity `provider_id`.
    pub fn insert(&self, provider_id: &str, field: &str, series: Series) {
        let display_name = series.meta.label.clone();
        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        map.insert((provider_id.to_string(), key(field)), FetchedSeries { series, display_name });
    }
}

impl DataSource for MemoryDataSource {
    fn fetch_series(
        &self,
        ctx: &RequestContext,
        provider_id: &str,
        field: &QueryComponent,
    ) -> Result<FetchedSeries, FetchError> {
        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&(provider_id.to_string(), key(&field.canonical_name)))
            .cloned()
            .ok_or_else(|| FetchError::NotFound { entity: provider_id.to_string(), field: field.canonical_name.clone() })
    }
}

#[derive(Default)]
pub struct MemoryUniverse {
    universes: RwLock<HashMap<String, Vec<EntityMeta>>>,
}

impl MemoryUniverse {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, name: &str, members: Vec<EntityMeta>) {
        let mut map = self.universes.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(key(name), members);
    }
}

impl UniverseResolver for MemoryUniverse {
    fn resolve_universe(&self, ctx: &RequestContext, component: &QueryComponent) -> Result<Vec<EntityMeta>, FetchError> {
        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let map = self.universes.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&key(&component.canonical_name)).cloned().ok_or_else(|| FetchError::NotFound {
            entity: component.canonical_name.clone(),
            field: "members".to_string(),
        })
    }
}

/// Case-insensitive phrase table. At each position the longest phrase wins
/// and matches never overlap.
#[derive(Default)]
pub struct KeywordTermResolver {
    phrases: Vec<(String, QueryComponent)>,
}

impl KeywordTermResolver {
    pub fn new() -> Self { Self::default() }

    pub fn with_phrase(mut self, phrase: &str, component: QueryComponent) -> Self {
        self.phrases.push((key(phrase), component));
        self
    }
}

impl TermResolver for KeywordTermResolver {
    fn resolve_terms(&self, text: &str) -> Vec<QueryComponent> {
        let lower = text.to_ascii_lowercase();
        let mut hits: Vec<(usize, usize, &QueryComponent)> = Vec::new();
        for (phrase, component) in &self.phrases {
            if phrase.is_empty() {
                continue;
            }
            for (pos, _) in lower.match_indices(phrase.as_str()) {
                hits.push((pos, phrase.len(), component));
            }
        }
        // Earliest first, longest first at equal positions.
        hits.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut out = Vec::new();
        let mut covered = 0usize;
        for (pos, len, component) in hits {
            if pos < covered {
                continue;
            }
            covered = pos + len;
            let mut c = component.clone();
            c.original_text = text[pos..pos + len].to_string();
            out.push(c);
        }
        out
    }
}

/// Keeps trees and results as JSON documents, like a persistence layer would.
#[derive(Default)]
pub struct MemoryTreeStore {
    trees: Mutex<HashMap<String, String>>,
    results: Mutex<HashMap<String, String>>,
}

impl MemoryTreeStore {
    pub fn new() -> Self { Self::default() }
}

fn put<T: serde::Serialize>(map: &Mutex<HashMap<String, String>>, id: &str, value: &T) -> Result<(), StoreError> {
    let doc = serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))?;
    map.lock().unwrap_or_else(PoisonError::into_inner).insert(id.to_string(), doc);
    Ok(())
}

fn get<T: serde::de::DeserializeOwned>(map: &Mutex<HashMap<String, String>>, id: &str) -> Result<T, StoreError> {
    let guard = map.lock().unwrap_or_else(PoisonError::into_inner);
    let doc = guard.get(id).ok_or_else(|| StoreError::Missing(id.to_string()))?;
    serde_json::from_str(doc).map_err(|e| StoreError::Backend(e.to_string()))
}

impl TreeStore for MemoryTreeStore {
    fn save_tree(&self, id: &str, tree: &ExecutionNode) -> Result<(), StoreError> {
        put(&self.trees, id, tree)
    }

    fn load_tree(&self, id: &str) -> Result<ExecutionNode, StoreError> {
        get(&self.trees, id)
    }

    fn save_result(&self, id: &str, result: &MultiEntityData) -> Result<(), StoreError> {
        put(&self.results, id, result)
    }

    fn load_result(&self, id: &str) -> Result<MultiEntityData, StoreError> {
        get(&self.results, id)
    }
}

#[derive(Default)]
pub struct MemoryProgress {
    latest: Mutex<HashMap<String, (String, f64)>>,
}

impl MemoryProgress {
    pub fn new() -> Self { Self::default() }
}

impl ProgressReporter for MemoryProgress {
    fn report_progress(&self, ctx: &RequestContext, message: &str, fraction: f64) {
        let mut map = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(ctx.request_id.clone(), (message.to_string(), fraction.clamp(0.0, 1.0)));
    }

    fn progress(&self, request_id: &str) -> Option<(String, f64)> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).get(request_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MajorType;
    use crate::store::types::test_support::*;

    #[test]
    fn test_data_source_typed_miss_and_cancellation() {
        let ds = MemoryDataSource::new();
        ds.insert("AAPL", "Price", daily("Close", day(2020, 1, 1), &[1.0]));
        let ctx = RequestContext::new("r1");
        let price = QueryComponent::new(MajorType::Data, "price");

        let got = ds.fetch_series(&ctx, "AAPL", &price).unwrap();
        assert_eq!(got.display_name, "Close");
        assert!(matches!(ds.fetch_series(&ctx, "MSFT", &price), Err(FetchError::NotFound { .. })));

        ctx.cancel();
        assert_eq!(ds.fetch_series(&ctx, "AAPL", &price), Err(FetchError::Cancelled));
    }

    #[test]
    fn test_term_resolver_prefers_longest_and_keeps_order() {
        let r = KeywordTermResolver::new()
            .with_phrase("price", QueryComponent::new(MajorType::Data, "Price"))
            .with_phrase("top 10", QueryComponent::new(MajorType::Classification, "Top N").with_params(["10"]))
            .with_phrase("s&p 500", QueryComponent::new(MajorType::Universe, "S&P 500"))
            .with_phrase("s&p", QueryComponent::new(MajorType::Universe, "S&P"));
        let terms = r.resolve_terms("Top 10 S&P 500 by price");
        let names: Vec<&str> = terms.iter().map(|c| c.canonical_name.as_str()).collect();
        assert_eq!(names, vec!["Top N", "S&P 500", "Price"]);
        assert_eq!(terms[0].original_text, "Top 10");
    }

    #[test]
    fn test_tree_store_round_trips_json() {
        let store = MemoryTreeStore::new();
        let tree = ExecutionNode::new(MajorType::Formula)
            .with_argument(QueryComponent::new(MajorType::Formula, "val * 2"));
        store.save_tree("t1", &tree).unwrap();
        assert_eq!(store.load_tree("t1").unwrap(), tree);
        assert_eq!(store.load_result("nope"), Err(StoreError::Missing("nope".into())));
    }
}
