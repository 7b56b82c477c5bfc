//! Similarity ranking over indexed units.
//!
//! The searcher owns the read path: embed the query snippet, over-fetch
//! candidates from the store, recompute cosine similarity against each
//! stored vector, and apply the acceptance policy. The store's native
//! candidate order is only a recall mechanism; the similarity that callers
//! see is always the locally recomputed cosine.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};
use crate::store::{MetadataFilter, UnitRecord, UnitStore};
use crate::unit::{DependentClasses, JavaMethodExtractor, UnitNameExtractor, normalize_method_name};
use crate::vector::{EmbeddingGenerator, cosine_similarity};

/// Default minimum cosine similarity for a candidate to qualify.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;

/// Default number of neighbours returned when the query omits a limit.
pub const DEFAULT_MAX_NEIGHBOURS: usize = 8;

/// Over-fetch multiplier applied to the store query so that post-filtering
/// can still fill the result set.
pub const OVERFETCH_FACTOR: usize = 4;

/// Similarities at or above this are treated as the query's own unit.
/// Strictly below 1.0 because recomputing the cosine of an identical
/// vector in f32 does not reliably land on exactly 1.0.
const SELF_MATCH_CUTOFF: f32 = 1.0 - 1e-6;

/// A similarity search request.
///
/// `class_name` and `method_name` are identity hints naming the unit the
/// query text came from; a candidate matching both is excluded even when
/// its stored text has drifted from the query. `dependent_class` restricts
/// candidates to units depending on that class.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub code: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub method_name: String,
    #[serde(default, alias = "dependent_class_filter")]
    pub dependent_class: String,
    #[serde(default)]
    pub max_neighbours: Option<usize>,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarUnit {
    pub class_name: String,
    pub method_name: String,
    pub signature: String,
    pub code: String,
    pub comment: String,
    pub annotations: String,
    pub dependent_methods: Vec<String>,
    pub dependent_classes: DependentClasses,
    pub is_constructor: bool,
    pub similarity: f32,
}

impl SimilarUnit {
    fn from_record(record: UnitRecord, similarity: f32) -> Self {
        Self {
            class_name: record.metadata.class_name,
            method_name: record.metadata.method_name,
            signature: record.metadata.signature,
            code: record.metadata.code,
            comment: record.metadata.comment,
            annotations: record.metadata.annotations,
            dependent_methods: record.metadata.dependent_methods,
            dependent_classes: record.metadata.dependent_classes,
            is_constructor: record.metadata.is_constructor,
            similarity,
        }
    }
}

/// Search results for one class: its constructor (when resolvable) and the
/// matched methods, in candidate order.
#[derive(Debug, Clone, Serialize)]
pub struct ClassGroup {
    pub class_name: String,
    pub constructor: Option<SimilarUnit>,
    pub methods: Vec<SimilarUnit>,
}

/// Read-path coordinator: embeds queries and ranks stored units by cosine
/// similarity.
pub struct SimilaritySearcher<S: UnitStore> {
    store: Arc<S>,
    embeddings: Arc<dyn EmbeddingGenerator>,
    extractor: Box<dyn UnitNameExtractor>,
    config: SearchConfig,
}

impl<S: UnitStore> SimilaritySearcher<S> {
    /// Creates a searcher with the default search configuration.
    pub fn new(store: Arc<S>, embeddings: Arc<dyn EmbeddingGenerator>) -> Self {
        Self::with_config(store, embeddings, SearchConfig::default())
    }

    /// Creates a searcher with an explicit configuration.
    pub fn with_config(
        store: Arc<S>,
        embeddings: Arc<dyn EmbeddingGenerator>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            extractor: Box::new(JavaMethodExtractor::new()),
            config,
        }
    }

    /// Returns up to `max_neighbours` units similar to the query snippet,
    /// most similar first.
    ///
    /// # Errors
    /// [`SearchError::NoMatch`] when no stored unit qualifies; this is a
    /// normal outcome of a sparse corpus, distinct from a store failure.
    pub fn search(&self, query: &SearchQuery) -> SearchResult<Vec<SimilarUnit>> {
        let (candidates, _, limit) = self.fetch_candidates(query)?;
        let method_hint = self.method_hint(query);

        let mut results: Vec<SimilarUnit> = Vec::with_capacity(limit);
        for (similarity, record) in candidates {
            if similarity < self.config.similarity_threshold {
                continue;
            }
            if self.is_query_unit(query, method_hint.as_deref(), similarity, &record) {
                continue;
            }
            results.push(SimilarUnit::from_record(record, similarity));
            if results.len() == limit {
                break;
            }
        }

        if results.is_empty() {
            return Err(SearchError::NoMatch);
        }

        // Stable sort keeps store order for equal similarities
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });

        debug!("Search returned {} of up to {limit} neighbours", results.len());
        Ok(results)
    }

    /// Returns the raw candidate set partitioned by class, the query's own
    /// unit excluded, with each class's constructor resolved.
    ///
    /// Unlike [`Self::search`], no similarity threshold is applied: a class
    /// group reports everything the store surfaced for it, so the caller
    /// sees the class in context.
    pub fn search_grouped(&self, query: &SearchQuery) -> SearchResult<Vec<ClassGroup>> {
        let (candidates, query_vector, _) = self.fetch_candidates(query)?;
        let method_hint = self.method_hint(query);

        // Partition by class in first-seen candidate order
        let mut groups: Vec<ClassGroup> = Vec::new();
        for (similarity, record) in candidates {
            if self.is_query_unit(query, method_hint.as_deref(), similarity, &record) {
                continue;
            }
            let class_name = record.metadata.class_name.clone();
            let unit = SimilarUnit::from_record(record, similarity);

            let index = match groups.iter().position(|g| g.class_name == class_name) {
                Some(index) => index,
                None => {
                    groups.push(ClassGroup {
                        class_name,
                        constructor: None,
                        methods: Vec::new(),
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[index];
            if unit.is_constructor {
                group.constructor.get_or_insert(unit);
            } else {
                group.methods.push(unit);
            }
        }

        if groups.is_empty() {
            return Err(SearchError::NoMatch);
        }

        for group in &mut groups {
            if group.constructor.is_none() {
                group.constructor = self.lookup_constructor(&group.class_name, &query_vector)?;
            }
        }

        Ok(groups)
    }

    /// Over-fetches candidates and pairs each with its recomputed cosine
    /// similarity, in store candidate order.
    fn fetch_candidates(
        &self,
        query: &SearchQuery,
    ) -> SearchResult<(Vec<(f32, UnitRecord)>, Vec<f32>, usize)> {
        if query.code.trim().is_empty() {
            return Err(SearchError::Validation { field: "code" });
        }

        let query_vector = self
            .embeddings
            .embed_one(&query.code)
            .map_err(SearchError::Embedding)?;

        let limit = query
            .max_neighbours
            .unwrap_or(self.config.max_neighbours)
            .max(1);
        let fetch = limit.saturating_mul(self.config.overfetch_factor.max(1));

        let filter = dependent_class_filter(query);
        let candidates = self
            .store
            .query_nearest(&query_vector, fetch, filter.as_ref())?;

        let scored = candidates
            .into_iter()
            .map(|record| (cosine_similarity(&query_vector, &record.vector), record))
            .collect();
        Ok((scored, query_vector, limit))
    }

    /// A candidate is the query's own unit when its similarity is at the
    /// exact-match cutoff or when it matches both identity hints.
    fn is_query_unit(
        &self,
        query: &SearchQuery,
        method_hint: Option<&str>,
        similarity: f32,
        record: &UnitRecord,
    ) -> bool {
        if similarity >= SELF_MATCH_CUTOFF {
            return true;
        }
        if query.class_name.is_empty() {
            return false;
        }
        match method_hint {
            Some(name) => {
                record.metadata.class_name == query.class_name
                    && record.metadata.method_name == name
            }
            None => false,
        }
    }

    /// Effective method-name hint: the explicit one when given, otherwise
    /// derived from the query source text when a class hint is present.
    fn method_hint(&self, query: &SearchQuery) -> Option<String> {
        let name = normalize_method_name(&query.method_name);
        if !name.is_empty() {
            return Some(name);
        }
        if query.class_name.is_empty() {
            return None;
        }
        self.extractor
            .extract(&query.code)
            .map(|extracted| normalize_method_name(&extracted))
            .filter(|extracted| !extracted.is_empty())
    }

    /// Secondary constructor lookup for a class whose constructor did not
    /// surface among the candidates.
    fn lookup_constructor(
        &self,
        class_name: &str,
        query_vector: &[f32],
    ) -> SearchResult<Option<SimilarUnit>> {
        let filter = MetadataFilter::Constructor {
            class_name: class_name.to_string(),
        };
        let mut found = self.store.get_where(&filter)?;
        let Some(record) = found.drain(..).next() else {
            return Ok(None);
        };

        let similarity = cosine_similarity(query_vector, &record.vector);
        Ok(Some(SimilarUnit::from_record(record, similarity)))
    }
}

fn dependent_class_filter(query: &SearchQuery) -> Option<MetadataFilter> {
    let name = query.dependent_class.trim();
    if name.is_empty() {
        None
    } else {
        Some(MetadataFilter::DependentClass(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryUnitStore, UnitRecord};
    use crate::unit::{UnitId, UnitMetadata};
    use crate::vector::{HashingEmbeddingGenerator, VectorDimension};

    const QUERY_CODE: &str = "alpha beta gamma delta epsilon zeta eta theta";
    const FAR_CODE: &str = "one two three four five six seven eight";

    fn near_code(last: &str) -> String {
        format!("alpha beta gamma delta epsilon zeta eta {last}")
    }

    fn store_unit(
        store: &MemoryUnitStore,
        embeddings: &HashingEmbeddingGenerator,
        class: &str,
        method: &str,
        code: &str,
        deps: &str,
    ) {
        let metadata = UnitMetadata {
            class_name: class.to_string(),
            method_name: method.to_string(),
            signature: format!("{method}()"),
            code: code.to_string(),
            comment: String::new(),
            annotations: String::new(),
            dependent_methods: Vec::new(),
            dependent_classes: DependentClasses::from_joined(deps),
            is_constructor: class == method,
        };
        let vector = embeddings.embed_one(code).unwrap();
        store
            .insert(UnitRecord {
                id: UnitId::new(class, &format!("{method}()")),
                vector,
                metadata,
            })
            .unwrap();
    }

    fn searcher_with(
        units: &[(&str, &str, &str, &str)],
        config: SearchConfig,
    ) -> SimilaritySearcher<MemoryUnitStore> {
        let store = Arc::new(MemoryUnitStore::new(VectorDimension::dimension_384()));
        let embeddings = Arc::new(HashingEmbeddingGenerator::new());
        for (class, method, code, deps) in units {
            store_unit(&store, &embeddings, class, method, code, deps);
        }
        SimilaritySearcher::with_config(store, embeddings, config)
    }

    fn query(code: &str) -> SearchQuery {
        SearchQuery {
            code: code.to_string(),
            class_name: String::new(),
            method_name: String::new(),
            dependent_class: String::new(),
            max_neighbours: None,
        }
    }

    #[test]
    fn test_results_within_threshold_band_and_sorted() {
        let near1 = near_code("iota");
        let near2 = near_code("kappa");
        let searcher = searcher_with(
            &[
                ("Foo", "a", &near1, ""),
                ("Foo", "b", &near2, ""),
                ("Bar", "c", FAR_CODE, ""),
            ],
            SearchConfig::default(),
        );

        let results = searcher.search(&query(QUERY_CODE)).unwrap();

        assert_eq!(results.len(), 2);
        for unit in &results {
            assert!(unit.similarity >= DEFAULT_SIMILARITY_THRESHOLD);
            assert!(unit.similarity < 1.0);
        }
        // Most similar first
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn test_exact_match_is_excluded() {
        let searcher = searcher_with(&[("Foo", "a", QUERY_CODE, "")], SearchConfig::default());

        // The only stored unit is the query itself
        let err = searcher.search(&query(QUERY_CODE)).unwrap_err();
        assert_eq!(err.status_code(), "NO_MATCH");
    }

    #[test]
    fn test_identity_hints_exclude_drifted_own_unit() {
        let near = near_code("iota");
        let other = near_code("kappa");
        let searcher = searcher_with(
            &[("Foo", "a", &near, ""), ("Bar", "b", &other, "")],
            SearchConfig::default(),
        );

        let mut q = query(QUERY_CODE);
        q.class_name = "Foo".to_string();
        q.method_name = "a(int x)".to_string();

        let results = searcher.search(&q).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].class_name, "Bar");
    }

    #[test]
    fn test_method_hint_derived_from_query_code() {
        let own = "public void a ( ) alpha beta gamma delta epsilon zeta eta iota";
        let other = "public void b ( ) alpha beta gamma delta epsilon zeta eta kappa";
        let searcher = searcher_with(
            &[("Foo", "a", own, ""), ("Bar", "b", other, "")],
            SearchConfig::default(),
        );

        // No explicit method hint: the name is recovered from the snippet
        let mut q = query("public void a ( ) alpha beta gamma delta epsilon zeta eta theta");
        q.class_name = "Foo".to_string();

        let results = searcher.search(&q).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].class_name, "Bar");
    }

    #[test]
    fn test_result_count_capped_at_max_neighbours() {
        let codes: Vec<String> = ["iota", "kappa", "lambda", "mu", "nu", "xi"]
            .iter()
            .map(|last| near_code(last))
            .collect();
        let units: Vec<(&str, &str, &str, &str)> = codes
            .iter()
            .enumerate()
            .map(|(i, code)| {
                let method: &'static str = ["a", "b", "c", "d", "e", "f"][i];
                ("Foo", method, code.as_str(), "")
            })
            .collect();
        let searcher = searcher_with(&units, SearchConfig::default());

        let mut q = query(QUERY_CODE);
        q.max_neighbours = Some(3);

        let results = searcher.search(&q).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_dependent_class_filter_applies() {
        let near1 = near_code("iota");
        let near2 = near_code("kappa");
        let searcher = searcher_with(
            &[("Foo", "a", &near1, "Caller"), ("Bar", "b", &near2, "Other")],
            SearchConfig::default(),
        );

        let mut q = query(QUERY_CODE);
        q.dependent_class = "Caller".to_string();

        let results = searcher.search(&q).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].class_name, "Foo");
    }

    #[test]
    fn test_query_accepts_dependent_class_filter_key() {
        let json = r#"{
            "code": "public void a() {}",
            "dependent_class_filter": "Caller"
        }"#;
        let q: SearchQuery = serde_json::from_str(json).unwrap();
        assert_eq!(q.dependent_class, "Caller");
    }

    #[test]
    fn test_huge_neighbour_limit_does_not_overflow() {
        let near = near_code("iota");
        let searcher = searcher_with(&[("Foo", "a", &near, "")], SearchConfig::default());

        let mut q = query(QUERY_CODE);
        q.max_neighbours = Some(usize::MAX);

        let results = searcher.search(&q).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_no_match_on_empty_store() {
        let searcher = searcher_with(&[], SearchConfig::default());

        let err = searcher.search(&query(QUERY_CODE)).unwrap_err();
        assert_eq!(err.status_code(), "NO_MATCH");
    }

    #[test]
    fn test_validation_rejects_blank_query() {
        let searcher = searcher_with(&[], SearchConfig::default());

        let err = searcher.search(&query("   ")).unwrap_err();
        assert_eq!(err.status_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_grouped_results_partition_by_class() {
        let near1 = near_code("iota");
        let near2 = near_code("kappa");
        let near3 = near_code("lambda");
        let searcher = searcher_with(
            &[
                ("Foo", "a", &near1, ""),
                ("Foo", "Foo", &near2, ""),
                ("Bar", "b", &near3, ""),
            ],
            SearchConfig::default(),
        );

        let groups = searcher.search_grouped(&query(QUERY_CODE)).unwrap();

        assert_eq!(groups.len(), 2);
        let foo = groups.iter().find(|g| g.class_name == "Foo").unwrap();
        assert!(foo.constructor.as_ref().is_some_and(|c| c.is_constructor));
        assert_eq!(foo.methods.len(), 1);
        let bar = groups.iter().find(|g| g.class_name == "Bar").unwrap();
        assert!(bar.constructor.is_none());
        assert_eq!(bar.methods.len(), 1);
    }

    #[test]
    fn test_grouped_constructor_resolved_by_secondary_lookup() {
        let near1 = near_code("iota");
        let near2 = near_code("kappa");
        // Constructor far from the query so it never surfaces as a candidate
        let config = SearchConfig {
            max_neighbours: 2,
            overfetch_factor: 1,
            ..SearchConfig::default()
        };
        let searcher = searcher_with(
            &[
                ("Foo", "a", &near1, ""),
                ("Foo", "b", &near2, ""),
                ("Foo", "Foo", FAR_CODE, ""),
            ],
            config,
        );

        let groups = searcher.search_grouped(&query(QUERY_CODE)).unwrap();

        assert_eq!(groups.len(), 1);
        let foo = &groups[0];
        assert_eq!(foo.methods.len(), 2);
        let constructor = foo.constructor.as_ref().expect("constructor resolved");
        assert!(constructor.is_constructor);
        assert!(constructor.similarity < DEFAULT_SIMILARITY_THRESHOLD);
    }
}
