//! Request-scoped state of a search: the query, its settings, the aggregation request and the
//! output slot the query phase fills.

use std::sync::Arc;

use crate::aggregation::agg_req::Aggregations;
use crate::aggregation::{
    Accumulator, AggregationCollectorManager, AggregationFruit, AggregationLimits,
    AggregationPhaseState, BucketCollector, IntermediateAggregationResults, SearchPath,
};
use crate::searcher::CollectionStatus;
use crate::{Profilers, Query, SearchConfig};

/// The output of the query phase of one request.
#[derive(Debug, Default)]
pub struct QuerySearchResult {
    total_hits: usize,
    timed_out: bool,
    terminated_early: bool,
    aggregations: Option<IntermediateAggregationResults>,
}

impl QuerySearchResult {
    /// Number of documents matching the query.
    pub fn total_hits(&self) -> usize {
        self.total_hits
    }

    /// True if a partition of the matching pass ran out of time.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// True if a partition of the matching pass stopped after `terminate_after` documents.
    pub fn terminated_early(&self) -> bool {
        self.terminated_early
    }

    pub(crate) fn set_collection(&mut self, total_hits: usize, status: CollectionStatus) {
        self.total_hits = total_hits;
        self.timed_out = status.timed_out;
        self.terminated_early = status.terminated_early;
    }

    /// The merged aggregations, if any.
    pub fn aggregations(&self) -> Option<&IntermediateAggregationResults> {
        self.aggregations.as_ref()
    }

    /// Reads the merged aggregations, leaving the slot empty.
    pub fn take_aggregations(&mut self) -> Option<IntermediateAggregationResults> {
        self.aggregations.take()
    }

    /// Returns true if the output carries aggregations.
    pub fn has_aggs(&self) -> bool {
        self.aggregations.is_some()
    }

    /// Sets, or clears, the aggregations.
    pub fn set_aggregations(&mut self, aggregations: Option<IntermediateAggregationResults>) {
        self.aggregations = aggregations;
    }
}

/// The runtime aggregation state of a request, between its initialization and the attachment
/// of the merged result.
#[derive(Debug)]
pub struct SearchContextAggregations {
    pub(crate) req: Arc<Aggregations>,
    pub(crate) limits: AggregationLimits,
    pub(crate) sequential_collector: Option<BucketCollector>,
    pub(crate) global_accumulators: Vec<Accumulator>,
    pub(crate) partitioned_fruit: Option<AggregationFruit>,
}

impl SearchContextAggregations {
    pub(crate) fn new(req: Arc<Aggregations>, limits: AggregationLimits) -> Self {
        SearchContextAggregations {
            req,
            limits,
            sequential_collector: None,
            global_accumulators: Vec::new(),
            partitioned_fruit: None,
        }
    }

    /// The aggregation request.
    pub fn req(&self) -> &Arc<Aggregations> {
        &self.req
    }

    /// The bucket limiter shared by every accumulator of the request.
    pub fn limits(&self) -> &AggregationLimits {
        &self.limits
    }

    /// Number of global aggregations waiting for the global pass.
    pub fn num_global_accumulators(&self) -> usize {
        self.global_accumulators.len()
    }
}

/// Everything the query phase needs to know about one request.
///
/// A context is not reused across unrelated requests. It may be executed again to fetch
/// another page of the same request, in which case aggregations are not recomputed.
#[derive(Debug)]
pub struct SearchContext {
    query: Query,
    config: SearchConfig,
    sort_optimization_conflict: bool,
    search_path: Option<SearchPath>,
    aggregation_request: Option<Arc<Aggregations>>,
    pub(crate) aggregations: Option<SearchContextAggregations>,
    pub(crate) agg_phase_state: AggregationPhaseState,
    aggregation_collector_manager: Option<AggregationCollectorManager>,
    profilers: Option<Profilers>,
    structural_filters: Vec<Query>,
    query_result: QuerySearchResult,
}

impl SearchContext {
    /// Creates the context of a request.
    pub fn new(query: Query, config: SearchConfig) -> SearchContext {
        SearchContext {
            query,
            config,
            sort_optimization_conflict: false,
            search_path: None,
            aggregation_request: None,
            aggregations: None,
            agg_phase_state: AggregationPhaseState::Idle,
            aggregation_collector_manager: None,
            profilers: None,
            structural_filters: Vec::new(),
            query_result: QuerySearchResult::default(),
        }
    }

    /// Attaches an aggregation request.
    pub fn with_aggregations(mut self, aggregations: Aggregations) -> SearchContext {
        self.aggregation_request = Some(Arc::new(aggregations));
        self
    }

    /// Enables profiling.
    pub fn with_profiling(mut self) -> SearchContext {
        self.profilers = Some(Profilers::default());
        self
    }

    /// Adds a filter that applies to every pass of the request, the global aggregation pass
    /// included. Tenant or routing filters are structural filters.
    pub fn with_structural_filter(mut self, filter: Query) -> SearchContext {
        self.structural_filters.push(filter);
        self
    }

    /// Marks the request as using a sort optimization that visits documents in a global
    /// order.
    pub fn with_sort_optimization_conflict(mut self, conflict: bool) -> SearchContext {
        self.sort_optimization_conflict = conflict;
        self
    }

    /// The query of the request.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// The settings of the request.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The aggregation request, if any.
    pub fn aggregation_request(&self) -> Option<&Arc<Aggregations>> {
        self.aggregation_request.as_ref()
    }

    /// The runtime aggregation state. Absent before initialization and once cleared.
    pub fn aggregations(&self) -> Option<&SearchContextAggregations> {
        self.aggregations.as_ref()
    }

    /// Where the aggregation phase of the request is.
    pub fn aggregation_phase_state(&self) -> AggregationPhaseState {
        self.agg_phase_state
    }

    /// Chooses the search path on the first call. Later calls return the same path.
    pub fn select_search_path(&mut self) -> SearchPath {
        if let Some(path) = self.search_path {
            return path;
        }
        let path = SearchPath::select(
            self.config.concurrent_segment_search,
            self.sort_optimization_conflict,
        );
        self.search_path = Some(path);
        path
    }

    /// The path chosen for the request, if already chosen.
    pub fn search_path(&self) -> Option<SearchPath> {
        self.search_path
    }

    /// Combines `query` with the structural filters of the request.
    pub fn build_filtered_query(&self, query: Query) -> Query {
        self.structural_filters
            .iter()
            .cloned()
            .fold(query, |query, filter| query.and(filter))
    }

    /// The profilers, if profiling is enabled.
    pub fn profilers(&self) -> Option<&Profilers> {
        self.profilers.as_ref()
    }

    pub(crate) fn profilers_mut(&mut self) -> Option<&mut Profilers> {
        self.profilers.as_mut()
    }

    pub(crate) fn register_aggregation_collector_manager(
        &mut self,
        manager: AggregationCollectorManager,
    ) {
        self.aggregation_collector_manager = Some(manager);
    }

    /// The collector manager of the non-global aggregations, if registered.
    pub fn aggregation_collector_manager(&self) -> Option<&AggregationCollectorManager> {
        self.aggregation_collector_manager.as_ref()
    }

    pub(crate) fn remove_aggregation_collector_manager(
        &mut self,
    ) -> Option<AggregationCollectorManager> {
        self.aggregation_collector_manager.take()
    }

    /// The output of the query phase.
    pub fn query_result(&self) -> &QuerySearchResult {
        &self.query_result
    }

    /// Mutable access to the output of the query phase.
    pub fn query_result_mut(&mut self) -> &mut QuerySearchResult {
        &mut self.query_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filtered_query() {
        let ctx = SearchContext::new(Query::All, SearchConfig::default())
            .with_structural_filter(Query::term("tenant", "a"))
            .with_structural_filter(Query::term("routing", "r1"));
        assert_eq!(
            ctx.build_filtered_query(Query::All),
            Query::Bool {
                must: vec![Query::term("tenant", "a"), Query::term("routing", "r1")],
                must_not: Vec::new(),
            }
        );
        let ctx = SearchContext::new(Query::All, SearchConfig::default());
        assert_eq!(
            ctx.build_filtered_query(Query::term("text", "cool")),
            Query::term("text", "cool")
        );
    }

    #[test]
    fn test_search_path_is_selected_once() {
        let config = SearchConfig {
            concurrent_segment_search: true,
            ..Default::default()
        };
        let mut ctx = SearchContext::new(Query::All, config).with_sort_optimization_conflict(true);
        assert_eq!(ctx.search_path(), None);
        assert_eq!(ctx.select_search_path(), SearchPath::Sequential);
        ctx.sort_optimization_conflict = false;
        assert_eq!(ctx.select_search_path(), SearchPath::Sequential);
    }

    #[test]
    fn test_output_slot_is_read_once() {
        let mut result = QuerySearchResult::default();
        assert!(!result.has_aggs());
        result.set_aggregations(Some(IntermediateAggregationResults::default()));
        assert!(result.has_aggs());
        assert!(result.aggregations().is_some());
        assert!(result.take_aggregations().is_some());
        assert!(result.take_aggregations().is_none());
    }
}
