//! The global aggregation pass.
//!
//! Global aggregations ignore the request's query. They run once, after the main matching
//! pass, over every document passing the structural filters of the request.

use std::sync::Arc;

use super::collector::{build_partition_results, Accumulator, BucketCollector};
use super::intermediate_agg_result::IntermediateAggregationResults;
use crate::error::GLOBAL_AGGREGATION_PHASE;
use crate::profiler::REASON_AGGREGATION_GLOBAL;
use crate::{AggPhaseError, CollectorProfile, ExecutionLimits, Profilers, Query, Searcher};

/// Runs the global accumulators of a request.
#[derive(Debug)]
pub struct GlobalAggregationRunner {
    query: Query,
    accumulators: Vec<Accumulator>,
}

impl GlobalAggregationRunner {
    /// `query` selects every eligible document: "match all" combined with the structural
    /// filters of the request.
    pub fn new(query: Query, accumulators: Vec<Accumulator>) -> GlobalAggregationRunner {
        GlobalAggregationRunner {
            query,
            accumulators,
        }
    }

    /// Collects the accumulators in one sequential pass, then finalizes them.
    ///
    /// Returns an empty result without touching the searcher when there is no accumulator.
    /// A failing pass is reported as a [`AggPhaseError::QueryExecution`] of the global
    /// aggregation phase.
    pub fn run(
        self,
        searcher: &Searcher,
        profilers: Option<&mut Profilers>,
    ) -> crate::Result<IntermediateAggregationResults> {
        if self.accumulators.is_empty() {
            return Ok(IntermediateAggregationResults::default());
        }
        let mut collector = BucketCollector::from_accumulators(self.accumulators);
        if let Some(profilers) = profilers {
            let profile = CollectorProfile::new(REASON_AGGREGATION_GLOBAL);
            profilers
                .add_query_profiler()
                .set_collector(Arc::clone(&profile));
            collector = collector.profiled(profile);
        }
        let status = searcher
            .search_sequential(&self.query, &mut collector, &ExecutionLimits::default())
            .map_err(|err| AggPhaseError::query_execution(GLOBAL_AGGREGATION_PHASE, err))?;
        debug!("global aggregation pass done, status={status:?}");
        let mut results = IntermediateAggregationResults::default();
        for partition_results in build_partition_results(collector.flatten())?.into_values() {
            results.merge_fruits(partition_results)?;
        }
        Ok(results)
    }
}
