//! Drives the aggregations of a request around its matching pass.
//!
//! `pre_process` builds the accumulators, `post_process` runs the global pass, merges every
//! partial result and attaches the merged result to the request's output.

use std::sync::Arc;

use super::agg_tree::{
    build_top_level_aggregators, validate_aggregations, AggregationContext,
};
use super::collector::{build_partition_results, BucketCollector};
use super::collector_manager::{aggregation_profile, AggregationCollectorManager};
use super::global::GlobalAggregationRunner;
use super::intermediate_agg_result::IntermediateAggregationResults;
use super::path::SearchPath;
use super::AggregationLimits;
use crate::context::SearchContextAggregations;
use crate::{AggPhaseError, Query, SearchContext, Searcher};

/// Where the aggregation phase of a request is. States only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationPhaseState {
    /// No aggregation to compute, or not initialized yet.
    Idle,
    /// Accumulators are built, the limiter is reset.
    Initialized,
    /// The matching pass is running.
    Collecting,
    /// The matching pass completed. The global pass may run.
    GlobalPending,
    /// Partial results are being finalized and merged.
    Finalizing,
    /// The merged result is attached to the output.
    Attached,
    /// The runtime aggregation state is dropped.
    Cleared,
}

/// The aggregation phase of a request.
pub struct AggregationProcessor;

impl AggregationProcessor {
    /// Builds the non-global and global accumulators of the request.
    ///
    /// Does nothing if the request has no aggregation, or if the phase already left
    /// [`AggregationPhaseState::Idle`]. On the partitioned path, the non-global accumulators
    /// are handed to a registered [`AggregationCollectorManager`].
    pub fn pre_process(ctx: &mut SearchContext, searcher: &Searcher) -> crate::Result<()> {
        if ctx.agg_phase_state != AggregationPhaseState::Idle {
            return Ok(());
        }
        let Some(req) = ctx
            .aggregation_request()
            .filter(|req| !req.is_empty())
            .cloned()
        else {
            return Ok(());
        };
        let path = ctx.select_search_path();
        validate_aggregations(&req, searcher.schema())
            .map_err(AggPhaseError::aggregation_initialization)?;

        let limits = AggregationLimits::new(Some(ctx.config().bucket_limit));
        limits.reset();
        let agg_ctx = AggregationContext::new(limits.clone());
        let aggregators = build_top_level_aggregators(&req, 0, &agg_ctx)
            .map_err(AggPhaseError::aggregation_initialization)?;

        let mut aggregations = SearchContextAggregations::new(Arc::clone(&req), limits);
        aggregations.global_accumulators = aggregators.global;
        if !aggregators.non_global.is_empty() {
            let profile = ctx.profilers_mut().map(|profilers| {
                let profile = aggregation_profile();
                profilers
                    .current_query_profiler()
                    .set_collector(Arc::clone(&profile));
                profile
            });
            match path {
                SearchPath::Partitioned => {
                    let manager = AggregationCollectorManager::with_first_partition(
                        Arc::clone(&req),
                        agg_ctx,
                        profile,
                        aggregators.non_global,
                    )?;
                    ctx.register_aggregation_collector_manager(manager);
                }
                SearchPath::Sequential => {
                    let collector = BucketCollector::from_accumulators(aggregators.non_global);
                    aggregations.sequential_collector = Some(match profile {
                        Some(profile) => collector.profiled(profile),
                        None => collector,
                    });
                }
            }
        }
        debug!(
            "initialized {} aggregations on the {path:?} path",
            req.len()
        );
        ctx.aggregations = Some(aggregations);
        ctx.agg_phase_state = AggregationPhaseState::Initialized;
        Ok(())
    }

    /// Marks the start of the matching pass.
    pub fn start_collecting(ctx: &mut SearchContext) {
        if ctx.agg_phase_state == AggregationPhaseState::Initialized {
            ctx.agg_phase_state = AggregationPhaseState::Collecting;
        }
    }

    /// Runs the global pass, merges every partial result and attaches the merged result to the
    /// output.
    ///
    /// Without an aggregation request the output is left untouched. If the output already
    /// carries aggregations nothing is recomputed. The runtime aggregation state is dropped
    /// whatever the outcome.
    pub fn post_process(ctx: &mut SearchContext, searcher: &Searcher) -> crate::Result<()> {
        let Some(aggregations) = ctx.aggregations.take() else {
            return Ok(());
        };
        let res = if ctx.query_result().has_aggs() {
            debug!("aggregations already computed for this request");
            Ok(())
        } else {
            Self::finalize(ctx, searcher, aggregations)
        };
        Self::clear(ctx);
        res
    }

    /// Drops the runtime aggregation state after a failed matching pass. Nothing is attached to
    /// the output.
    pub fn discard(ctx: &mut SearchContext) {
        if ctx.agg_phase_state == AggregationPhaseState::Idle {
            return;
        }
        debug!("discarding aggregations collected in the {:?} state", ctx.agg_phase_state);
        ctx.aggregations = None;
        Self::clear(ctx);
    }

    fn clear(ctx: &mut SearchContext) {
        ctx.remove_aggregation_collector_manager();
        ctx.agg_phase_state = AggregationPhaseState::Cleared;
    }

    fn finalize(
        ctx: &mut SearchContext,
        searcher: &Searcher,
        aggregations: SearchContextAggregations,
    ) -> crate::Result<()> {
        ctx.agg_phase_state = AggregationPhaseState::GlobalPending;
        let SearchContextAggregations {
            req,
            limits,
            sequential_collector,
            global_accumulators,
            partitioned_fruit,
        } = aggregations;
        let global_results = if global_accumulators.is_empty() {
            IntermediateAggregationResults::default()
        } else {
            let query = ctx.build_filtered_query(Query::All);
            GlobalAggregationRunner::new(query, global_accumulators)
                .run(searcher, ctx.profilers_mut())?
        };

        ctx.agg_phase_state = AggregationPhaseState::Finalizing;
        let mut merged = partitioned_fruit
            .map(|fruit| fruit.into_results())
            .unwrap_or_default();
        if let Some(collector) = sequential_collector {
            for partition_results in build_partition_results(collector.flatten())?.into_values() {
                merged.merge_fruits(partition_results)?;
            }
        }
        merged.merge_fruits(global_results)?;
        if ctx.search_path().is_some_and(SearchPath::is_partitioned) {
            merged = IntermediateAggregationResults::top_level_reduce(vec![merged], &req, true)?;
        }
        merged.reserve_empty_buckets(&req, &limits)?;
        ctx.query_result_mut().set_aggregations(Some(merged));
        ctx.agg_phase_state = AggregationPhaseState::Attached;
        Ok(())
    }
}
