use crate::aggregation::{AggregationProcessor, SearchPath};
use crate::collector::{Count, SegmentCountCollector};
use crate::{SearchContext, Searcher};

/// The query phase of a request: the matching pass and the aggregations around it.
pub struct QueryPhase;

impl QueryPhase {
    /// Executes the query of `ctx` on `searcher` and fills `ctx.query_result_mut()`.
    ///
    /// The hit count and the non-global aggregations are collected as siblings, in the same
    /// matching pass. On the partitioned path, each partition gets its own collectors, reduced
    /// once every partition completed.
    pub fn execute(ctx: &mut SearchContext, searcher: &Searcher) -> crate::Result<()> {
        let path = ctx.select_search_path();
        AggregationProcessor::pre_process(ctx, searcher)?;
        AggregationProcessor::start_collecting(ctx);
        if let Err(err) = Self::collect(ctx, searcher, path) {
            AggregationProcessor::discard(ctx);
            return Err(err);
        }
        AggregationProcessor::post_process(ctx, searcher)
    }

    fn collect(ctx: &mut SearchContext, searcher: &Searcher, path: SearchPath) -> crate::Result<()> {
        let query = ctx.build_filtered_query(ctx.query().clone());
        let limits = ctx.config().execution_limits();
        match path {
            SearchPath::Partitioned => {
                let slices = searcher.slices(ctx.config().max_slice_count);
                let collector_manager = (Count, ctx.aggregation_collector_manager());
                let outcome =
                    searcher.search_with_manager(&query, &collector_manager, &slices, &limits)?;
                let (total_hits, aggregation_fruit) = outcome.fruit;
                debug!(
                    "partitioned matching pass: {total_hits} hits over {} partitions",
                    outcome.num_partitions
                );
                ctx.query_result_mut()
                    .set_collection(total_hits, outcome.status);
                if let (Some(aggregations), Some(fruit)) =
                    (ctx.aggregations.as_mut(), aggregation_fruit)
                {
                    aggregations.partitioned_fruit = Some(fruit);
                }
            }
            SearchPath::Sequential => {
                let mut count = SegmentCountCollector::default();
                let aggregation_collector = ctx
                    .aggregations
                    .as_mut()
                    .and_then(|aggregations| aggregations.sequential_collector.as_mut());
                let status = searcher.search_sequential(
                    &query,
                    &mut (&mut count, aggregation_collector),
                    &limits,
                )?;
                debug!("sequential matching pass: {} hits", count.count());
                ctx.query_result_mut().set_collection(count.count(), status);
            }
        }
        Ok(())
    }
}
