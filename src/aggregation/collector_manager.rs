use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::agg_req::Aggregations;
use super::agg_tree::{build_non_global_aggregators, AggregationContext};
use super::collector::{build_partition_results, Accumulator, BucketCollector};
use super::intermediate_agg_result::IntermediateAggregationResults;
use crate::collector::CollectorManager;
use crate::profiler::REASON_AGGREGATION;
use crate::{AggPhaseError, CollectorProfile};

/// The reduced non-global aggregations of a partitioned matching pass.
///
/// The fruit is realized into the request's output by the aggregation phase.
#[derive(Debug)]
pub struct AggregationFruit {
    results: IntermediateAggregationResults,
    num_partitions: usize,
}

impl AggregationFruit {
    /// Number of partitions that contributed a partial result.
    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// The merged partial results.
    pub fn results(&self) -> &IntermediateAggregationResults {
        &self.results
    }

    /// Consumes the fruit.
    pub fn into_results(self) -> IntermediateAggregationResults {
        self.results
    }
}

/// Builds one [`BucketCollector`] per partition for the non-global aggregations, and reduces
/// them into one [`AggregationFruit`].
pub struct AggregationCollectorManager {
    req: Arc<Aggregations>,
    ctx: AggregationContext,
    profile: Option<Arc<CollectorProfile>>,
    next_partition_ord: AtomicU32,
    eager_collector: Mutex<Option<BucketCollector>>,
}

impl std::fmt::Debug for AggregationCollectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationCollectorManager")
            .field("num_aggregations", &self.req.len())
            .field("profiled", &self.profile.is_some())
            .finish()
    }
}

impl AggregationCollectorManager {
    /// Creates the manager, and the collector of its first partition.
    ///
    /// Fails with [`AggPhaseError::AggregationInitialization`] if the accumulators cannot be
    /// built.
    pub fn new(
        req: Arc<Aggregations>,
        ctx: AggregationContext,
        profile: Option<Arc<CollectorProfile>>,
    ) -> crate::Result<AggregationCollectorManager> {
        let first_partition = build_non_global_aggregators(&req, 0, &ctx)
            .map_err(AggPhaseError::aggregation_initialization)?;
        AggregationCollectorManager::with_first_partition(req, ctx, profile, first_partition)
    }

    /// Creates the manager from the already built non-global accumulators of partition 0.
    pub(crate) fn with_first_partition(
        req: Arc<Aggregations>,
        ctx: AggregationContext,
        profile: Option<Arc<CollectorProfile>>,
        first_partition: Vec<Accumulator>,
    ) -> crate::Result<AggregationCollectorManager> {
        if first_partition.is_empty() {
            return Err(AggPhaseError::aggregation_initialization(
                AggPhaseError::InternalError(
                    "aggregation collector manager without non-global aggregation".to_string(),
                ),
            ));
        }
        let first = wrap_profiled(BucketCollector::from_accumulators(first_partition), &profile);
        Ok(AggregationCollectorManager {
            req,
            ctx,
            profile,
            next_partition_ord: AtomicU32::new(1),
            eager_collector: Mutex::new(Some(first)),
        })
    }

    /// The profile shared by the collectors of every partition, if profiling is enabled.
    pub fn profile(&self) -> Option<&Arc<CollectorProfile>> {
        self.profile.as_ref()
    }

    fn lock_eager_collector(
        &self,
    ) -> crate::Result<std::sync::MutexGuard<'_, Option<BucketCollector>>> {
        self.eager_collector.lock().map_err(|_| {
            AggPhaseError::ErrorInThread("aggregation collector manager lock poisoned".to_string())
        })
    }

    fn build_collector(&self) -> crate::Result<BucketCollector> {
        let partition_ord = self.next_partition_ord.fetch_add(1, Ordering::Relaxed);
        let accumulators = build_non_global_aggregators(&self.req, partition_ord, &self.ctx)
            .map_err(AggPhaseError::aggregation_initialization)?;
        let collector = BucketCollector::from_accumulators(accumulators);
        Ok(wrap_profiled(collector, &self.profile))
    }
}

fn wrap_profiled(
    collector: BucketCollector,
    profile: &Option<Arc<CollectorProfile>>,
) -> BucketCollector {
    match profile {
        Some(profile) => collector.profiled(Arc::clone(profile)),
        None => collector,
    }
}

/// Creates a profile for the non-global aggregations.
pub(crate) fn aggregation_profile() -> Arc<CollectorProfile> {
    CollectorProfile::new(REASON_AGGREGATION)
}

impl CollectorManager for AggregationCollectorManager {
    type Child = BucketCollector;
    type Fruit = AggregationFruit;

    fn new_collector(&self) -> crate::Result<BucketCollector> {
        if let Some(collector) = self.lock_eager_collector()?.take() {
            return Ok(collector);
        }
        self.build_collector()
    }

    fn reduce(&self, children: Vec<BucketCollector>) -> crate::Result<AggregationFruit> {
        let accumulators = children
            .into_iter()
            .flat_map(BucketCollector::flatten)
            .collect();
        let partitions = build_partition_results(accumulators)?;
        let num_partitions = partitions.len();
        let mut partials: Vec<IntermediateAggregationResults> =
            partitions.into_values().collect();
        let results = if partials.len() > 1 {
            IntermediateAggregationResults::top_level_reduce(partials, &self.req, true)?
        } else {
            partials.pop().unwrap_or_default()
        };
        debug!("reduced the aggregations of {num_partitions} partitions");
        Ok(AggregationFruit {
            results,
            num_partitions,
        })
    }
}
