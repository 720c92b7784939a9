use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::intermediate_agg_result::{IntermediateAggregationResult, IntermediateAggregationResults};
use super::segment_agg_result::SegmentAggregationCollector;
use crate::collector::SegmentCollector;
use crate::{AggPhaseError, CollectorProfile, DocId, Score, SegmentReader};

/// Lifecycle of an [`Accumulator`]. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Built, no document collected yet.
    Created,
    /// At least one document was collected.
    Collecting,
    /// Flushed. No more documents may be collected.
    Finalized,
    /// The partial result was extracted.
    Consumed,
}

/// One top-level aggregation of one partition.
///
/// An accumulator belongs to exactly one partition and is owned by the worker collecting that
/// partition until it is handed back for reduction.
pub struct Accumulator {
    name: String,
    partition_ord: u32,
    state: AccumulatorState,
    collector: Option<Box<dyn SegmentAggregationCollector>>,
}

impl fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulator")
            .field("name", &self.name)
            .field("partition_ord", &self.partition_ord)
            .field("state", &self.state)
            .finish()
    }
}

impl Accumulator {
    pub(crate) fn new(
        name: String,
        partition_ord: u32,
        collector: Box<dyn SegmentAggregationCollector>,
    ) -> Accumulator {
        Accumulator {
            name,
            partition_ord,
            state: AccumulatorState::Created,
            collector: Some(collector),
        }
    }

    /// The name of the aggregation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The partition the accumulator was built for.
    pub fn partition_ord(&self) -> u32 {
        self.partition_ord
    }

    /// The current lifecycle state.
    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Feeds one document.
    ///
    /// # Panics
    /// If the accumulator is already finalized.
    pub fn collect(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()> {
        assert!(
            matches!(
                self.state,
                AccumulatorState::Created | AccumulatorState::Collecting
            ),
            "aggregation [{}] received a document after being finalized",
            self.name
        );
        self.state = AccumulatorState::Collecting;
        match self.collector.as_mut() {
            Some(collector) => collector.collect(doc, reader),
            None => Ok(()),
        }
    }

    /// Flushes the accumulator. Calling it again is a no-op.
    pub fn post_collection(&mut self) -> crate::Result<()> {
        match self.state {
            AccumulatorState::Finalized | AccumulatorState::Consumed => Ok(()),
            AccumulatorState::Created | AccumulatorState::Collecting => {
                if let Some(collector) = self.collector.as_mut() {
                    collector.flush()?;
                }
                self.state = AccumulatorState::Finalized;
                Ok(())
            }
        }
    }

    /// Finalizes the accumulator and extracts its partial result.
    ///
    /// Failures are reported as [`AggPhaseError::AggregationExecution`] naming the aggregation.
    ///
    /// # Panics
    /// If the result was already extracted.
    pub fn build_top_level(&mut self) -> crate::Result<(String, IntermediateAggregationResult)> {
        assert!(
            self.state != AccumulatorState::Consumed,
            "result of aggregation [{}] extracted twice",
            self.name
        );
        self.post_collection()
            .map_err(|err| AggPhaseError::aggregation_execution(&self.name, err))?;
        let collector = self.collector.take().ok_or_else(|| {
            AggPhaseError::aggregation_execution(
                &self.name,
                AggPhaseError::InternalError("accumulator without collector".to_string()),
            )
        })?;
        self.state = AccumulatorState::Consumed;
        let res = collector
            .into_intermediate_result()
            .map_err(|err| AggPhaseError::aggregation_execution(&self.name, err))?;
        Ok((self.name.clone(), res))
    }
}

/// Finalizes accumulators and groups their partial results by partition.
pub(crate) fn build_partition_results(
    accumulators: Vec<Accumulator>,
) -> crate::Result<BTreeMap<u32, IntermediateAggregationResults>> {
    let mut partitions: BTreeMap<u32, IntermediateAggregationResults> = BTreeMap::new();
    for mut accumulator in accumulators {
        let (name, res) = accumulator.build_top_level()?;
        partitions
            .entry(accumulator.partition_ord())
            .or_default()
            .push(name, res)
            .map_err(|err| AggPhaseError::aggregation_execution(accumulator.name(), err))?;
    }
    Ok(partitions)
}

/// Records the documents collected by the collector it wraps.
pub struct ProfileCollector {
    inner: Box<BucketCollector>,
    profile: Arc<CollectorProfile>,
}

impl ProfileCollector {
    /// The profile the collector records into.
    pub fn profile(&self) -> &Arc<CollectorProfile> {
        &self.profile
    }
}

impl fmt::Debug for ProfileCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileCollector")
            .field("reason", &self.profile.reason())
            .field("inner", &self.inner)
            .finish()
    }
}

/// The unit a partition is collected into.
///
/// Whatever the wrapping, the accumulators are recovered with [`BucketCollector::flatten`].
#[derive(Debug)]
pub enum BucketCollector {
    /// A single accumulator.
    Leaf(Accumulator),
    /// A profiled collector.
    Profiled(ProfileCollector),
    /// Siblings receiving every document.
    FanOut(Vec<BucketCollector>),
}

impl BucketCollector {
    /// Wraps the top-level accumulators of one partition.
    ///
    /// # Panics
    /// If `accumulators` is empty.
    pub fn from_accumulators(accumulators: Vec<Accumulator>) -> BucketCollector {
        assert!(
            !accumulators.is_empty(),
            "a bucket collector needs at least one accumulator"
        );
        let mut leaves: Vec<BucketCollector> =
            accumulators.into_iter().map(BucketCollector::Leaf).collect();
        if leaves.len() == 1 {
            leaves.remove(0)
        } else {
            BucketCollector::FanOut(leaves)
        }
    }

    /// Wraps the collector so that it records into `profile`.
    pub fn profiled(self, profile: Arc<CollectorProfile>) -> BucketCollector {
        BucketCollector::Profiled(ProfileCollector {
            inner: Box::new(self),
            profile,
        })
    }

    /// Recovers the accumulators, whatever the nesting.
    pub fn flatten(self) -> Vec<Accumulator> {
        let mut accumulators = Vec::new();
        self.flatten_into(&mut accumulators);
        accumulators
    }

    fn flatten_into(self, accumulators: &mut Vec<Accumulator>) {
        match self {
            BucketCollector::Leaf(accumulator) => accumulators.push(accumulator),
            BucketCollector::Profiled(profiled) => profiled.inner.flatten_into(accumulators),
            BucketCollector::FanOut(children) => {
                for child in children {
                    child.flatten_into(accumulators);
                }
            }
        }
    }

    fn collect_doc(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()> {
        match self {
            BucketCollector::Leaf(accumulator) => accumulator.collect(doc, reader),
            BucketCollector::Profiled(profiled) => {
                let start = Instant::now();
                let res = profiled.inner.collect_doc(doc, reader);
                profiled.profile.record(start.elapsed());
                res
            }
            BucketCollector::FanOut(children) => {
                for child in children {
                    child.collect_doc(doc, reader)?;
                }
                Ok(())
            }
        }
    }
}

impl SegmentCollector for BucketCollector {
    fn collect(&mut self, doc: DocId, _score: Score, reader: &SegmentReader) -> crate::Result<()> {
        self.collect_doc(doc, reader)
    }
}
