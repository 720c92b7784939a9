//! Contains the aggregation trees used while collecting documents.
//! This tree contains datastructures optimized for fast collection.
//! The tree can be converted to an intermediate tree, which contains datastructures optimized for
//! merging.

use std::fmt::Debug;

use super::intermediate_agg_result::{IntermediateAggregationResult, IntermediateAggregationResults};
use crate::{DocId, SegmentReader};

/// A SegmentAggregationCollector is used to collect one aggregation, and its sub-aggregations,
/// over the documents of one partition.
pub(crate) trait SegmentAggregationCollector: Debug + Send {
    fn collect(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()>;

    /// Finalize method, called once after the last collected document.
    fn flush(&mut self) -> crate::Result<()> {
        Ok(())
    }

    fn into_intermediate_result(self: Box<Self>) -> crate::Result<IntermediateAggregationResult>;
}

/// The GenericSegmentAggregationResultsCollector is the generic version of the collector, which
/// can handle arbitrary complexity of sub-aggregations. Bucket aggregations hold one per bucket.
#[derive(Default)]
pub(crate) struct GenericSegmentAggregationResultsCollector {
    pub(crate) aggs: Vec<(String, Box<dyn SegmentAggregationCollector>)>,
}

impl Debug for GenericSegmentAggregationResultsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentAggregationResultsCollector")
            .field("aggs", &self.aggs)
            .finish()
    }
}

impl GenericSegmentAggregationResultsCollector {
    pub(crate) fn is_empty(&self) -> bool {
        self.aggs.is_empty()
    }

    pub(crate) fn collect(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()> {
        for (_, collector) in &mut self.aggs {
            collector.collect(doc, reader)?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> crate::Result<()> {
        for (_, collector) in &mut self.aggs {
            collector.flush()?;
        }
        Ok(())
    }

    pub(crate) fn into_intermediate_aggregations_result(
        self,
    ) -> crate::Result<IntermediateAggregationResults> {
        let mut results = IntermediateAggregationResults::default();
        for (name, collector) in self.aggs {
            results.push(name, collector.into_intermediate_result()?)?;
        }
        Ok(results)
    }
}
