use std::cmp::Ordering;
use std::collections::BinaryHeap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::aggregation::intermediate_agg_result::{
    IntermediateAggregationResult, IntermediateMetricResult,
};
use crate::aggregation::segment_agg_result::SegmentAggregationCollector;
use crate::{DocAddress, DocId, SegmentReader};

/// Largest `size` a top_n aggregation accepts.
pub const MAX_TOP_N_SIZE: usize = 10_000;

/// Keeps the `size` documents with the highest values of a numeric field.
///
/// Ties are broken by [`DocAddress`], lowest address first, so the selected documents do not
/// depend on how the segments were partitioned.
///
/// # JSON Format
/// ```json
/// {
///     "top_n": {
///         "field": "score",
///         "size": 3
///     }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopNAggregation {
    /// The field the documents are ranked by. Documents without a value are skipped.
    pub field: String,
    /// Number of documents to keep, at most [`MAX_TOP_N_SIZE`].
    pub size: usize,
}

/// A document selected by the top_n aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopNHit {
    /// The value of the ranking field.
    pub sort_value: f64,
    /// The address of the document.
    pub doc: DocAddress,
}

/// Best hits first: highest value, then lowest address.
fn cmp_best_first(left: &TopNHit, right: &TopNHit) -> Ordering {
    right
        .sort_value
        .total_cmp(&left.sort_value)
        .then_with(|| left.doc.cmp(&right.doc))
}

// Rust heap is a max-heap, the worst kept hit has to be on top.
#[derive(Clone, Copy, Debug)]
struct WorstFirst(TopNHit);

impl Ord for WorstFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_best_first(&self.0, &other.0)
    }
}

impl PartialOrd for WorstFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for WorstFirst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WorstFirst {}

/// Intermediate result of the top_n aggregation. Hits are sorted best first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntermediateTopN {
    size: usize,
    hits: Vec<TopNHit>,
}

impl IntermediateTopN {
    pub(crate) fn empty(size: usize) -> IntermediateTopN {
        IntermediateTopN {
            size,
            hits: Vec::new(),
        }
    }

    /// Merges the other top_n intermediate result into self.
    pub fn merge_fruits(&mut self, other: IntermediateTopN) {
        let size = self.size.max(other.size);
        let left = std::mem::take(&mut self.hits);
        self.hits = left
            .into_iter()
            .merge_by(other.hits, |left, right| {
                cmp_best_first(left, right) != Ordering::Greater
            })
            .take(size)
            .collect();
        self.size = size;
    }

    /// The kept hits, best first.
    pub fn hits(&self) -> &[TopNHit] {
        &self.hits
    }

    pub(crate) fn finalize(self) -> TopNMetricResult {
        TopNMetricResult { hits: self.hits }
    }
}

/// Final result of the top_n aggregation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopNMetricResult {
    /// The selected documents, best first.
    pub hits: Vec<TopNHit>,
}

#[derive(Debug)]
pub(crate) struct SegmentTopNCollector {
    field: String,
    size: usize,
    heap: BinaryHeap<WorstFirst>,
}

impl SegmentTopNCollector {
    pub(crate) fn from_req(req: &TopNAggregation) -> SegmentTopNCollector {
        SegmentTopNCollector {
            field: req.field.clone(),
            size: req.size,
            heap: BinaryHeap::new(),
        }
    }
}

impl SegmentAggregationCollector for SegmentTopNCollector {
    fn collect(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()> {
        let Some(sort_value) = reader.f64_value(doc, &self.field) else {
            return Ok(());
        };
        self.heap.push(WorstFirst(TopNHit {
            sort_value,
            doc: reader.doc_address(doc),
        }));
        if self.heap.len() > self.size {
            self.heap.pop();
        }
        Ok(())
    }

    fn into_intermediate_result(self: Box<Self>) -> crate::Result<IntermediateAggregationResult> {
        let hits = self
            .heap
            .into_sorted_vec()
            .into_iter()
            .map(|WorstFirst(hit)| hit)
            .collect();
        Ok(IntermediateAggregationResult::Metric(
            IntermediateMetricResult::TopN(IntermediateTopN {
                size: self.size,
                hits,
            }),
        ))
    }
}
