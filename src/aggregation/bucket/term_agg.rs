use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::aggregation::agg_req::Aggregations;
use crate::aggregation::agg_tree::{build_segment_agg_collectors, AggregationContext};
use crate::aggregation::intermediate_agg_result::{
    IntermediateAggregationResult, IntermediateBucketResult, IntermediateTermBucketEntry,
    IntermediateTermBucketResult,
};
use crate::aggregation::segment_agg_result::{
    GenericSegmentAggregationResultsCollector, SegmentAggregationCollector,
};
use crate::{DocId, SegmentReader};

/// Creates a bucket for every unique term and counts the number of occurrences.
///
/// Buckets are ordered by doc count, descending, then by term.
///
/// Partitions keep every term they saw. Once the partitions are merged, a partial reduction
/// keeps the `shard_size` best terms and the final result keeps `size`. The doc counts of the
/// dropped terms are reported as `sum_other_doc_count`.
///
/// # JSON Format
/// ```json
/// {
///     "terms": {
///         "field": "genre",
///         "size": 10
///     }
/// }
/// ```
///
/// # Response JSON Format
/// ```json
/// {
///     ...
///     "genres": {
///         "buckets": [
///             { "key": "drumnbass", "doc_count": 6 },
///             { "key": "raggae", "doc_count": 4 },
///             { "key": "jazz", "doc_count": 2 }
///         ],
///         "sum_other_doc_count": 0
///     }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TermsAggregation {
    /// The keyword field to compute the terms on.
    pub field: String,
    /// By default, the top 10 terms with the most documents are returned.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<u32>,
    /// Number of terms kept per partition before the partial results are merged.
    ///
    /// Defaults to `size * 1.5 + 10`. It is never lower than `size`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shard_size: Option<u32>,
    /// Filter all terms that are lower than `min_doc_count`. Defaults to 1.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_doc_count: Option<u64>,
}

impl TermsAggregation {
    /// Creates a terms aggregation with the default settings.
    pub fn from_field_name(field_name: String) -> Self {
        TermsAggregation {
            field: field_name,
            ..Default::default()
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size.unwrap_or(10) as usize
    }

    pub(crate) fn shard_size(&self) -> usize {
        let size = self.size();
        self.shard_size
            .map(|shard_size| shard_size as usize)
            .unwrap_or_else(|| (size as f64 * 1.5 + 10.0) as usize)
            .max(size)
    }

    pub(crate) fn min_doc_count(&self) -> u64 {
        self.min_doc_count.unwrap_or(1)
    }
}

/// Doc count descending, then term ascending.
pub(crate) fn cmp_term_buckets(
    left: &(String, IntermediateTermBucketEntry),
    right: &(String, IntermediateTermBucketEntry),
) -> Ordering {
    right
        .1
        .doc_count
        .cmp(&left.1.doc_count)
        .then_with(|| left.0.cmp(&right.0))
}

#[derive(Debug)]
struct TermBucketEntry {
    doc_count: u64,
    sub_aggregations: GenericSegmentAggregationResultsCollector,
}

/// The collector puts values from the keyword field into buckets.
#[derive(Debug)]
pub(crate) struct SegmentTermCollector {
    field: String,
    entries: FxHashMap<String, TermBucketEntry>,
    sub_aggregation_req: Option<Arc<Aggregations>>,
    ctx: AggregationContext,
}

impl SegmentTermCollector {
    pub(crate) fn from_req(
        req: &TermsAggregation,
        sub_aggregation_req: Option<Arc<Aggregations>>,
        ctx: &AggregationContext,
    ) -> SegmentTermCollector {
        SegmentTermCollector {
            field: req.field.clone(),
            entries: FxHashMap::default(),
            sub_aggregation_req,
            ctx: ctx.clone(),
        }
    }
}

impl SegmentAggregationCollector for SegmentTermCollector {
    fn collect(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()> {
        let Some(term) = reader.str_value(doc, &self.field) else {
            return Ok(());
        };
        if !self.entries.contains_key(term) {
            self.ctx.limits.add_buckets(1)?;
            let sub_aggregations = match &self.sub_aggregation_req {
                Some(sub_req) => build_segment_agg_collectors(sub_req, &self.ctx)?,
                None => GenericSegmentAggregationResultsCollector::default(),
            };
            self.entries.insert(
                term.to_string(),
                TermBucketEntry {
                    doc_count: 0,
                    sub_aggregations,
                },
            );
        }
        if let Some(entry) = self.entries.get_mut(term) {
            entry.doc_count += 1;
            entry.sub_aggregations.collect(doc, reader)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> crate::Result<()> {
        for entry in self.entries.values_mut() {
            entry.sub_aggregations.flush()?;
        }
        Ok(())
    }

    fn into_intermediate_result(self: Box<Self>) -> crate::Result<IntermediateAggregationResult> {
        let mut entries = FxHashMap::default();
        for (term, entry) in self.entries {
            entries.insert(
                term,
                IntermediateTermBucketEntry {
                    doc_count: entry.doc_count,
                    sub_aggregation: entry
                        .sub_aggregations
                        .into_intermediate_aggregations_result()?,
                },
            );
        }
        Ok(IntermediateAggregationResult::Bucket(
            IntermediateBucketResult::Terms(IntermediateTermBucketResult {
                entries,
                sum_other_doc_count: 0,
            }),
        ))
    }
}
