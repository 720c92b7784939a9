//! Module for all bucket aggregations.
//!
//! BucketAggregations create buckets of documents. Every bucket holds its own instance of the
//! bucket aggregation's sub-aggregations.
//!
//! Results of final buckets are [BucketResult](super::agg_result::BucketResult).
//! Results of intermediate buckets are
//! [IntermediateBucketResult](super::intermediate_agg_result::IntermediateBucketResult)

mod histogram;
mod term_agg;

pub(crate) use histogram::{
    intermediate_histogram_buckets_to_final_buckets, num_empty_histogram_buckets,
    SegmentHistogramCollector,
};
pub use histogram::{HistogramAggregation, HistogramBounds};
pub(crate) use term_agg::{cmp_term_buckets, SegmentTermCollector};
pub use term_agg::TermsAggregation;

/// Splits `name.property` into the aggregation name and the property, e.g. `stats.avg`.
pub(crate) fn get_agg_name_and_property(name: &str) -> (&str, &str) {
    let (agg_name, agg_property) = name.split_once('.').unwrap_or((name, ""));
    (agg_name, agg_property)
}
