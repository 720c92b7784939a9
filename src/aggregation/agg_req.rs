//! Contains the aggregation request tree. Used to build the accumulators of a request.
//!
//! [`Aggregations`] is the top level entry point to create a request, which is a `HashMap<String,
//! Aggregation>`.
//!
//! Requests are compatible with the elasticsearch JSON request format, plus a `"global"` flag
//! marking top level aggregations that ignore the request's query.
//!
//! ```
//! use aggphase::aggregation::agg_req::Aggregations;
//!
//! let elasticsearch_compatible_json_req = r#"
//! {
//!   "num_docs": { "count": {} },
//!   "per_text": {
//!     "terms": { "field": "text", "size": 3 },
//!     "aggs": { "average_score": { "avg": { "field": "score" } } }
//!   },
//!   "best_everywhere": { "top_n": { "field": "score", "size": 3 }, "global": true },
//!   "max_per_text": { "max_bucket": { "buckets_path": "per_text>average_score" } }
//! }
//! "#;
//! let agg_req: Aggregations = serde_json::from_str(elasticsearch_compatible_json_req).unwrap();
//! assert!(agg_req["best_everywhere"].global);
//! assert!(agg_req["max_per_text"].is_pipeline());
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::bucket::{HistogramAggregation, TermsAggregation};
use super::metric::{CountAggregation, NumericFieldAggregation, TopNAggregation};
use super::pipeline::{BucketMetricAggregation, BucketMetricKind};

/// The top-level aggregation request structure, which contains [`Aggregation`] and their user
/// defined names. It is also used in buckets aggregations to define sub-aggregations.
///
/// The key is the user defined name of the aggregation.
pub type Aggregations = HashMap<String, Aggregation>;

/// Aggregation request.
///
/// An aggregation is either a bucket, a metric or a pipeline aggregation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// The aggregation variant, which can be either a bucket, a metric or a pipeline
    /// aggregation.
    #[serde(flatten)]
    pub agg: AggregationVariants,
    /// on the document set in the bucket.
    #[serde(rename = "aggs")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Aggregations::is_empty")]
    pub sub_aggregation: Aggregations,
    /// Global aggregations see every document of the shard, regardless of the query.
    ///
    /// Only allowed on top level aggregations.
    #[serde(default)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub global: bool,
}

impl Aggregation {
    /// Creates a non-global aggregation without sub-aggregations.
    pub fn new(agg: AggregationVariants) -> Aggregation {
        Aggregation {
            agg,
            sub_aggregation: Aggregations::default(),
            global: false,
        }
    }

    /// Marks the aggregation as global.
    pub fn into_global(mut self) -> Aggregation {
        self.global = true;
        self
    }

    /// Returns true for pipeline aggregations, which are computed from the results of other
    /// aggregations and never collect documents.
    pub fn is_pipeline(&self) -> bool {
        self.agg.as_pipeline().is_some()
    }

    /// Returns the sub-aggregation request.
    pub fn sub_aggregation(&self) -> &Aggregations {
        &self.sub_aggregation
    }
}

/// All aggregation types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationVariants {
    // Bucket aggregation types
    /// Put data into buckets of terms.
    Terms(TermsAggregation),
    /// Put data into fixed-size numeric buckets.
    Histogram(HistogramAggregation),

    // Metric aggregation types
    /// Counts the documents.
    Count(CountAggregation),
    /// Computes the sum of the extracted values.
    Sum(NumericFieldAggregation),
    /// Computes the average of the extracted values.
    #[serde(rename = "avg")]
    Average(NumericFieldAggregation),
    /// Finds the minimum value.
    Min(NumericFieldAggregation),
    /// Finds the maximum value.
    Max(NumericFieldAggregation),
    /// Computes count, sum, min, max and average of the extracted values.
    Stats(NumericFieldAggregation),
    /// Keeps the `size` documents with the highest values.
    TopN(TopNAggregation),

    // Pipeline aggregation types
    /// Sum of a metric over the buckets of a sibling aggregation.
    SumBucket(BucketMetricAggregation),
    /// Average of a metric over the buckets of a sibling aggregation.
    AvgBucket(BucketMetricAggregation),
    /// Maximum of a metric over the buckets of a sibling aggregation.
    MaxBucket(BucketMetricAggregation),
    /// Minimum of a metric over the buckets of a sibling aggregation.
    MinBucket(BucketMetricAggregation),
}

impl AggregationVariants {
    /// Returns the name of the field the aggregation is computed on, if any.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            AggregationVariants::Terms(terms) => Some(terms.field.as_str()),
            AggregationVariants::Histogram(histogram) => Some(histogram.field.as_str()),
            AggregationVariants::Count(count) => count.field.as_deref(),
            AggregationVariants::Sum(metric)
            | AggregationVariants::Average(metric)
            | AggregationVariants::Min(metric)
            | AggregationVariants::Max(metric)
            | AggregationVariants::Stats(metric) => Some(metric.field.as_str()),
            AggregationVariants::TopN(top_n) => Some(top_n.field.as_str()),
            AggregationVariants::SumBucket(_)
            | AggregationVariants::AvgBucket(_)
            | AggregationVariants::MaxBucket(_)
            | AggregationVariants::MinBucket(_) => None,
        }
    }

    /// Returns true for aggregations creating buckets, which may hold sub-aggregations.
    pub fn is_bucket(&self) -> bool {
        matches!(
            self,
            AggregationVariants::Terms(_) | AggregationVariants::Histogram(_)
        )
    }

    pub(crate) fn as_pipeline(&self) -> Option<(BucketMetricKind, &BucketMetricAggregation)> {
        match self {
            AggregationVariants::SumBucket(req) => Some((BucketMetricKind::Sum, req)),
            AggregationVariants::AvgBucket(req) => Some((BucketMetricKind::Avg, req)),
            AggregationVariants::MaxBucket(req) => Some((BucketMetricKind::Max, req)),
            AggregationVariants::MinBucket(req) => Some((BucketMetricKind::Min, req)),
            _ => None,
        }
    }
}

/// Returns the aggregations of `aggs` sorted by name.
///
/// `Aggregations` is a `HashMap`, sorting gives the trees built from one request a stable
/// order across partitions.
pub(crate) fn sorted_entries(aggs: &Aggregations) -> Vec<(&String, &Aggregation)> {
    let mut entries: Vec<(&String, &Aggregation)> = aggs.iter().collect();
    entries.sort_by(|left, right| left.0.cmp(right.0));
    entries
}
