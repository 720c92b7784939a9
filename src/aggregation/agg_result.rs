//! Contains the final aggregation tree.
//!
//! This tree is created from the merged [`IntermediateAggregationResults`] via
//! [`IntermediateAggregationResults::into_final_result`]. This conversion computes the final
//! result. For example: the intermediate result contains the sum and the number of values, the
//! actual average is calculated on the step from intermediate to final aggregation result tree.
//!
//! [`IntermediateAggregationResults`]: super::intermediate_agg_result::IntermediateAggregationResults
//! [`IntermediateAggregationResults::into_final_result`]: super::intermediate_agg_result::IntermediateAggregationResults::into_final_result

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::bucket::get_agg_name_and_property;
use super::metric::{SingleMetricResult, Stats, TopNMetricResult};
use crate::AggPhaseError;

/// The final aggregation result.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationResults(pub FxHashMap<String, AggregationResult>);

impl AggregationResults {
    /// Returns the single value of a metric aggregation, e.g. `avg_score`, or a property of a
    /// multi-value metric aggregation, e.g. `score_stats.avg`.
    pub fn get_value_from_aggregation(&self, name: &str) -> crate::Result<Option<f64>> {
        let (agg_name, agg_property) = get_agg_name_and_property(name);
        match self.0.get(agg_name) {
            Some(AggregationResult::MetricResult(metric)) => metric.get_value(agg_property),
            Some(AggregationResult::BucketResult(_)) => Err(AggPhaseError::InvalidArgument(
                format!("aggregation [{agg_name}] is a bucket aggregation, not a metric"),
            )),
            None => Err(AggPhaseError::InvalidArgument(format!(
                "could not find aggregation [{agg_name}]"
            ))),
        }
    }
}

/// An aggregation is either a bucket or a metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationResult {
    /// Bucket result variant.
    BucketResult(BucketResult),
    /// Metric result variant.
    MetricResult(MetricResult),
}

/// MetricResult
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricResult {
    /// Count metric result.
    Count(SingleMetricResult),
    /// Average metric result.
    Average(SingleMetricResult),
    /// Max metric result.
    Max(SingleMetricResult),
    /// Min metric result.
    Min(SingleMetricResult),
    /// Stats metric result.
    Stats(Stats),
    /// Sum metric result.
    Sum(SingleMetricResult),
    /// Top n metric result.
    TopN(TopNMetricResult),
    /// Result of a pipeline aggregation over the buckets of a sibling aggregation.
    BucketMetric(SingleMetricResult),
}

impl MetricResult {
    fn get_value(&self, agg_property: &str) -> crate::Result<Option<f64>> {
        match self {
            MetricResult::Count(single)
            | MetricResult::Average(single)
            | MetricResult::Max(single)
            | MetricResult::Min(single)
            | MetricResult::Sum(single)
            | MetricResult::BucketMetric(single) => Ok(single.value),
            MetricResult::Stats(stats) => stats.get_value(agg_property),
            MetricResult::TopN(_) => Err(AggPhaseError::InvalidArgument(
                "top_n aggregations have no single value".to_string(),
            )),
        }
    }
}

/// BucketEntry holds bucket aggregation result types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketResult {
    /// This is the term result
    Terms {
        /// The buckets, sorted by doc count then term.
        buckets: Vec<BucketEntry>,
        /// The number of documents that didn't make it into the top N due to shard_size or size
        sum_other_doc_count: u64,
    },
    /// This is the histogram entry for a bucket, which contains a key, count, and optionally
    /// sub_aggregations.
    Histogram {
        /// The buckets, sorted by key.
        ///
        /// If there are holes depends on the request, if min_doc_count is 0, then there are no
        /// holes between the first and last bucket.
        /// See [`HistogramAggregation`](super::bucket::HistogramAggregation)
        buckets: Vec<BucketEntry>,
    },
}

impl BucketResult {
    /// The buckets of the result.
    pub fn buckets(&self) -> &[BucketEntry] {
        match self {
            BucketResult::Terms { buckets, .. } | BucketResult::Histogram { buckets } => buckets,
        }
    }
}

/// This is the default entry for a bucket, which contains a key, count, and optionally
/// sub_aggregations.
///
/// # JSON Format
/// ```json
/// {
///   ...
///     "my_histogram": {
///       "buckets": [
///         {
///           "key": 2.0,
///           "doc_count": 5
///         },
///         {
///           "key": 4.0,
///           "doc_count": 2
///         }
///       ]
///    }
///    ...
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketEntry {
    /// The identifier of the bucket.
    pub key: Key,
    /// Number of documents in the bucket.
    pub doc_count: u64,
    #[serde(flatten)]
    /// sub-aggregations in this bucket.
    pub sub_aggregation: AggregationResults,
}

/// The key to identify a bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// String key
    Str(String),
    /// `f64` key
    F64(f64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Key::Str(val) => f.write_str(val),
            Key::F64(val) => f.write_str(&val.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> AggregationResults {
        let mut results = AggregationResults::default();
        results.0.insert(
            "avg".to_string(),
            AggregationResult::MetricResult(MetricResult::Average(Some(2.5f64).into())),
        );
        results.0.insert(
            "stats".to_string(),
            AggregationResult::MetricResult(MetricResult::Stats(Stats {
                count: 2,
                sum: 5.0,
                min: Some(1.0),
                max: Some(4.0),
                avg: Some(2.5),
            })),
        );
        results.0.insert(
            "terms".to_string(),
            AggregationResult::BucketResult(BucketResult::Terms {
                buckets: vec![BucketEntry {
                    key: Key::Str("a".to_string()),
                    doc_count: 2,
                    sub_aggregation: AggregationResults::default(),
                }],
                sum_other_doc_count: 0,
            }),
        );
        results
    }

    #[test]
    fn test_get_value_from_aggregation() -> crate::Result<()> {
        let results = results();
        assert_eq!(results.get_value_from_aggregation("avg")?, Some(2.5));
        assert_eq!(results.get_value_from_aggregation("stats.max")?, Some(4.0));
        assert!(results.get_value_from_aggregation("stats.nope").is_err());
        assert!(results.get_value_from_aggregation("terms").is_err());
        assert!(results.get_value_from_aggregation("missing").is_err());
        Ok(())
    }

    #[test]
    fn test_bucket_entry_serialization_flattens_sub_aggregations() {
        let mut sub_aggregation = AggregationResults::default();
        sub_aggregation.0.insert(
            "n".to_string(),
            AggregationResult::MetricResult(MetricResult::Count(3.0f64.into())),
        );
        let entry = BucketEntry {
            key: Key::F64(10.0),
            doc_count: 3,
            sub_aggregation,
        };
        assert_eq!(
            serde_json::to_value(entry).unwrap(),
            json!({ "key": 10.0, "doc_count": 3, "n": { "value": 3.0 } })
        );
        assert_eq!(Key::Str("a".to_string()).to_string(), "a");
    }
}
