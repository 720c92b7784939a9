//! Pipeline aggregations: `sum_bucket`, `avg_bucket`, `max_bucket` and `min_bucket`.
//!
//! A pipeline aggregation never collects documents. It is computed from the final result of a
//! sibling bucket aggregation, once every other aggregation of its level is final, so it always
//! sees the merged output of the global and non-global aggregations.

use serde::{Deserialize, Serialize};

use super::agg_req::Aggregations;
use super::agg_result::{AggregationResult, AggregationResults, MetricResult};
use super::AggregationError;

/// Separator between the bucket aggregation and the metric of a `buckets_path`.
pub const BUCKETS_PATH_SEPARATOR: char = '>';

/// Path to a bucket value: `_count` for the doc count of each bucket.
pub const DOC_COUNT_PATH: &str = "_count";

/// Computes a metric over the buckets of a sibling bucket aggregation.
///
/// # JSON Format
/// ```json
/// {
///     "max_monthly_sales": {
///         "max_bucket": {
///             "buckets_path": "sales_per_month>sales"
///         }
///     }
/// }
/// ```
///
/// The part before `>` names the sibling bucket aggregation. The part after is either
/// `_count`, the doc count of each bucket, or a metric sub-aggregation of the buckets, e.g.
/// `sales` or `sales_stats.avg`. Buckets without a value are skipped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketMetricAggregation {
    /// `<bucket aggregation>><metric>`
    pub buckets_path: String,
}

impl BucketMetricAggregation {
    /// Splits the path into the sibling aggregation name and the metric path.
    pub(crate) fn split_path(&self) -> crate::Result<(&str, &str)> {
        self.buckets_path
            .split_once(BUCKETS_PATH_SEPARATOR)
            .filter(|(agg_name, metric)| !agg_name.is_empty() && !metric.is_empty())
            .ok_or_else(|| {
                AggregationError::InvalidRequest(format!(
                    "invalid buckets_path [{}], expected <aggregation>{BUCKETS_PATH_SEPARATOR}\
                     <metric>",
                    self.buckets_path
                ))
                .into()
            })
    }

    /// Checks that the path points to a sibling bucket aggregation.
    pub(crate) fn validate(&self, name: &str, siblings: &Aggregations) -> crate::Result<()> {
        let (agg_name, _) = self.split_path()?;
        match siblings.get(agg_name) {
            Some(sibling) if sibling.agg.is_bucket() => Ok(()),
            Some(_) => Err(AggregationError::InvalidRequest(format!(
                "buckets_path of [{name}] must point to a bucket aggregation, [{agg_name}] is \
                 not one"
            ))
            .into()),
            None => Err(AggregationError::InvalidRequest(format!(
                "buckets_path of [{name}] points to the unknown aggregation [{agg_name}]"
            ))
            .into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BucketMetricKind {
    Sum,
    Avg,
    Max,
    Min,
}

impl BucketMetricKind {
    fn compute(self, values: &[f64]) -> Option<f64> {
        match self {
            BucketMetricKind::Sum => Some(values.iter().sum()),
            BucketMetricKind::Avg => {
                if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
            BucketMetricKind::Max => values.iter().copied().reduce(f64::max),
            BucketMetricKind::Min => values.iter().copied().reduce(f64::min),
        }
    }
}

/// Evaluates the pipeline aggregations of `req` and adds their results to `results`.
///
/// `results` holds the final results of every other aggregation of `req`.
pub(crate) fn evaluate_pipelines(
    req: &Aggregations,
    results: &mut AggregationResults,
) -> crate::Result<()> {
    let pipelines = req
        .iter()
        .filter_map(|(name, agg)| agg.agg.as_pipeline().map(|pipeline| (name, pipeline)));
    let mut pipeline_results = Vec::new();
    for (name, (kind, pipeline_req)) in pipelines {
        let values = bucket_values(results, pipeline_req)?;
        let value = kind.compute(&values);
        pipeline_results.push((
            name.to_string(),
            AggregationResult::MetricResult(MetricResult::BucketMetric(value.into())),
        ));
    }
    results.0.extend(pipeline_results);
    Ok(())
}

fn bucket_values(
    results: &AggregationResults,
    req: &BucketMetricAggregation,
) -> crate::Result<Vec<f64>> {
    let (agg_name, metric_path) = req.split_path()?;
    let Some(AggregationResult::BucketResult(bucket_result)) = results.0.get(agg_name) else {
        return Err(AggregationError::InvalidRequest(format!(
            "buckets_path [{}] does not point to a bucket aggregation result",
            req.buckets_path
        ))
        .into());
    };
    let mut values = Vec::with_capacity(bucket_result.buckets().len());
    for bucket in bucket_result.buckets() {
        let value = if metric_path == DOC_COUNT_PATH {
            Some(bucket.doc_count as f64)
        } else {
            bucket.sub_aggregation.get_value_from_aggregation(metric_path)?
        };
        values.extend(value);
    }
    Ok(values)
}
