use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::aggregation::agg_req::Aggregations;
use crate::aggregation::agg_result::{BucketEntry, Key};
use crate::aggregation::agg_tree::{build_segment_agg_collectors, AggregationContext};
use crate::aggregation::intermediate_agg_result::{
    IntermediateAggregationResult, IntermediateAggregationResults, IntermediateBucketResult,
    IntermediateHistogramBucketEntry,
};
use crate::aggregation::segment_agg_result::{
    GenericSegmentAggregationResultsCollector, SegmentAggregationCollector,
};
use crate::aggregation::{AggregationError, AggregationLimits};
use crate::{DocId, SegmentReader};

/// Histogram is a bucket aggregation, where buckets are created dynamically for given `interval`.
/// Each document value is rounded down to its bucket.
///
/// E.g. if we have a price 18 and an interval of 5, the document will fall into the bucket with
/// the key 15. The formula used for this is:
/// `((val - offset) / interval).floor() * interval + offset`
///
/// # Returned Buckets
/// By default buckets are returned between the min and max value of the documents, including empty
/// buckets.
/// Setting min_doc_count to != 0 will filter empty buckets.
///
/// # JSON Format
/// ```json
/// {
///     "prices": {
///         "histogram": {
///             "field": "price",
///             "interval": 10
///         }
///     }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramAggregation {
    /// The field to aggregate on.
    pub field: String,
    /// The interval to chunk your data range. Each bucket spans a value range of [0..interval).
    /// Must be a positive value.
    pub interval: f64,
    /// Shifts the grid of buckets to `[offset + interval * k, offset + interval * (k + 1))`.
    /// Offset has to be in the range [0, interval).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offset: Option<f64>,
    /// The minimum number of documents in a bucket to be returned. Defaults to 0.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_doc_count: Option<u64>,
    /// Values outside of the `[min, max]` closed interval are ignored.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hard_bounds: Option<HistogramBounds>,
}

/// Used to set extended or hard bounds on the histogram.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramBounds {
    /// The lower bounds.
    pub min: f64,
    /// The upper bounds.
    pub max: f64,
}

impl HistogramBounds {
    fn contains(&self, val: f64) -> bool {
        val >= self.min && val <= self.max
    }
}

impl HistogramAggregation {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.interval <= 0.0 || !self.interval.is_finite() {
            return Err(AggregationError::InvalidRequest(format!(
                "histogram interval must be a positive value, got {}",
                self.interval
            ))
            .into());
        }
        if let Some(offset) = self.offset {
            if !(0.0..self.interval).contains(&offset) {
                return Err(AggregationError::InvalidRequest(format!(
                    "histogram offset must be in [0, interval), got {offset}"
                ))
                .into());
            }
        }
        if let Some(bounds) = self.hard_bounds {
            if bounds.min > bounds.max {
                return Err(AggregationError::InvalidRequest(format!(
                    "hard_bounds min {} is greater than max {}",
                    bounds.min, bounds.max
                ))
                .into());
            }
        }
        Ok(())
    }

    fn offset(&self) -> f64 {
        self.offset.unwrap_or(0.0)
    }

    pub(crate) fn min_doc_count(&self) -> u64 {
        self.min_doc_count.unwrap_or(0)
    }

    #[inline]
    fn bucket_pos(&self, val: f64) -> i64 {
        ((val - self.offset()) / self.interval).floor() as i64
    }

    #[inline]
    fn bucket_key(&self, pos: i64) -> f64 {
        pos as f64 * self.interval + self.offset()
    }
}

#[derive(Debug)]
struct HistogramBucketEntry {
    doc_count: u64,
    sub_aggregations: GenericSegmentAggregationResultsCollector,
}

#[derive(Debug)]
pub(crate) struct SegmentHistogramCollector {
    req: HistogramAggregation,
    buckets: FxHashMap<i64, HistogramBucketEntry>,
    sub_aggregation_req: Option<Arc<Aggregations>>,
    ctx: AggregationContext,
}

impl SegmentHistogramCollector {
    pub(crate) fn from_req(
        req: &HistogramAggregation,
        sub_aggregation_req: Option<Arc<Aggregations>>,
        ctx: &AggregationContext,
    ) -> SegmentHistogramCollector {
        SegmentHistogramCollector {
            req: req.clone(),
            buckets: FxHashMap::default(),
            sub_aggregation_req,
            ctx: ctx.clone(),
        }
    }
}

impl SegmentAggregationCollector for SegmentHistogramCollector {
    fn collect(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()> {
        let Some(val) = reader.f64_value(doc, &self.req.field) else {
            return Ok(());
        };
        if let Some(bounds) = self.req.hard_bounds {
            if !bounds.contains(val) {
                return Ok(());
            }
        }
        let pos = self.req.bucket_pos(val);
        if !self.buckets.contains_key(&pos) {
            self.ctx.limits.add_buckets(1)?;
            let sub_aggregations = match &self.sub_aggregation_req {
                Some(sub_req) => build_segment_agg_collectors(sub_req, &self.ctx)?,
                None => GenericSegmentAggregationResultsCollector::default(),
            };
            self.buckets.insert(
                pos,
                HistogramBucketEntry {
                    doc_count: 0,
                    sub_aggregations,
                },
            );
        }
        if let Some(bucket) = self.buckets.get_mut(&pos) {
            bucket.doc_count += 1;
            bucket.sub_aggregations.collect(doc, reader)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> crate::Result<()> {
        for bucket in self.buckets.values_mut() {
            bucket.sub_aggregations.flush()?;
        }
        Ok(())
    }

    fn into_intermediate_result(self: Box<Self>) -> crate::Result<IntermediateAggregationResult> {
        let mut buckets: Vec<(i64, HistogramBucketEntry)> = self.buckets.into_iter().collect();
        buckets.sort_unstable_by_key(|(pos, _)| *pos);
        let buckets = buckets
            .into_iter()
            .map(|(pos, bucket)| {
                Ok(IntermediateHistogramBucketEntry {
                    key: self.req.bucket_key(pos),
                    doc_count: bucket.doc_count,
                    sub_aggregation: bucket
                        .sub_aggregations
                        .into_intermediate_aggregations_result()?,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(IntermediateAggregationResult::Bucket(
            IntermediateBucketResult::Histogram { buckets },
        ))
    }
}

/// Converts the merged buckets, sorted by key, to the final buckets.
///
/// With a `min_doc_count` of 0, the holes between the first and the last bucket are filled with
/// empty buckets. Those count against `limits`.
pub(crate) fn intermediate_histogram_buckets_to_final_buckets(
    buckets: Vec<IntermediateHistogramBucketEntry>,
    req: &HistogramAggregation,
    sub_aggregation: &Aggregations,
    limits: &AggregationLimits,
) -> crate::Result<Vec<BucketEntry>> {
    let min_doc_count = req.min_doc_count();
    let buckets = if min_doc_count == 0 {
        fill_empty_buckets(buckets, req, sub_aggregation, limits)?
    } else {
        buckets
            .into_iter()
            .filter(|bucket| bucket.doc_count >= min_doc_count)
            .collect()
    };
    buckets
        .into_iter()
        .map(|bucket| {
            Ok(BucketEntry {
                key: Key::F64(bucket.key),
                doc_count: bucket.doc_count,
                sub_aggregation: bucket
                    .sub_aggregation
                    .into_final_result_internal(sub_aggregation, limits)?,
            })
        })
        .collect()
}

/// Number of empty buckets between the first and the last of `buckets`.
///
/// A span that does not fit in a `u64` fails as a bucket limit breach, whatever the limit.
pub(crate) fn num_empty_histogram_buckets(
    buckets: &[IntermediateHistogramBucketEntry],
    req: &HistogramAggregation,
    limits: &AggregationLimits,
) -> crate::Result<u64> {
    let (Some(first), Some(last)) = (buckets.first(), buckets.last()) else {
        return Ok(0);
    };
    let span =
        i128::from(req.bucket_pos(last.key)) - i128::from(req.bucket_pos(first.key)) + 1;
    let span = u64::try_from(span).map_err(|_| AggregationError::BucketLimitExceeded {
        limit: limits.bucket_limit(),
        current: u64::MAX,
    })?;
    Ok(span.saturating_sub(buckets.len() as u64))
}

fn fill_empty_buckets(
    buckets: Vec<IntermediateHistogramBucketEntry>,
    req: &HistogramAggregation,
    sub_aggregation: &Aggregations,
    limits: &AggregationLimits,
) -> crate::Result<Vec<IntermediateHistogramBucketEntry>> {
    let num_empty_buckets = num_empty_histogram_buckets(&buckets, req, limits)?;
    if num_empty_buckets == 0 {
        return Ok(buckets);
    }
    limits.add_buckets(num_empty_buckets)?;
    let (Some(first), Some(last)) = (buckets.first(), buckets.last()) else {
        return Ok(buckets);
    };
    let first_pos = req.bucket_pos(first.key);
    let last_pos = req.bucket_pos(last.key);
    let mut filled = Vec::new();
    let mut buckets = buckets.into_iter().peekable();
    for pos in first_pos..=last_pos {
        match buckets.next_if(|bucket| req.bucket_pos(bucket.key) == pos) {
            Some(bucket) => filled.push(bucket),
            None => filled.push(IntermediateHistogramBucketEntry {
                key: req.bucket_key(pos),
                doc_count: 0,
                sub_aggregation: IntermediateAggregationResults::empty_from_req(sub_aggregation),
            }),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::aggregation::tests::{exec_request, exec_request_with_config, get_test_index};
    use crate::aggregation::DEFAULT_BUCKET_LIMIT;
    use crate::{Executor, Index, Query, SearchConfig};

    #[test]
    fn histogram_validate() {
        let mut req = HistogramAggregation {
            field: "score".to_string(),
            interval: 0.0,
            ..Default::default()
        };
        assert!(req.validate().is_err());
        req.interval = 10.0;
        assert!(req.validate().is_ok());
        req.offset = Some(10.0);
        assert!(req.validate().is_err());
        req.offset = Some(2.5);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn histogram_bucket_keys() {
        let req = HistogramAggregation {
            field: "score".to_string(),
            interval: 5.0,
            offset: Some(1.0),
            ..Default::default()
        };
        assert_eq!(req.bucket_key(req.bucket_pos(18.0)), 16.0);
        assert_eq!(req.bucket_key(req.bucket_pos(-4.0)), -4.0);
        assert_eq!(req.bucket_key(req.bucket_pos(0.5)), -4.0);
    }

    #[test]
    fn histogram_test() -> crate::Result<()> {
        let index = get_test_index()?;
        let agg_req: Aggregations = serde_json::from_str(
            r#"{
                "scores": {
                    "histogram": { "field": "score", "interval": 10.0, "min_doc_count": 1 },
                    "aggs": { "n": { "count": {} } }
                }
            }"#,
        )?;
        let res = exec_request(agg_req, &index)?;
        assert_eq!(
            res["scores"],
            json!({
                "buckets": [
                    { "key": -10.0, "doc_count": 1, "n": { "value": 1.0 } },
                    { "key": 0.0, "doc_count": 4, "n": { "value": 4.0 } },
                    { "key": 10.0, "doc_count": 2, "n": { "value": 2.0 } },
                    { "key": 40.0, "doc_count": 1, "n": { "value": 1.0 } }
                ]
            })
        );
        Ok(())
    }

    #[test]
    fn histogram_fills_empty_buckets() -> crate::Result<()> {
        let index = Index::from_segments(vec![
            vec![doc!("price" => 1.0), doc!("price" => 31.0)],
            vec![doc!("price" => 35.0)],
        ])?;
        let agg_req: Aggregations = serde_json::from_str(
            r#"{ "prices": { "histogram": { "field": "price", "interval": 10.0 } } }"#,
        )?;
        let res = exec_request(agg_req, &index)?;
        assert_eq!(
            res["prices"],
            json!({
                "buckets": [
                    { "key": 0.0, "doc_count": 1 },
                    { "key": 10.0, "doc_count": 0 },
                    { "key": 20.0, "doc_count": 0 },
                    { "key": 30.0, "doc_count": 2 }
                ]
            })
        );
        Ok(())
    }

    #[test]
    fn histogram_hard_bounds() -> crate::Result<()> {
        let index = get_test_index()?;
        let agg_req: Aggregations = serde_json::from_str(
            r#"{
                "scores": {
                    "histogram": {
                        "field": "score",
                        "interval": 10.0,
                        "hard_bounds": { "min": 0.0, "max": 12.0 }
                    }
                }
            }"#,
        )?;
        let res = exec_request(agg_req, &index)?;
        assert_eq!(
            res["scores"],
            json!({
                "buckets": [
                    { "key": 0.0, "doc_count": 4 },
                    { "key": 10.0, "doc_count": 1 }
                ]
            })
        );
        Ok(())
    }

    fn exec_with_bucket_limit(
        agg_req: &Aggregations,
        index: &Index,
        bucket_limit: i64,
    ) -> Vec<crate::Result<serde_json::Value>> {
        [false, true]
            .into_iter()
            .map(|concurrent| {
                let config = SearchConfig {
                    concurrent_segment_search: concurrent,
                    bucket_limit,
                    ..Default::default()
                };
                exec_request_with_config(
                    agg_req.clone(),
                    index,
                    Query::All,
                    config,
                    Executor::multi_thread(2, "histogram-limit-")?,
                )
            })
            .collect()
    }

    #[test]
    fn histogram_empty_buckets_count_against_the_bucket_limit() -> crate::Result<()> {
        let index = Index::from_segments(vec![
            vec![doc!("score" => 0.0)],
            vec![doc!("score" => 100_000.0)],
        ])?;
        let agg_req: Aggregations = serde_json::from_str(
            r#"{ "scores": { "histogram": { "field": "score", "interval": 1.0 } } }"#,
        )?;
        for res in exec_with_bucket_limit(&agg_req, &index, 10) {
            assert!(res.unwrap_err().is_too_many_buckets());
        }
        for res in exec_with_bucket_limit(&agg_req, &index, 200_000) {
            assert_eq!(res?["scores"]["buckets"].as_array().unwrap().len(), 100_001);
        }

        let agg_req: Aggregations = serde_json::from_str(
            r#"{ "scores": { "histogram": { "field": "score", "interval": 1.0, "min_doc_count": 1 } } }"#,
        )?;
        for res in exec_with_bucket_limit(&agg_req, &index, 10) {
            assert_eq!(res?["scores"]["buckets"].as_array().unwrap().len(), 2);
        }
        Ok(())
    }

    #[test]
    fn histogram_nested_empty_buckets_count_against_the_bucket_limit() -> crate::Result<()> {
        let index = Index::from_segments(vec![vec![
            doc!("text" => "a", "score" => 0.0),
            doc!("text" => "a", "score" => 50.0),
        ]])?;
        let agg_req: Aggregations = serde_json::from_str(
            r#"{
                "texts": {
                    "terms": { "field": "text" },
                    "aggs": { "scores": { "histogram": { "field": "score", "interval": 1.0 } } }
                }
            }"#,
        )?;
        // 1 term, 2 collected histogram buckets, 49 filled ones.
        for res in exec_with_bucket_limit(&agg_req, &index, 52) {
            res?;
        }
        for res in exec_with_bucket_limit(&agg_req, &index, 51) {
            assert!(res.unwrap_err().is_too_many_buckets());
        }
        Ok(())
    }

    #[test]
    fn histogram_wide_value_span_fails_without_overflow() -> crate::Result<()> {
        let index = Index::from_segments(vec![vec![
            doc!("score" => -9e18),
            doc!("score" => 9e18),
        ]])?;
        let agg_req: Aggregations = serde_json::from_str(
            r#"{ "scores": { "histogram": { "field": "score", "interval": 1.0 } } }"#,
        )?;
        for res in exec_with_bucket_limit(&agg_req, &index, DEFAULT_BUCKET_LIMIT) {
            assert!(res.unwrap_err().is_too_many_buckets());
        }
        Ok(())
    }

    #[test]
    fn histogram_span_beyond_u64_is_a_bucket_limit_breach() {
        let req = HistogramAggregation {
            field: "score".to_string(),
            interval: 1.0,
            ..Default::default()
        };
        let bucket = |key| IntermediateHistogramBucketEntry {
            key,
            doc_count: 1,
            sub_aggregation: IntermediateAggregationResults::default(),
        };
        let limits = AggregationLimits::new(Some(-1));
        let buckets = vec![bucket(-1e300), bucket(1e300)];
        let err = num_empty_histogram_buckets(&buckets, &req, &limits).unwrap_err();
        assert!(err.is_too_many_buckets());

        let buckets = vec![bucket(-2.0), bucket(0.0), bucket(3.0)];
        assert_eq!(num_empty_histogram_buckets(&buckets, &req, &limits).unwrap(), 3);
        assert_eq!(num_empty_histogram_buckets(&[], &req, &limits).unwrap(), 0);
    }
}
