//! Builds the accumulators of a request.
//!
//! Every call builds a fresh, independent tree. All the trees of one request are wired to the
//! same [`AggregationLimits`].

use std::sync::Arc;

use super::agg_limits::AggregationLimits;
use super::agg_req::{sorted_entries, Aggregation, AggregationVariants, Aggregations};
use super::bucket::{SegmentHistogramCollector, SegmentTermCollector};
use super::collector::Accumulator;
use super::metric::{
    SegmentCountCollector, SegmentStatsCollector, SegmentStatsType, SegmentTopNCollector,
    MAX_TOP_N_SIZE,
};
use super::pipeline::BUCKETS_PATH_SEPARATOR;
use super::segment_agg_result::{
    GenericSegmentAggregationResultsCollector, SegmentAggregationCollector,
};
use super::AggregationError;
use crate::index::{FieldType, Schema};
use crate::AggPhaseError;

/// What the accumulators of one partition share with the rest of the request.
#[derive(Clone, Debug, Default)]
pub struct AggregationContext {
    pub(crate) limits: AggregationLimits,
}

impl AggregationContext {
    /// Creates a context counting buckets into `limits`.
    pub fn new(limits: AggregationLimits) -> AggregationContext {
        AggregationContext { limits }
    }

    /// The bucket limiter of the request.
    pub fn limits(&self) -> &AggregationLimits {
        &self.limits
    }
}

/// The top-level accumulators of one partition, sorted by aggregation name.
#[derive(Debug, Default)]
pub struct TopLevelAggregators {
    /// Accumulators of the aggregations only seeing the documents matching the query.
    pub non_global: Vec<Accumulator>,
    /// Accumulators of the aggregations seeing every document.
    pub global: Vec<Accumulator>,
}

/// Validates a request against the schema of the searched index.
///
/// A field missing from the schema is accepted: no document carries it and the aggregation
/// stays empty. A field of the wrong type is rejected.
pub(crate) fn validate_aggregations(req: &Aggregations, schema: &Schema) -> crate::Result<()> {
    validate_level(req, schema, true)
}

fn validate_level(req: &Aggregations, schema: &Schema, top_level: bool) -> crate::Result<()> {
    for (name, agg) in sorted_entries(req) {
        validate_aggregation(name, agg, req, schema, top_level)?;
        validate_level(&agg.sub_aggregation, schema, false)?;
    }
    Ok(())
}

fn invalid_request(msg: String) -> AggPhaseError {
    AggregationError::InvalidRequest(msg).into()
}

fn validate_aggregation(
    name: &str,
    agg: &Aggregation,
    siblings: &Aggregations,
    schema: &Schema,
    top_level: bool,
) -> crate::Result<()> {
    if name.is_empty() || name.contains(BUCKETS_PATH_SEPARATOR) {
        return Err(invalid_request(format!(
            "invalid aggregation name [{name}]"
        )));
    }
    if agg.global && !top_level {
        return Err(invalid_request(format!(
            "global aggregation [{name}] must be a top level aggregation"
        )));
    }
    if !agg.agg.is_bucket() && !agg.sub_aggregation.is_empty() {
        return Err(invalid_request(format!(
            "aggregation [{name}] cannot have sub-aggregations"
        )));
    }
    if let Some((_, pipeline)) = agg.agg.as_pipeline() {
        if agg.global {
            return Err(invalid_request(format!(
                "pipeline aggregation [{name}] cannot be global"
            )));
        }
        return pipeline.validate(name, siblings);
    }
    match &agg.agg {
        AggregationVariants::Histogram(histogram) => histogram.validate()?,
        AggregationVariants::TopN(top_n) if !(1..=MAX_TOP_N_SIZE).contains(&top_n.size) => {
            return Err(invalid_request(format!(
                "top_n aggregation [{name}] needs a size in [1, {MAX_TOP_N_SIZE}], got {}",
                top_n.size
            )));
        }
        AggregationVariants::Terms(terms) if terms.size == Some(0) => {
            return Err(invalid_request(format!(
                "terms aggregation [{name}] needs a size greater than 0"
            )));
        }
        _ => {}
    }
    let expected_type = match &agg.agg {
        AggregationVariants::Terms(_) => Some(FieldType::Keyword),
        AggregationVariants::Count(_) => None,
        _ => Some(FieldType::Numeric),
    };
    if let (Some(field), Some(expected_type)) = (agg.agg.field_name(), expected_type) {
        if let Some(field_type) = schema.get_field_type(field) {
            if field_type != expected_type {
                return Err(AggPhaseError::SchemaError(format!(
                    "aggregation [{name}] expects a {expected_type} field, [{field}] is \
                     {field_type}"
                )));
            }
        }
    }
    Ok(())
}

fn sub_aggregation_req(agg: &Aggregation) -> Option<Arc<Aggregations>> {
    if agg.sub_aggregation.is_empty() {
        None
    } else {
        Some(Arc::new(agg.sub_aggregation.clone()))
    }
}

/// Builds the collector of one aggregation. Returns `None` for pipeline aggregations.
pub(crate) fn build_segment_agg_collector(
    agg: &Aggregation,
    ctx: &AggregationContext,
) -> Option<Box<dyn SegmentAggregationCollector>> {
    let collector: Box<dyn SegmentAggregationCollector> = match &agg.agg {
        AggregationVariants::Terms(terms) => Box::new(SegmentTermCollector::from_req(
            terms,
            sub_aggregation_req(agg),
            ctx,
        )),
        AggregationVariants::Histogram(histogram) => Box::new(
            SegmentHistogramCollector::from_req(histogram, sub_aggregation_req(agg), ctx),
        ),
        AggregationVariants::Count(count) => Box::new(SegmentCountCollector::from_req(count)),
        AggregationVariants::Sum(req) => Box::new(SegmentStatsCollector::from_req(
            req,
            SegmentStatsType::Sum,
        )),
        AggregationVariants::Average(req) => Box::new(SegmentStatsCollector::from_req(
            req,
            SegmentStatsType::Average,
        )),
        AggregationVariants::Min(req) => Box::new(SegmentStatsCollector::from_req(
            req,
            SegmentStatsType::Min,
        )),
        AggregationVariants::Max(req) => Box::new(SegmentStatsCollector::from_req(
            req,
            SegmentStatsType::Max,
        )),
        AggregationVariants::Stats(req) => Box::new(SegmentStatsCollector::from_req(
            req,
            SegmentStatsType::Stats,
        )),
        AggregationVariants::TopN(top_n) => Box::new(SegmentTopNCollector::from_req(top_n)),
        AggregationVariants::SumBucket(_)
        | AggregationVariants::AvgBucket(_)
        | AggregationVariants::MaxBucket(_)
        | AggregationVariants::MinBucket(_) => return None,
    };
    Some(collector)
}

/// Builds the collectors of the sub-aggregations of one bucket.
pub(crate) fn build_segment_agg_collectors(
    req: &Aggregations,
    ctx: &AggregationContext,
) -> crate::Result<GenericSegmentAggregationResultsCollector> {
    let aggs = sorted_entries(req)
        .into_iter()
        .filter_map(|(name, agg)| {
            build_segment_agg_collector(agg, ctx).map(|collector| (name.clone(), collector))
        })
        .collect();
    Ok(GenericSegmentAggregationResultsCollector { aggs })
}

/// Builds the top-level accumulators of one partition.
pub fn build_top_level_aggregators(
    req: &Aggregations,
    partition_ord: u32,
    ctx: &AggregationContext,
) -> crate::Result<TopLevelAggregators> {
    Ok(TopLevelAggregators {
        non_global: build_accumulators(req, partition_ord, ctx, false)?,
        global: build_accumulators(req, partition_ord, ctx, true)?,
    })
}

/// Builds the top-level non-global accumulators of one partition.
pub(crate) fn build_non_global_aggregators(
    req: &Aggregations,
    partition_ord: u32,
    ctx: &AggregationContext,
) -> crate::Result<Vec<Accumulator>> {
    build_accumulators(req, partition_ord, ctx, false)
}

fn build_accumulators(
    req: &Aggregations,
    partition_ord: u32,
    ctx: &AggregationContext,
    global: bool,
) -> crate::Result<Vec<Accumulator>> {
    sorted_entries(req)
        .into_iter()
        .filter(|(_, agg)| agg.global == global && !agg.is_pipeline())
        .map(|(name, agg)| {
            let collector = build_segment_agg_collector(agg, ctx).ok_or_else(|| {
                AggPhaseError::InternalError(format!("no collector for aggregation [{name}]"))
            })?;
            Ok(Accumulator::new(name.clone(), partition_ord, collector))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Index;

    fn schema() -> crate::Result<Schema> {
        let index = Index::from_segments(vec![vec![doc!("score" => 1.0, "text" => "a")]])?;
        Ok(index.schema().clone())
    }

    fn validate(json: &str) -> crate::Result<()> {
        let req: Aggregations = serde_json::from_str(json)?;
        validate_aggregations(&req, &schema()?)
    }

    #[test]
    fn test_validate_accepts_valid_requests() -> crate::Result<()> {
        validate(
            r#"{
                "texts": { "terms": { "field": "text" }, "aggs": { "s": { "sum": { "field": "score" } } } },
                "all": { "count": {}, "global": true },
                "max": { "max_bucket": { "buckets_path": "texts>s" } },
                "unknown_field": { "avg": { "field": "not_in_schema" } }
            }"#,
        )
    }

    #[test]
    fn test_validate_rejects_nested_global() {
        let err = validate(
            r#"{ "texts": { "terms": { "field": "text" }, "aggs": { "all": { "count": {}, "global": true } } } }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AggPhaseError::AggregationError(AggregationError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_field_type() {
        let err = validate(r#"{ "texts": { "terms": { "field": "score" } } }"#).unwrap_err();
        assert!(matches!(err, AggPhaseError::SchemaError(_)));
        let err = validate(r#"{ "avg": { "avg": { "field": "text" } } }"#).unwrap_err();
        assert!(matches!(err, AggPhaseError::SchemaError(_)));
    }

    #[test]
    fn test_validate_rejects_invalid_pipelines() {
        assert!(validate(r#"{ "max": { "max_bucket": { "buckets_path": "nope>_count" } } }"#).is_err());
        assert!(validate(
            r#"{ "s": { "sum": { "field": "score" } }, "max": { "max_bucket": { "buckets_path": "s>_count" } } }"#
        )
        .is_err());
    }

    #[test]
    fn test_validate_bounds_top_n_size() -> crate::Result<()> {
        let top_n = |size: usize| {
            format!(r#"{{ "top": {{ "top_n": {{ "field": "score", "size": {size} }} }} }}"#)
        };
        validate(&top_n(MAX_TOP_N_SIZE))?;
        assert!(validate(&top_n(0)).is_err());
        assert!(validate(&top_n(MAX_TOP_N_SIZE + 1)).is_err());
        assert!(validate(&top_n(usize::MAX)).is_err());
        Ok(())
    }

    #[test]
    fn test_validate_rejects_metric_with_sub_aggregations() {
        assert!(validate(
            r#"{ "s": { "sum": { "field": "score" }, "aggs": { "n": { "count": {} } } } }"#
        )
        .is_err());
    }

    #[test]
    fn test_build_top_level_aggregators_splits_and_sorts() -> crate::Result<()> {
        let req: Aggregations = serde_json::from_str(
            r#"{
                "b": { "count": {} },
                "a": { "sum": { "field": "score" } },
                "g": { "count": {}, "global": true },
                "p": { "sum_bucket": { "buckets_path": "t>_count" } },
                "t": { "terms": { "field": "text" } }
            }"#,
        )?;
        let aggregators = build_top_level_aggregators(&req, 3, &AggregationContext::default())?;
        let names: Vec<&str> = aggregators.non_global.iter().map(|acc| acc.name()).collect();
        assert_eq!(names, vec!["a", "b", "t"]);
        assert_eq!(aggregators.global.len(), 1);
        assert_eq!(aggregators.global[0].name(), "g");
        assert!(aggregators
            .non_global
            .iter()
            .all(|acc| acc.partition_ord() == 3));
        let non_global = build_non_global_aggregators(&req, 4, &AggregationContext::default())?;
        let names: Vec<&str> = non_global.iter().map(|acc| acc.name()).collect();
        assert_eq!(names, vec!["a", "b", "t"]);
        Ok(())
    }

    #[test]
    fn test_trees_are_independent() -> crate::Result<()> {
        let req: Aggregations = serde_json::from_str(r#"{ "n": { "count": {} } }"#)?;
        let ctx = AggregationContext::default();
        let index = Index::from_segments(vec![vec![doc!("score" => 1.0)]])?;
        let searcher = index.searcher(crate::Executor::single_thread());
        let reader = &searcher.segment_readers()[0];
        let mut first = build_top_level_aggregators(&req, 0, &ctx)?;
        let second = build_top_level_aggregators(&req, 1, &ctx)?;
        first.non_global[0].collect(0, reader)?;
        let (_, first_res) = first.non_global.remove(0).build_top_level()?;
        let (_, second_res) = second.non_global.into_iter().next().unwrap().build_top_level()?;
        assert_ne!(first_res, second_res);
        Ok(())
    }
}
