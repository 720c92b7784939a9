use serde::{Deserialize, Serialize};

use super::NumericFieldAggregation;
use crate::aggregation::intermediate_agg_result::{
    IntermediateAggregationResult, IntermediateMetricResult,
};
use crate::aggregation::segment_agg_result::SegmentAggregationCollector;
use crate::{AggPhaseError, DocId, SegmentReader};

/// Stats contains a collection of statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// The number of documents.
    pub count: u64,
    /// The sum of the field values.
    pub sum: f64,
    /// The min value of the field values.
    pub min: Option<f64>,
    /// The max value of the field values.
    pub max: Option<f64>,
    /// The average of the field values. `None` if count equals zero.
    pub avg: Option<f64>,
}

impl Stats {
    pub(crate) fn get_value(&self, agg_property: &str) -> crate::Result<Option<f64>> {
        match agg_property {
            "count" => Ok(Some(self.count as f64)),
            "sum" => Ok(Some(self.sum)),
            "min" => Ok(self.min),
            "max" => Ok(self.max),
            "avg" => Ok(self.avg),
            _ => Err(AggPhaseError::InvalidArgument(format!(
                "Unknown property {agg_property} on stats metric aggregation"
            ))),
        }
    }
}

/// Intermediate result of the stats aggregation that can be combined with other intermediate
/// results.
///
/// Sum, average, min and max are all computed from these.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStats {
    /// The number of extracted values.
    count: u64,
    /// The sum of the extracted values.
    sum: f64,
    /// The min value.
    min: f64,
    /// The max value.
    max: f64,
}

impl Default for IntermediateStats {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::MAX,
            max: f64::MIN,
        }
    }
}

impl IntermediateStats {
    /// Merges the other stats intermediate result into self.
    pub fn merge_fruits(&mut self, other: IntermediateStats) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// The number of extracted values.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Computes the final stats value.
    pub fn finalize(&self) -> Stats {
        if self.count == 0 {
            return Stats {
                count: 0,
                sum: self.sum,
                min: None,
                max: None,
                avg: None,
            };
        }
        Stats {
            count: self.count,
            sum: self.sum,
            min: Some(self.min),
            max: Some(self.max),
            avg: Some(self.sum / (self.count as f64)),
        }
    }

    #[inline]
    pub(crate) fn collect(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SegmentStatsType {
    Average,
    Max,
    Min,
    Stats,
    Sum,
}

/// Collects sum, average, min, max and stats aggregations.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SegmentStatsCollector {
    field: String,
    missing: Option<f64>,
    pub(crate) collecting_for: SegmentStatsType,
    pub(crate) stats: IntermediateStats,
}

impl SegmentStatsCollector {
    pub fn from_req(req: &NumericFieldAggregation, collecting_for: SegmentStatsType) -> Self {
        Self {
            field: req.field.clone(),
            missing: req.missing,
            collecting_for,
            stats: IntermediateStats::default(),
        }
    }
}

impl SegmentAggregationCollector for SegmentStatsCollector {
    #[inline]
    fn collect(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()> {
        if let Some(value) = reader.f64_value(doc, &self.field).or(self.missing) {
            self.stats.collect(value);
        }
        Ok(())
    }

    fn into_intermediate_result(self: Box<Self>) -> crate::Result<IntermediateAggregationResult> {
        let metric = match self.collecting_for {
            SegmentStatsType::Average => IntermediateMetricResult::Average(self.stats),
            SegmentStatsType::Max => IntermediateMetricResult::Max(self.stats),
            SegmentStatsType::Min => IntermediateMetricResult::Min(self.stats),
            SegmentStatsType::Stats => IntermediateMetricResult::Stats(self.stats),
            SegmentStatsType::Sum => IntermediateMetricResult::Sum(self.stats),
        };
        Ok(IntermediateAggregationResult::Metric(metric))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::aggregation::agg_req::Aggregations;
    use crate::aggregation::tests::{exec_request, exec_request_with_query, get_test_index};
    use crate::Query;

    #[test]
    fn test_intermediate_stats_merge() {
        let mut left = IntermediateStats::default();
        left.collect(1.0);
        left.collect(5.0);
        let mut right = IntermediateStats::default();
        right.collect(-2.0);
        left.merge_fruits(right);
        left.merge_fruits(IntermediateStats::default());
        let stats = left.finalize();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sum, 4.0);
        assert_eq!(stats.min, Some(-2.0));
        assert_eq!(stats.max, Some(5.0));
        assert_eq!(stats.avg, Some(4.0 / 3.0));
    }

    #[test]
    fn test_aggregation_stats_empty_index() -> crate::Result<()> {
        let index = crate::Index::builder().build();
        let agg_req: Aggregations =
            serde_json::from_str(r#"{ "stats": { "stats": { "field": "score" } } }"#)?;
        let res = exec_request(agg_req, &index)?;
        assert_eq!(
            res["stats"],
            json!({
                "avg": Value::Null,
                "count": 0,
                "max": Value::Null,
                "min": Value::Null,
                "sum": 0.0
            })
        );
        Ok(())
    }

    #[test]
    fn test_aggregation_stats() -> crate::Result<()> {
        let index = get_test_index()?;
        let agg_req: Aggregations = serde_json::from_str(
            r#"{
                "stats": { "stats": { "field": "score" } },
                "sum": { "sum": { "field": "score" } },
                "avg": { "avg": { "field": "score" } },
                "min": { "min": { "field": "score" } },
                "max": { "max": { "field": "score" } }
            }"#,
        )?;
        let res = exec_request_with_query(agg_req, &index, Query::term("text", "cool"))?;
        assert_eq!(
            res["stats"],
            json!({ "avg": 12.0, "count": 5, "max": 44.0, "min": 1.0, "sum": 60.0 })
        );
        assert_eq!(res["sum"], json!({ "value": 60.0 }));
        assert_eq!(res["avg"], json!({ "value": 12.0 }));
        assert_eq!(res["min"], json!({ "value": 1.0 }));
        assert_eq!(res["max"], json!({ "value": 44.0 }));
        Ok(())
    }

    #[test]
    fn test_aggregation_stats_missing_value() -> crate::Result<()> {
        let index = get_test_index()?;
        let agg_req: Aggregations = serde_json::from_str(
            r#"{
                "no_missing": { "sum": { "field": "rating" } },
                "with_missing": { "sum": { "field": "rating", "missing": 100.0 } }
            }"#,
        )?;
        let res = exec_request(agg_req, &index)?;
        // 6 docs have a rating, 2 don't
        assert_eq!(res["no_missing"], json!({ "value": 21.0 }));
        assert_eq!(res["with_missing"], json!({ "value": 221.0 }));
        Ok(())
    }
}
