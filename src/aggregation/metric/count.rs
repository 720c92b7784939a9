use serde::{Deserialize, Serialize};

use crate::aggregation::intermediate_agg_result::{
    IntermediateAggregationResult, IntermediateMetricResult,
};
use crate::aggregation::segment_agg_result::SegmentAggregationCollector;
use crate::{DocId, SegmentReader};

/// Counts the documents of the aggregated set.
///
/// With a `field`, only the documents holding a value for that field are counted.
///
/// # JSON Format
/// ```json
/// {
///     "count": {
///         "field": "score"
///     }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CountAggregation {
    /// Only count documents with a value for this field.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct SegmentCountCollector {
    field: Option<String>,
    count: u64,
}

impl SegmentCountCollector {
    pub(crate) fn from_req(req: &CountAggregation) -> SegmentCountCollector {
        SegmentCountCollector {
            field: req.field.clone(),
            count: 0,
        }
    }
}

impl SegmentAggregationCollector for SegmentCountCollector {
    #[inline]
    fn collect(&mut self, doc: DocId, reader: &SegmentReader) -> crate::Result<()> {
        let has_value = match &self.field {
            Some(field) => reader.doc(doc).get(field).is_some(),
            None => true,
        };
        if has_value {
            self.count += 1;
        }
        Ok(())
    }

    fn into_intermediate_result(self: Box<Self>) -> crate::Result<IntermediateAggregationResult> {
        Ok(IntermediateAggregationResult::Metric(
            IntermediateMetricResult::Count(self.count),
        ))
    }
}
