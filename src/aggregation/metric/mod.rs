//! Module for all metric aggregations.
//!
//! The aggregations in this family compute metrics based on values extracted
//! from the documents that are being aggregated.
//! Some aggregations output a single numeric metric (e.g. Average) and are called
//! single-value numeric metrics aggregation, others generate multiple metrics (e.g. Stats) and are
//! called multi-value numeric metrics aggregation.
//!
//! ## Supported Metric Aggregations
//! - Average, Min, Max, Sum and [Stats](Stats), configured by a [`NumericFieldAggregation`]
//! - [Count](CountAggregation)
//! - [TopN](TopNAggregation)

mod count;
mod stats;
mod top_n;

pub use count::*;
use serde::{Deserialize, Serialize};
pub use stats::*;
pub use top_n::*;

/// Request of the aggregations computed from the values of one numeric field: `sum`, `avg`,
/// `min`, `max` and `stats`.
///
/// # JSON Format
/// ```json
/// {
///     "avg": {
///         "field": "score",
///         "missing": 0.0
///     }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumericFieldAggregation {
    /// The field name to compute the metric on.
    pub field: String,
    /// The value used for documents without a value for `field`. Such documents are ignored
    /// when no `missing` value is set.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<f64>,
}

impl NumericFieldAggregation {
    /// Creates a new [`NumericFieldAggregation`] instance from a field name.
    pub fn from_field_name(field_name: String) -> Self {
        NumericFieldAggregation {
            field: field_name,
            missing: None,
        }
    }

    /// Returns the field name the aggregation is computed on.
    pub fn field_name(&self) -> &str {
        &self.field
    }
}

/// Single-metric aggregations use this common result structure.
///
/// Main reason to wrap it in value is to match elasticsearch output structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleMetricResult {
    /// The value of the single value metric.
    pub value: Option<f64>,
}

impl From<f64> for SingleMetricResult {
    fn from(value: f64) -> Self {
        Self { value: Some(value) }
    }
}

impl From<Option<f64>> for SingleMetricResult {
    fn from(value: Option<f64>) -> Self {
        Self { value }
    }
}
