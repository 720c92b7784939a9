//! # Aggregations
//!
//! An aggregation summarizes the documents of a request as statistics on buckets or metrics.
//!
//! There are three categories: [Metrics](metric), [Buckets](bucket) and
//! [pipelines](pipeline), computed from the buckets of a sibling aggregation.
//!
//! ## Usage
//! Build an aggregation request by constructing [`Aggregations`](agg_req::Aggregations),
//! attach it to a [`SearchContext`](crate::SearchContext) and execute the
//! [`QueryPhase`](crate::QueryPhase). The merged
//! [`IntermediateAggregationResults`] end up in the request's
//! [`QuerySearchResult`](crate::QuerySearchResult), and are converted into the final
//! [`AggregationResults`](agg_result::AggregationResults) with
//! [`into_final_result`](IntermediateAggregationResults::into_final_result).
//!
//! ## Global aggregations
//! A top-level aggregation flagged `"global": true` ignores the request's query: it sees every
//! document passing the structural filters of the request. Global aggregations are collected
//! in a separate sequential pass, after the main matching pass, and merged with the other
//! aggregations before the result is attached.
//!
//! ## JSON Format
//! Aggregation requests and results de/serialize into elasticsearch compatible JSON.
//!
//! ```
//! use aggphase::aggregation::agg_req::Aggregations;
//!
//! let agg_req: Aggregations = serde_json::from_str(
//!     r#"{
//!         "texts": {
//!             "terms": { "field": "text", "size": 5 },
//!             "aggs": { "average_score": { "avg": { "field": "score" } } }
//!         },
//!         "best_average": { "max_bucket": { "buckets_path": "texts>average_score" } },
//!         "everywhere": { "stats": { "field": "score" }, "global": true }
//!     }"#,
//! )
//! .unwrap();
//! assert_eq!(agg_req.len(), 3);
//! ```
//!
//! ## Supported Aggregations
//! - [Bucket](bucket)
//!     - [Histogram](bucket::HistogramAggregation)
//!     - [Terms](bucket::TermsAggregation)
//! - [Metric](metric)
//!     - Average, Min, Max, Sum and [Stats](metric::Stats)
//!     - [Count](metric::CountAggregation)
//!     - [TopN](metric::TopNAggregation)
//! - [Pipeline](pipeline)
//!     - `sum_bucket`, `avg_bucket`, `max_bucket` and `min_bucket`

mod agg_limits;
pub mod agg_req;
pub mod agg_result;
mod agg_tree;
pub mod bucket;
mod collector;
mod collector_manager;
mod error;
mod global;
pub mod intermediate_agg_result;
pub mod metric;
mod path;
pub mod pipeline;
mod processor;
mod segment_agg_result;

#[cfg(test)]
mod agg_tests;

pub use agg_limits::AggregationLimits;
pub use agg_tree::{build_top_level_aggregators, AggregationContext, TopLevelAggregators};
pub use collector::{Accumulator, AccumulatorState, BucketCollector, ProfileCollector};
pub use collector_manager::{AggregationCollectorManager, AggregationFruit};
pub use error::AggregationError;
pub use global::GlobalAggregationRunner;
pub use intermediate_agg_result::IntermediateAggregationResults;
pub use path::SearchPath;
pub use processor::{AggregationPhaseState, AggregationProcessor};

/// The default maximum number of buckets of a request, before the aggregation fails.
pub const DEFAULT_BUCKET_LIMIT: i64 = 65_000;
