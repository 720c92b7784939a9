#![warn(missing_docs)]
#![allow(clippy::len_without_is_empty)]

//! `aggphase` is the shard-level aggregation phase of a segment-partitioned search engine.
//!
//! A search request carries an aggregation request. Its aggregations are split in two trees:
//! - non-global aggregations only see the documents matching the request's query. They are
//!   collected during the main matching pass, either sequentially or once per partition of the
//!   segments, in parallel.
//! - global aggregations see every document of the shard (modulo structural filters such as
//!   tenant filters). They run once, sequentially, after the main matching pass.
//!
//! Partial results of every partition and of the global pass are then merged into a single
//! result, attached to the request's output.
//!
//! ```rust
//! use aggphase::aggregation::agg_req::Aggregations;
//! use aggphase::{doc, Executor, Index, Query, QueryPhase, SearchConfig, SearchContext};
//!
//! # fn main() -> aggphase::Result<()> {
//! let mut index_builder = Index::builder();
//! index_builder.add_document(doc!("score" => 1.0, "text" => "cool"))?;
//! index_builder.add_document(doc!("score" => 3.0, "text" => "cool"))?;
//! index_builder.commit();
//! index_builder.add_document(doc!("score" => 7.0, "text" => "nohit"))?;
//! let index = index_builder.build();
//!
//! let agg_req: Aggregations = serde_json::from_str(
//!     r#"{ "num_docs": { "count": {} }, "everything": { "sum": { "field": "score" }, "global": true } }"#,
//! )?;
//! let config = SearchConfig {
//!     concurrent_segment_search: true,
//!     ..Default::default()
//! };
//! let searcher = index.searcher(Executor::multi_thread(2, "agg-doc-")?);
//! let query = Query::term("text", "cool");
//! let mut context = SearchContext::new(query, config).with_aggregations(agg_req.clone());
//! QueryPhase::execute(&mut context, &searcher)?;
//!
//! let merged = context.query_result_mut().take_aggregations().unwrap();
//! let json = serde_json::to_value(merged.into_final_result(&agg_req)?)?;
//! assert_eq!(json["num_docs"]["value"], 2.0);
//! assert_eq!(json["everything"]["value"], 11.0);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate serde_json;

#[macro_use]
mod macros;

pub mod aggregation;
pub mod collector;
mod config;
mod context;
mod error;
mod executor;
pub mod index;
mod profiler;
pub mod query;
mod query_phase;
mod searcher;

pub use crate::config::SearchConfig;
pub use crate::context::{QuerySearchResult, SearchContext, SearchContextAggregations};
pub use crate::error::AggPhaseError;
pub use crate::executor::Executor;
pub use crate::index::{Document, Index, IndexBuilder, Schema, SegmentReader, Value};
pub use crate::profiler::{CollectorProfile, Profilers, QueryProfiler};
pub use crate::query::Query;
pub use crate::query_phase::QueryPhase;
pub use crate::searcher::{CollectionStatus, ExecutionLimits, LeafSlice, SearchOutcome, Searcher};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, AggPhaseError>;

/// A document identifier, local to its segment.
pub type DocId = u32;

/// A score assigned to a matching document.
pub type Score = f32;

/// The ordinal of a segment within the searcher's segment list.
pub type SegmentOrdinal = u32;

/// The address of a document within a searcher: its segment and its doc id within that segment.
///
/// Addresses are totally ordered, segment first. This order is used as a tie-break whenever
/// documents have to be ranked deterministically.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct DocAddress {
    /// The segment ordinal.
    pub segment_ord: SegmentOrdinal,
    /// The segment-local doc id.
    pub doc_id: DocId,
}

impl DocAddress {
    /// Creates a new `DocAddress`.
    pub fn new(segment_ord: SegmentOrdinal, doc_id: DocId) -> DocAddress {
        DocAddress {
            segment_ord,
            doc_id,
        }
    }
}
