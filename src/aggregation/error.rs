use thiserror::Error;

/// Error that may occur while building or executing aggregations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// The request is malformed, e.g. a global aggregation nested in another aggregation.
    #[error("InvalidRequest: {0:?}")]
    InvalidRequest(String),
    /// Too many buckets were created for one request.
    #[error("Aborting aggregation because too many buckets were created")]
    BucketLimitExceeded {
        /// Limit
        limit: i64,
        /// Current
        current: u64,
    },
}
