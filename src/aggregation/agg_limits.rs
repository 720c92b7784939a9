use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{AggregationError, DEFAULT_BUCKET_LIMIT};

/// Bucket limit after which the request fails. Defaults to [`DEFAULT_BUCKET_LIMIT`].
///
/// The counter is shared by every accumulator of one request: the partitions of the matching
/// pass and the global pass all count into the same `Arc<AtomicU64>`.
pub struct AggregationLimits {
    /// The counter which is shared between the aggregations for one request.
    bucket_count: Arc<AtomicU64>,
    /// The maximum number of buckets created by a request. A negative limit disables the
    /// check.
    bucket_limit: i64,
}

impl Clone for AggregationLimits {
    fn clone(&self) -> Self {
        Self {
            bucket_count: Arc::clone(&self.bucket_count),
            bucket_limit: self.bucket_limit,
        }
    }
}

impl Default for AggregationLimits {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for AggregationLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationLimits")
            .field("bucket_count", &self.bucket_count())
            .field("bucket_limit", &self.bucket_limit)
            .finish()
    }
}

impl AggregationLimits {
    /// *bucket_limit*
    /// Limits the number of buckets created by an aggregation request.
    /// bucket_limit will default to `DEFAULT_BUCKET_LIMIT` (65000)
    ///
    /// Note: The returned instance contains a Arc shared counter to track the buckets.
    pub fn new(bucket_limit: Option<i64>) -> Self {
        Self {
            bucket_count: Default::default(),
            bucket_limit: bucket_limit.unwrap_or(DEFAULT_BUCKET_LIMIT),
        }
    }

    /// Resets the counter. Called once per request, before any accumulator is built.
    pub fn reset(&self) {
        self.bucket_count.store(0, Ordering::Relaxed);
    }

    /// Accounts for `num_buckets` new buckets.
    ///
    /// Fails without changing the counter if the new count would exceed the limit, so that
    /// concurrent callers observe a breach exactly once per bucket over the limit.
    pub fn add_buckets(&self, num_buckets: u64) -> crate::Result<()> {
        if self.bucket_limit < 0 {
            self.bucket_count.fetch_add(num_buckets, Ordering::Relaxed);
            return Ok(());
        }
        let limit = self.bucket_limit as u64;
        let update = self
            .bucket_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current
                    .checked_add(num_buckets)
                    .filter(|new_count| *new_count <= limit)
            });
        match update {
            Ok(_) => Ok(()),
            Err(current) => {
                warn!(
                    "bucket limit {} exceeded, {current} buckets already created",
                    self.bucket_limit
                );
                Err(AggregationError::BucketLimitExceeded {
                    limit: self.bucket_limit,
                    current: current.saturating_add(num_buckets),
                }
                .into())
            }
        }
    }

    /// Number of buckets created since the last reset.
    pub fn bucket_count(&self) -> u64 {
        self.bucket_count.load(Ordering::Relaxed)
    }

    /// The configured limit.
    pub fn bucket_limit(&self) -> i64 {
        self.bucket_limit
    }
}
