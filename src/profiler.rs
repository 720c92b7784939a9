//! Optional instrumentation of the collectors of a request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reason attached to the profile of the non-global aggregation collectors.
pub const REASON_AGGREGATION: &str = "aggregation";
/// Reason attached to the profile of the global aggregation collector.
pub const REASON_AGGREGATION_GLOBAL: &str = "aggregation_global";

/// Counters of one profiled collector. Shared between the collector and the profiler.
#[derive(Debug)]
pub struct CollectorProfile {
    reason: &'static str,
    num_collected_docs: AtomicU64,
    collect_nanos: AtomicU64,
}

impl CollectorProfile {
    pub(crate) fn new(reason: &'static str) -> Arc<CollectorProfile> {
        Arc::new(CollectorProfile {
            reason,
            num_collected_docs: AtomicU64::new(0),
            collect_nanos: AtomicU64::new(0),
        })
    }

    /// The reason the collector was created for.
    pub fn reason(&self) -> &'static str {
        self.reason
    }

    /// Number of documents pushed to the collector.
    pub fn num_collected_docs(&self) -> u64 {
        self.num_collected_docs.load(Ordering::Relaxed)
    }

    /// Time spent in the collector.
    pub fn collect_time(&self) -> Duration {
        Duration::from_nanos(self.collect_nanos.load(Ordering::Relaxed))
    }

    pub(crate) fn record(&self, elapsed: Duration) {
        self.num_collected_docs.fetch_add(1, Ordering::Relaxed);
        self.collect_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }
}

/// The profile of one executed query: the collectors registered for it.
#[derive(Debug, Default)]
pub struct QueryProfiler {
    collectors: Vec<Arc<CollectorProfile>>,
}

impl QueryProfiler {
    /// Registers the profile of a collector run by this query.
    pub fn set_collector(&mut self, profile: Arc<CollectorProfile>) {
        self.collectors.push(profile);
    }

    /// The profiles of the collectors registered for this query.
    pub fn collectors(&self) -> &[Arc<CollectorProfile>] {
        &self.collectors
    }
}

/// Profilers of one request. The main query gets the first profiler; every extra query, such
/// as the global aggregation pass, adds its own.
#[derive(Debug)]
pub struct Profilers {
    query_profilers: Vec<QueryProfiler>,
}

impl Default for Profilers {
    fn default() -> Self {
        Profilers {
            query_profilers: vec![QueryProfiler::default()],
        }
    }
}

impl Profilers {
    /// The profiler of the main query.
    pub fn current_query_profiler(&mut self) -> &mut QueryProfiler {
        // There is always at least the main query profiler.
        let last = self.query_profilers.len() - 1;
        &mut self.query_profilers[last]
    }

    /// Starts the profile of a new query.
    pub fn add_query_profiler(&mut self) -> &mut QueryProfiler {
        self.query_profilers.push(QueryProfiler::default());
        self.current_query_profiler()
    }

    /// All query profiles, in execution order.
    pub fn query_profilers(&self) -> &[QueryProfiler] {
        &self.query_profilers
    }
}
