/// How the matching pass of a request is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchPath {
    /// One pass over every segment, feeding a single collector.
    Sequential,
    /// One collector per partition of the segments, collected in parallel then reduced.
    Partitioned,
}

impl SearchPath {
    /// Chooses the path of a request.
    ///
    /// A sort optimization visiting documents in a global order cannot be combined with
    /// partitioning: a conflict always selects the sequential path.
    pub fn select(concurrent_segment_search: bool, sort_optimization_conflict: bool) -> SearchPath {
        let path = if concurrent_segment_search && !sort_optimization_conflict {
            SearchPath::Partitioned
        } else {
            SearchPath::Sequential
        };
        debug!(
            "search path {path:?} (concurrent_segment_search={concurrent_segment_search}, \
             sort_optimization_conflict={sort_optimization_conflict})"
        );
        path
    }

    /// Returns true for [`SearchPath::Partitioned`].
    pub fn is_partitioned(self) -> bool {
        self == SearchPath::Partitioned
    }
}
