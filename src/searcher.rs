use std::time::{Duration, Instant};

use crate::collector::{CollectorManager, SegmentCollector};
use crate::index::{Schema, SegmentReader};
use crate::query::Query;
use crate::{Executor, SegmentOrdinal};

/// An independent subset of the segments, collected by one worker.
///
/// Slices are assigned by the searcher. Collectors never look inside a slice: they only react
/// to however many slices there are.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafSlice {
    ordinal: usize,
    segment_ords: Vec<SegmentOrdinal>,
    num_docs: u64,
}

impl LeafSlice {
    /// The ordinal of the slice within the request.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The segments of the slice.
    pub fn segment_ords(&self) -> &[SegmentOrdinal] {
        &self.segment_ords
    }

    /// Number of documents in the slice.
    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }
}

/// Early-termination settings of the matching pass, applied per partition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Stop collecting a partition after this many documents.
    pub terminate_after: Option<usize>,
    /// Stop collecting a partition once this much time elapsed.
    pub timeout: Option<Duration>,
}

/// How the collection of a partition ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionStatus {
    /// The time budget was exhausted.
    pub timed_out: bool,
    /// `terminate_after` documents were collected.
    pub terminated_early: bool,
}

impl CollectionStatus {
    fn merge(self, other: CollectionStatus) -> CollectionStatus {
        CollectionStatus {
            timed_out: self.timed_out || other.timed_out,
            terminated_early: self.terminated_early || other.terminated_early,
        }
    }

    fn is_stopped(&self) -> bool {
        self.timed_out || self.terminated_early
    }
}

/// The result of a partitioned search.
#[derive(Debug)]
pub struct SearchOutcome<F> {
    /// The reduced fruit of the collector manager.
    pub fruit: F,
    /// Merged status of every partition.
    pub status: CollectionStatus,
    /// Number of partitions collected.
    pub num_partitions: usize,
}

/// Holds the segment readers of an index and drives the matching pass over them.
pub struct Searcher {
    schema: Schema,
    segment_readers: Vec<SegmentReader>,
    executor: Executor,
}

impl Searcher {
    pub(crate) fn new(
        schema: Schema,
        segment_readers: Vec<SegmentReader>,
        executor: Executor,
    ) -> Searcher {
        Searcher {
            schema,
            segment_readers,
            executor,
        }
    }

    /// The schema of the index.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The segment readers, in segment ordinal order.
    pub fn segment_readers(&self) -> &[SegmentReader] {
        &self.segment_readers
    }

    /// The executor partitions run on.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Groups the segments into at most `max_slice_count` slices of similar size.
    ///
    /// Without a maximum, every segment gets its own slice. Empty segments are skipped.
    pub fn slices(&self, max_slice_count: Option<usize>) -> Vec<LeafSlice> {
        let mut segments: Vec<&SegmentReader> = self
            .segment_readers
            .iter()
            .filter(|reader| reader.max_doc() > 0)
            .collect();
        let num_slices = max_slice_count
            .unwrap_or(segments.len())
            .clamp(1, segments.len().max(1))
            .min(segments.len());
        // Largest segments first, each one goes to the currently smallest slice.
        segments.sort_by_key(|reader| (std::cmp::Reverse(reader.max_doc()), reader.segment_ord()));
        let mut slices: Vec<LeafSlice> = (0..num_slices)
            .map(|ordinal| LeafSlice {
                ordinal,
                segment_ords: Vec::new(),
                num_docs: 0,
            })
            .collect();
        for reader in segments {
            if let Some(slice) = slices
                .iter_mut()
                .min_by_key(|slice| (slice.num_docs, slice.ordinal))
            {
                slice.segment_ords.push(reader.segment_ord());
                slice.num_docs += reader.max_doc() as u64;
            }
        }
        for slice in &mut slices {
            slice.segment_ords.sort_unstable();
        }
        slices
    }

    /// Runs the partitioned matching pass.
    ///
    /// `manager.new_collector()` is called once per slice, on the executor, and
    /// `manager.reduce()` once with the collectors of every slice. A partition that stops early
    /// still hands its collector to `reduce`. When there is no slice at all, one empty collector
    /// is reduced.
    pub fn search_with_manager<M: CollectorManager>(
        &self,
        query: &Query,
        manager: &M,
        slices: &[LeafSlice],
        limits: &ExecutionLimits,
    ) -> crate::Result<SearchOutcome<M::Fruit>> {
        query.validate(&self.schema)?;
        if slices.is_empty() {
            let fruit = manager.reduce(vec![manager.new_collector()?])?;
            return Ok(SearchOutcome {
                fruit,
                status: CollectionStatus::default(),
                num_partitions: 0,
            });
        }
        let collected = self.executor.map(
            |slice: &LeafSlice| {
                let mut collector = manager.new_collector()?;
                let status = self.collect_slice(query, slice, &mut collector, limits)?;
                debug!(
                    "collected slice {} ({} docs) status={status:?}",
                    slice.ordinal, slice.num_docs
                );
                Ok((collector, status))
            },
            slices.iter(),
        )?;
        let mut status = CollectionStatus::default();
        let mut children = Vec::with_capacity(collected.len());
        for (child, child_status) in collected {
            status = status.merge(child_status);
            children.push(child);
        }
        let fruit = manager.reduce(children)?;
        Ok(SearchOutcome {
            fruit,
            status,
            num_partitions: slices.len(),
        })
    }

    /// Runs the matching pass sequentially, over every segment, feeding a single collector.
    pub fn search_sequential<C: SegmentCollector>(
        &self,
        query: &Query,
        collector: &mut C,
        limits: &ExecutionLimits,
    ) -> crate::Result<CollectionStatus> {
        query.validate(&self.schema)?;
        let all_segments = LeafSlice {
            ordinal: 0,
            segment_ords: self
                .segment_readers
                .iter()
                .map(|reader| reader.segment_ord())
                .collect(),
            num_docs: self
                .segment_readers
                .iter()
                .map(|reader| reader.max_doc() as u64)
                .sum(),
        };
        self.collect_slice(query, &all_segments, collector, limits)
    }

    fn collect_slice<C: SegmentCollector>(
        &self,
        query: &Query,
        slice: &LeafSlice,
        collector: &mut C,
        limits: &ExecutionLimits,
    ) -> crate::Result<CollectionStatus> {
        let deadline = limits.timeout.map(|timeout| Instant::now() + timeout);
        let mut num_collected = 0usize;
        for &segment_ord in &slice.segment_ords {
            let reader = &self.segment_readers[segment_ord as usize];
            for doc in 0..reader.max_doc() {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Ok(CollectionStatus {
                            timed_out: true,
                            terminated_early: false,
                        });
                    }
                }
                if !query.matches(reader, doc) {
                    continue;
                }
                collector.collect(doc, 1.0, reader)?;
                num_collected += 1;
                let status = CollectionStatus {
                    timed_out: false,
                    terminated_early: limits.terminate_after == Some(num_collected),
                };
                if status.is_stopped() {
                    return Ok(status);
                }
            }
        }
        Ok(CollectionStatus::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::TestCollectorManager;
    use crate::collector::Count;
    use crate::{DocAddress, Index};

    fn test_index() -> crate::Result<Index> {
        Index::from_segments(vec![
            vec![doc!("v" => 1.0), doc!("v" => 2.0), doc!("v" => 3.0)],
            vec![doc!("v" => 4.0)],
            vec![doc!("v" => 5.0), doc!("v" => 6.0)],
            vec![doc!("v" => 7.0), doc!("v" => 8.0), doc!("v" => 9.0), doc!("v" => 10.0)],
        ])
    }

    #[test]
    fn test_slices_one_per_segment() -> crate::Result<()> {
        let searcher = test_index()?.searcher(Executor::single_thread());
        let slices = searcher.slices(None);
        assert_eq!(slices.len(), 4);
        let mut segment_ords: Vec<SegmentOrdinal> = slices
            .iter()
            .flat_map(|slice| slice.segment_ords().to_vec())
            .collect();
        segment_ords.sort();
        assert_eq!(segment_ords, vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_slices_balanced() -> crate::Result<()> {
        let searcher = test_index()?.searcher(Executor::single_thread());
        let slices = searcher.slices(Some(2));
        assert_eq!(slices.len(), 2);
        // 4 docs + 1 doc, 3 docs + 2 docs
        assert_eq!(slices[0].segment_ords(), &[1, 3]);
        assert_eq!(slices[0].num_docs(), 5);
        assert_eq!(slices[1].segment_ords(), &[0, 2]);
        assert_eq!(slices[1].num_docs(), 5);
        assert_eq!(searcher.slices(Some(10)).len(), 4);
        Ok(())
    }

    #[test]
    fn test_slices_empty_searcher() -> crate::Result<()> {
        let searcher = Index::builder().build().searcher(Executor::single_thread());
        assert!(searcher.slices(None).is_empty());
        let outcome = searcher.search_with_manager(
            &Query::All,
            &Count,
            &[],
            &ExecutionLimits::default(),
        )?;
        assert_eq!(outcome.fruit, 0);
        assert_eq!(outcome.num_partitions, 0);
        Ok(())
    }

    #[test]
    fn test_search_with_manager_multithread() -> crate::Result<()> {
        let searcher = test_index()?.searcher(Executor::multi_thread(3, "searcher-test-")?);
        let slices = searcher.slices(Some(3));
        let outcome = searcher.search_with_manager(
            &Query::range("v", Some(3.0), None),
            &TestCollectorManager,
            &slices,
            &ExecutionLimits::default(),
        )?;
        assert_eq!(outcome.num_partitions, 3);
        assert_eq!(outcome.fruit.len(), 8);
        assert_eq!(outcome.fruit[0], DocAddress::new(0, 2));
        assert_eq!(outcome.status, CollectionStatus::default());
        Ok(())
    }

    #[test]
    fn test_search_terminate_after_is_per_partition() -> crate::Result<()> {
        let searcher = test_index()?.searcher(Executor::single_thread());
        let slices = searcher.slices(None);
        let limits = ExecutionLimits {
            terminate_after: Some(2),
            timeout: None,
        };
        let outcome = searcher.search_with_manager(&Query::All, &Count, &slices, &limits)?;
        // 2 + 1 + 2 + 2
        assert_eq!(outcome.fruit, 7);
        assert!(outcome.status.terminated_early);
        assert!(!outcome.status.timed_out);
        Ok(())
    }

    #[test]
    fn test_search_timeout_still_reduces() -> crate::Result<()> {
        let searcher = test_index()?.searcher(Executor::single_thread());
        let slices = searcher.slices(None);
        let limits = ExecutionLimits {
            terminate_after: None,
            timeout: Some(Duration::ZERO),
        };
        let outcome = searcher.search_with_manager(&Query::All, &Count, &slices, &limits)?;
        assert_eq!(outcome.fruit, 0);
        assert!(outcome.status.timed_out);
        Ok(())
    }

    #[test]
    fn test_search_sequential() -> crate::Result<()> {
        let searcher = test_index()?.searcher(Executor::single_thread());
        let mut collector = crate::collector::SegmentCountCollector::default();
        let status = searcher.search_sequential(
            &Query::range("v", None, Some(5.0)),
            &mut collector,
            &ExecutionLimits::default(),
        )?;
        assert_eq!(collector.count(), 4);
        assert_eq!(status, CollectionStatus::default());
        Ok(())
    }

    #[test]
    fn test_search_unknown_field_fails() -> crate::Result<()> {
        let searcher = test_index()?.searcher(Executor::single_thread());
        let mut collector = crate::collector::SegmentCountCollector::default();
        let res = searcher.search_sequential(
            &Query::term("tenant", "a"),
            &mut collector,
            &ExecutionLimits::default(),
        );
        assert!(matches!(res, Err(crate::AggPhaseError::FieldNotFound(_))));
        Ok(())
    }
}
