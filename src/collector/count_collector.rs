use super::{CollectorManager, SegmentCollector};
use crate::{DocId, Score, SegmentReader};

/// `Count` only counts how many documents match the query.
///
/// ```rust
/// use aggphase::collector::Count;
/// use aggphase::{doc, Executor, ExecutionLimits, Index, Query};
///
/// # fn main() -> aggphase::Result<()> {
/// let index = Index::from_segments(vec![
///     vec![doc!("title" => "The Name of the Wind"), doc!("title" => "The Diary of Muadib")],
///     vec![doc!("title" => "A Dairy Cow"), doc!("title" => "The Diary of Muadib")],
/// ])?;
/// let searcher = index.searcher(Executor::single_thread());
///
/// let query = Query::term("title", "The Diary of Muadib");
/// let slices = searcher.slices(None);
/// let outcome = searcher.search_with_manager(&query, &Count, &slices, &ExecutionLimits::default())?;
///
/// assert_eq!(outcome.fruit, 2);
/// # Ok(())
/// # }
/// ```
pub struct Count;

impl CollectorManager for Count {
    type Child = SegmentCountCollector;
    type Fruit = usize;

    fn new_collector(&self) -> crate::Result<SegmentCountCollector> {
        Ok(SegmentCountCollector::default())
    }

    fn reduce(&self, segment_counts: Vec<SegmentCountCollector>) -> crate::Result<usize> {
        Ok(segment_counts
            .into_iter()
            .map(|collector| collector.count)
            .sum())
    }
}

/// Per-partition counter of [`Count`].
#[derive(Default, Debug)]
pub struct SegmentCountCollector {
    count: usize,
}

impl SegmentCountCollector {
    /// The number of documents collected so far.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl SegmentCollector for SegmentCountCollector {
    fn collect(&mut self, _: DocId, _: Score, _: &SegmentReader) -> crate::Result<()> {
        self.count += 1;
        Ok(())
    }
}
