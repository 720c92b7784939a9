/*!
Defines how the documents matching a search query should be processed.

The matching pass is driven by the [`Searcher`](crate::Searcher). When the pass is partitioned,
the searcher works with a [`CollectorManager`]:

- it calls [`CollectorManager::new_collector`] once per partition, possibly concurrently from
  several threads,
- it pushes every matching document of the partition into the partition's
  [`SegmentCollector`],
- once every partition is done, it hands all the segment collectors back to
  [`CollectorManager::reduce`], exactly once, on a single thread.

Collectors can be combined as siblings with tuples: `(Count, Option<AggregationManager>)` is a
collector manager whose segment collectors fan every document out to both halves.
*/

mod count_collector;

pub use self::count_collector::{Count, SegmentCountCollector};
use crate::{DocId, Score, SegmentReader};

/// The per-partition document sink.
///
/// A segment collector is owned by exactly one worker while the partition is collected.
pub trait SegmentCollector: Send {
    /// The query pushes the scored document to the collector via this method.
    ///
    /// `reader` is the reader of the segment `doc` belongs to. A partition may span several
    /// segments.
    fn collect(&mut self, doc: DocId, score: Score, reader: &SegmentReader) -> crate::Result<()>;
}

/// Creates one [`SegmentCollector`] per partition and reduces them once all partitions are
/// collected.
pub trait CollectorManager: Sync {
    /// The per-partition collector.
    type Child: SegmentCollector;
    /// The result of `reduce`.
    type Fruit: Send;

    /// Creates the collector of a new partition.
    ///
    /// Called once per partition, concurrently.
    fn new_collector(&self) -> crate::Result<Self::Child>;

    /// Combines the collectors of every partition into the final fruit.
    ///
    /// Called exactly once, after every partition completed.
    fn reduce(&self, children: Vec<Self::Child>) -> crate::Result<Self::Fruit>;
}

impl<T: SegmentCollector> SegmentCollector for &mut T {
    fn collect(&mut self, doc: DocId, score: Score, reader: &SegmentReader) -> crate::Result<()> {
        (**self).collect(doc, score, reader)
    }
}

impl<T: SegmentCollector> SegmentCollector for Option<T> {
    fn collect(&mut self, doc: DocId, score: Score, reader: &SegmentReader) -> crate::Result<()> {
        if let Some(collector) = self {
            collector.collect(doc, score, reader)?;
        }
        Ok(())
    }
}

impl<Left, Right> SegmentCollector for (Left, Right)
where
    Left: SegmentCollector,
    Right: SegmentCollector,
{
    fn collect(&mut self, doc: DocId, score: Score, reader: &SegmentReader) -> crate::Result<()> {
        self.0.collect(doc, score, reader)?;
        self.1.collect(doc, score, reader)
    }
}

impl<M: CollectorManager> CollectorManager for &M {
    type Child = M::Child;
    type Fruit = M::Fruit;

    fn new_collector(&self) -> crate::Result<M::Child> {
        (**self).new_collector()
    }

    fn reduce(&self, children: Vec<M::Child>) -> crate::Result<M::Fruit> {
        (**self).reduce(children)
    }
}

impl<M: CollectorManager> CollectorManager for Option<M> {
    type Child = Option<M::Child>;
    type Fruit = Option<M::Fruit>;

    fn new_collector(&self) -> crate::Result<Self::Child> {
        self.as_ref()
            .map(|manager| manager.new_collector())
            .transpose()
    }

    fn reduce(&self, children: Vec<Self::Child>) -> crate::Result<Self::Fruit> {
        match self {
            Some(manager) => {
                let children: Vec<M::Child> = children.into_iter().flatten().collect();
                Ok(Some(manager.reduce(children)?))
            }
            None => Ok(None),
        }
    }
}

impl<Left, Right> CollectorManager for (Left, Right)
where
    Left: CollectorManager,
    Right: CollectorManager,
{
    type Child = (Left::Child, Right::Child);
    type Fruit = (Left::Fruit, Right::Fruit);

    fn new_collector(&self) -> crate::Result<Self::Child> {
        Ok((self.0.new_collector()?, self.1.new_collector()?))
    }

    fn reduce(&self, children: Vec<Self::Child>) -> crate::Result<Self::Fruit> {
        let (left_children, right_children): (Vec<Left::Child>, Vec<Right::Child>) =
            children.into_iter().unzip();
        Ok((
            self.0.reduce(left_children)?,
            self.1.reduce(right_children)?,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Stores all of the doc addresses.
    /// This collector is only used for tests.
    #[derive(Default)]
    pub struct TestSegmentCollector {
        pub docs: Vec<crate::DocAddress>,
    }

    impl SegmentCollector for TestSegmentCollector {
        fn collect(
            &mut self,
            doc: DocId,
            _score: Score,
            reader: &SegmentReader,
        ) -> crate::Result<()> {
            self.docs.push(reader.doc_address(doc));
            Ok(())
        }
    }

    /// Collects the doc addresses of every partition, sorted.
    pub struct TestCollectorManager;

    impl CollectorManager for TestCollectorManager {
        type Child = TestSegmentCollector;
        type Fruit = Vec<crate::DocAddress>;

        fn new_collector(&self) -> crate::Result<TestSegmentCollector> {
            Ok(TestSegmentCollector::default())
        }

        fn reduce(&self, children: Vec<TestSegmentCollector>) -> crate::Result<Self::Fruit> {
            let mut docs: Vec<crate::DocAddress> =
                children.into_iter().flat_map(|child| child.docs).collect();
            docs.sort();
            Ok(docs)
        }
    }

    #[test]
    fn test_option_manager_none() -> crate::Result<()> {
        let manager: Option<TestCollectorManager> = None;
        let child = manager.new_collector()?;
        assert!(child.is_none());
        assert_eq!(manager.reduce(vec![child])?, None);
        Ok(())
    }

    #[test]
    fn test_tuple_manager_fans_out() -> crate::Result<()> {
        let index = crate::Index::from_segments(vec![vec![doc!("a" => 1.0), doc!("a" => 2.0)]])?;
        let searcher = index.searcher(crate::Executor::single_thread());
        let reader = &searcher.segment_readers()[0];
        let manager = (Count, Some(TestCollectorManager));
        let mut child = manager.new_collector()?;
        child.collect(0, 1.0, reader)?;
        child.collect(1, 1.0, reader)?;
        let (count, docs) = manager.reduce(vec![child])?;
        assert_eq!(count, 2);
        assert_eq!(docs.map(|docs| docs.len()), Some(2));
        Ok(())
    }
}
