use std::sync::Arc;

use super::{Document, Segment};
use crate::{DocAddress, DocId, SegmentOrdinal};

/// Read access to one segment.
///
/// The reader is cheap to clone and can be shared between threads.
#[derive(Clone)]
pub struct SegmentReader {
    segment_ord: SegmentOrdinal,
    segment: Arc<Segment>,
}

impl SegmentReader {
    pub(crate) fn new(segment_ord: SegmentOrdinal, segment: Arc<Segment>) -> SegmentReader {
        SegmentReader {
            segment_ord,
            segment,
        }
    }

    /// The ordinal of the segment within its searcher.
    pub fn segment_ord(&self) -> SegmentOrdinal {
        self.segment_ord
    }

    /// Returns one more than the highest doc id of the segment.
    pub fn max_doc(&self) -> DocId {
        self.segment.num_docs()
    }

    /// Returns a stored document.
    ///
    /// # Panics
    /// Panics if `doc_id >= max_doc()`.
    pub fn doc(&self, doc_id: DocId) -> &Document {
        self.segment.doc(doc_id)
    }

    /// The address of a document of this segment.
    pub fn doc_address(&self, doc_id: DocId) -> DocAddress {
        DocAddress::new(self.segment_ord, doc_id)
    }

    /// Returns the numeric value of `field` for a document, if any.
    #[inline]
    pub fn f64_value(&self, doc_id: DocId, field: &str) -> Option<f64> {
        self.doc(doc_id).get(field).and_then(|value| value.as_f64())
    }

    /// Returns the keyword value of `field` for a document, if any.
    #[inline]
    pub fn str_value(&self, doc_id: DocId, field: &str) -> Option<&str> {
        self.doc(doc_id).get(field).and_then(|value| value.as_str())
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("segment_ord", &self.segment_ord)
            .field("max_doc", &self.max_doc())
            .finish()
    }
}
