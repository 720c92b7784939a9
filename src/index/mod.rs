//! A small in-memory index.
//!
//! An [`Index`] is a list of immutable segments. Segments are the unit the matching pass
//! iterates over, and the unit partitions are made of.

mod document;
mod segment_reader;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use self::document::{Document, FieldType, Value};
pub use self::segment_reader::SegmentReader;
use crate::{AggPhaseError, Executor, Searcher};

/// The schema of an index: the type of every field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    /// Returns the type of a field, if the field exists.
    pub fn get_field_type(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }

    /// Returns the type of a field, or `FieldNotFound`.
    pub fn field_type(&self, field: &str) -> crate::Result<FieldType> {
        self.get_field_type(field)
            .ok_or_else(|| AggPhaseError::FieldNotFound(field.to_string()))
    }

    /// Iterates over the field names.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields
            .iter()
            .map(|(field, field_type)| (field.as_str(), *field_type))
    }

    fn register(&mut self, field: &str, field_type: FieldType) -> crate::Result<()> {
        match self.fields.get(field) {
            Some(existing) if *existing != field_type => Err(AggPhaseError::SchemaError(format!(
                "Field {field} is {existing}, got a {field_type} value"
            ))),
            Some(_) => Ok(()),
            None => {
                self.fields.insert(field.to_string(), field_type);
                Ok(())
            }
        }
    }
}

pub(crate) struct Segment {
    docs: Vec<Document>,
}

impl Segment {
    pub(crate) fn num_docs(&self) -> u32 {
        self.docs.len() as u32
    }

    pub(crate) fn doc(&self, doc_id: crate::DocId) -> &Document {
        &self.docs[doc_id as usize]
    }
}

/// An immutable set of segments.
#[derive(Clone)]
pub struct Index {
    schema: Schema,
    segments: Vec<Arc<Segment>>,
}

impl Index {
    /// Creates an `IndexBuilder`.
    pub fn builder() -> IndexBuilder {
        IndexBuilder::default()
    }

    /// Builds an index with one segment per entry of `segments`.
    pub fn from_segments(segments: Vec<Vec<Document>>) -> crate::Result<Index> {
        let mut index_builder = Index::builder();
        for segment_docs in segments {
            for doc in segment_docs {
                index_builder.add_document(doc)?;
            }
            index_builder.commit();
        }
        Ok(index_builder.build())
    }

    /// The schema of the index.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Total number of documents.
    pub fn num_docs(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| segment.num_docs() as u64)
            .sum()
    }

    /// Creates a searcher over the current segments, running partitions on `executor`.
    pub fn searcher(&self, executor: Executor) -> Searcher {
        let segment_readers = self
            .segments
            .iter()
            .enumerate()
            .map(|(segment_ord, segment)| {
                SegmentReader::new(segment_ord as crate::SegmentOrdinal, Arc::clone(segment))
            })
            .collect();
        Searcher::new(self.schema.clone(), segment_readers, executor)
    }
}

/// Accumulates documents into segments.
///
/// Documents added since the last `commit` form a pending segment. `build` commits the pending
/// segment, if it is not empty.
#[derive(Default)]
pub struct IndexBuilder {
    schema: Schema,
    segments: Vec<Arc<Segment>>,
    pending_docs: Vec<Document>,
}

impl IndexBuilder {
    /// Adds a document to the pending segment.
    ///
    /// Fails if a value's type conflicts with the type already registered for its field.
    pub fn add_document(&mut self, doc: Document) -> crate::Result<()> {
        for (field, value) in doc.iter() {
            self.schema.register(field, value.field_type())?;
        }
        self.pending_docs.push(doc);
        Ok(())
    }

    /// Seals the pending documents into a new segment.
    pub fn commit(&mut self) {
        if self.pending_docs.is_empty() {
            return;
        }
        let docs = std::mem::take(&mut self.pending_docs);
        self.segments.push(Arc::new(Segment { docs }));
    }

    /// Builds the index.
    pub fn build(mut self) -> Index {
        self.commit();
        Index {
            schema: self.schema,
            segments: self.segments,
        }
    }
}
