//! Queries select the documents a collector is fed with.

use serde::{Deserialize, Serialize};

use crate::index::{FieldType, Schema, SegmentReader, Value};
use crate::{AggPhaseError, DocId};

/// A query over the in-memory index.
///
/// # JSON Format
/// ```json
/// { "bool": { "must": [ { "term": { "field": "text", "value": "cool" } } ],
///             "must_not": [ { "range": { "field": "score", "gte": 10.0 } } ] } }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Matches every document.
    All,
    /// Matches documents whose `field` has exactly `value`.
    Term {
        /// The field name.
        field: String,
        /// The value to match.
        value: Value,
    },
    /// Matches documents whose numeric `field` lies in `[gte, lt)`.
    Range {
        /// The field name.
        field: String,
        /// Inclusive lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<f64>,
        /// Exclusive upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lt: Option<f64>,
    },
    /// Matches documents matching every `must` clause and none of the `must_not` clauses.
    ///
    /// A boolean query without `must` clauses matches every document not excluded.
    Bool {
        /// Required clauses.
        #[serde(default)]
        must: Vec<Query>,
        /// Prohibited clauses.
        #[serde(default)]
        must_not: Vec<Query>,
    },
}

impl Query {
    /// Creates a term query.
    pub fn term(field: &str, value: impl Into<Value>) -> Query {
        Query::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    /// Creates a range query.
    pub fn range(field: &str, gte: Option<f64>, lt: Option<f64>) -> Query {
        Query::Range {
            field: field.to_string(),
            gte,
            lt,
        }
    }

    /// Combines the query with a required filter.
    ///
    /// `All` is absorbed, and nested required clauses are flattened.
    pub fn and(self, filter: Query) -> Query {
        match (self, filter) {
            (Query::All, other) | (other, Query::All) => other,
            (
                Query::Bool {
                    mut must,
                    must_not,
                },
                filter,
            ) => {
                must.push(filter);
                Query::Bool { must, must_not }
            }
            (query, filter) => Query::Bool {
                must: vec![query, filter],
                must_not: Vec::new(),
            },
        }
    }

    /// Checks the query against the schema.
    ///
    /// Every referenced field must exist, and range queries require a numeric field.
    pub fn validate(&self, schema: &Schema) -> crate::Result<()> {
        match self {
            Query::All => Ok(()),
            Query::Term { field, value } => {
                let field_type = schema.field_type(field)?;
                if field_type != value.field_type() {
                    return Err(AggPhaseError::InvalidArgument(format!(
                        "Term query on {field_type} field {field} with a {} value",
                        value.field_type()
                    )));
                }
                Ok(())
            }
            Query::Range { field, .. } => {
                if schema.field_type(field)? != FieldType::Numeric {
                    return Err(AggPhaseError::InvalidArgument(format!(
                        "Range query on non numeric field {field}"
                    )));
                }
                Ok(())
            }
            Query::Bool { must, must_not } => {
                for clause in must.iter().chain(must_not.iter()) {
                    clause.validate(schema)?;
                }
                Ok(())
            }
        }
    }

    /// Returns true if the document matches the query.
    pub fn matches(&self, reader: &SegmentReader, doc: DocId) -> bool {
        match self {
            Query::All => true,
            Query::Term { field, value } => reader.doc(doc).get(field) == Some(value),
            Query::Range { field, gte, lt } => match reader.f64_value(doc, field) {
                Some(val) => {
                    gte.map(|lower| val >= lower).unwrap_or(true)
                        && lt.map(|upper| val < upper).unwrap_or(true)
                }
                None => false,
            },
            Query::Bool { must, must_not } => {
                must.iter().all(|clause| clause.matches(reader, doc))
                    && !must_not.iter().any(|clause| clause.matches(reader, doc))
            }
        }
    }
}
