use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The type of a field, inferred from the first value indexed for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Numeric values, stored as `f64`.
    Numeric,
    /// Keyword values, stored untokenized.
    Keyword,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Numeric => f.write_str("numeric"),
            FieldType::Keyword => f.write_str("keyword"),
        }
    }
}

/// A value of a document field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A numeric value.
    Number(f64),
    /// A keyword value.
    Str(String),
}

impl Value {
    /// Returns the numeric value, if the value is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(val) => Some(*val),
            Value::Str(_) => None,
        }
    }

    /// Returns the keyword value, if the value is a keyword.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Number(_) => None,
            Value::Str(text) => Some(text),
        }
    }

    /// The type of the value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Number(_) => FieldType::Numeric,
            Value::Str(_) => FieldType::Keyword,
        }
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Value {
        Value::Number(val)
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Value {
        Value::Number(val as f64)
    }
}

impl From<u64> for Value {
    fn from(val: u64) -> Value {
        Value::Number(val as f64)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Value {
        Value::Str(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Value {
        Value::Str(text)
    }
}

/// A document: a set of named values. A field holds at most one value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Sets the value of a field, replacing the previous one.
    pub fn add(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns the value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Number of fields with a value.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterates over the `(field, value)` pairs, in field name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .map(|(field, value)| (field.as_str(), value))
    }

    /// Parses a document from a flat JSON object.
    ///
    /// Nested objects, arrays and booleans are rejected, `null` values are skipped.
    pub fn from_json(json: &str) -> crate::Result<Document> {
        let json_obj: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut document = Document::default();
        for (field, json_value) in json_obj {
            match json_value {
                serde_json::Value::Null => {}
                serde_json::Value::Number(number) => {
                    let val = number.as_f64().ok_or_else(|| {
                        crate::AggPhaseError::InvalidArgument(format!(
                            "Value of field {field} is not representable as f64"
                        ))
                    })?;
                    document.add(field, val);
                }
                serde_json::Value::String(text) => document.add(field, text),
                other => {
                    return Err(crate::AggPhaseError::InvalidArgument(format!(
                        "Unsupported value for field {field}: {other}"
                    )));
                }
            }
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_json() -> crate::Result<()> {
        let doc = Document::from_json(r#"{"score": 3, "text": "cool", "missing": null}"#)?;
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("score"), Some(&Value::Number(3.0)));
        assert_eq!(doc.get("text").and_then(Value::as_str), Some("cool"));
        assert!(doc.get("missing").is_none());
        Ok(())
    }

    #[test]
    fn test_document_from_json_rejects_nested() {
        assert!(Document::from_json(r#"{"obj": {"a": 1}}"#).is_err());
        assert!(Document::from_json(r#"{"arr": [1, 2]}"#).is_err());
    }
}
