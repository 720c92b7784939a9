/// `doc!` is a shortcut that helps building `Document` objects.
///
/// ```c
/// doc!(
///     "field1" => value1,
///     "field2" => value2,
/// )
/// ```
///
/// The value can be anything convertible into a [`Value`](crate::Value): `f64`, `i64`, `u64`,
/// `&str` or `String`.
///
/// # Warning
///
/// The document hence created is not validated against a schema. Type conflicts between
/// documents are only detected when the document is added to an
/// [`IndexBuilder`](crate::IndexBuilder).
///
/// # Example
///
/// ```rust
/// use aggphase::doc;
///
/// let doc = doc!(
///     "title" => "Life Aquatic",
///     "likes" => 4u64
/// );
/// assert_eq!(doc.get("likes").and_then(|value| value.as_f64()), Some(4.0));
/// ```
#[macro_export]
macro_rules! doc(
    () => {
        {
            ($crate::Document::default())
        }
    }; // avoids a warning due to the useless `mut`.
    ($($field:expr => $value:expr),*) => {
        {
            let mut document = $crate::Document::default();
            $(
                document.add($field, $value);
            )*
            document
        }
    };
    // if there is a trailing comma retry with the trailing comma stripped.
    ($($field:expr => $value:expr),+ ,) => {
        doc!( $( $field => $value ), *)
    };
);

#[cfg(test)]
mod test {
    use crate::Value;

    #[test]
    fn test_doc_basic() {
        let doc = doc!(
            "title" => "Life Aquatic",
            "author" => "Wes Anderson",
            "likes" => 4u64
        );
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.get("author"), Some(&Value::Str("Wes Anderson".to_string())));
    }

    #[test]
    fn test_doc_trailing_comma() {
        let doc = doc!(
            "title" => "Life Aquatic",
            "likes" => -4i64,
        );
        assert_eq!(doc.get("likes"), Some(&Value::Number(-4.0)));
    }

    #[test]
    fn test_doc_empty() {
        let doc = doc!();
        assert_eq!(doc.len(), 0);
    }
}
