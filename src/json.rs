//! Dot-path navigation over JSON values.

use serde_json::Value;

/// A failed path walk, with enough detail for a useful runtime error.
#[derive(Debug, Clone, PartialEq)]
pub struct PathError {
    pub segment: String,
    pub message: String,
}

/// Walks `a.b.2.c` style paths through nested objects and arrays.
///
/// Every segment must resolve: a missing property, a non-numeric index into
/// an array, or an index past the end all fail with the offending segment.
pub fn walk_path<'a>(value: &'a Value, path: &str) -> Result<&'a Value, PathError> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment).ok_or_else(|| PathError {
                segment: segment.to_string(),
                message: format!("no property named `{segment}`"),
            })?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| PathError {
                    segment: segment.to_string(),
                    message: format!("`{segment}` is not a valid array index"),
                })?;
                items.get(index).ok_or_else(|| PathError {
                    segment: segment.to_string(),
                    message: format!("index {index} is out of bounds (length {})", items.len()),
                })?
            }
            other => {
                return Err(PathError {
                    segment: segment.to_string(),
                    message: format!("cannot index into a {}", type_name(other)),
                })
            }
        };
    }
    Ok(current)
}

/// How a JSON value appears in tag output: strings bare, null empty,
/// everything else as compact JSON.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_objects_and_arrays() {
        let value = json!({"a": {"b": [10, {"c": "found"}]}});
        assert_eq!(walk_path(&value, "a.b.0").unwrap(), &json!(10));
        assert_eq!(walk_path(&value, "a.b.1.c").unwrap(), &json!("found"));
    }

    #[test]
    fn missing_property_names_the_segment() {
        let value = json!({"a": 1});
        let err = walk_path(&value, "b").unwrap_err();
        assert_eq!(err.segment, "b");
        assert!(err.message.contains("no property"));
    }

    #[test]
    fn out_of_bounds_index_reports_length() {
        let value = json!([1, 2]);
        let err = walk_path(&value, "5").unwrap_err();
        assert!(err.message.contains("length 2"));
    }

    #[test]
    fn non_numeric_index_into_array_fails() {
        let value = json!([1, 2]);
        let err = walk_path(&value, "x").unwrap_err();
        assert!(err.message.contains("not a valid array index"));
    }

    #[test]
    fn scalars_cannot_be_indexed() {
        let value = json!(42);
        let err = walk_path(&value, "a").unwrap_err();
        assert!(err.message.contains("cannot index into a number"));
    }

    #[test]
    fn display_strings_bare_and_null_empty() {
        assert_eq!(display(&json!("hi")), "hi");
        assert_eq!(display(&json!(null)), "");
        assert_eq!(display(&json!([1, 2])), "[1,2]");
    }
}
