//! Generic JSON tree gate shared by all policy decoders.
//!
//! Raw bytes are decoded once into a `serde_json::Value`; each decoder then
//! narrows the tree field by field with explicit type checks. Keys whose value
//! is JSON `null` are treated as absent throughout the grammar.

use log::trace;
use serde_json::{Map, Value};

use crate::error::{PolicyParseError, PolicyParseResult};

/// Decode raw bytes into a generic JSON value.
pub(crate) fn parse_to_value(data: &[u8]) -> PolicyParseResult<Value> {
    serde_json::from_slice(data).map_err(PolicyParseError::from)
}

/// Name of the JSON type of `value`, as used in error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn expect_object(value: &Value) -> PolicyParseResult<&Map<String, Value>> {
    value.as_object().ok_or(PolicyParseError::ExpectedObject {
        found: json_type_name(value),
    })
}

/// Reject the first key (in map order) that is not part of `allowed`.
pub(crate) fn reject_unknown_keys(
    object: &Map<String, Value>,
    allowed: &[&str],
) -> PolicyParseResult<()> {
    match object.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => {
            trace!("Rejecting unknown key '{}'", key);
            Err(PolicyParseError::UnknownKey(key.clone()))
        }
        None => Ok(()),
    }
}

/// Look up `key`, treating an explicit `null` the same as a missing key.
pub(crate) fn present<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

/// Look up an optional string field, failing on any non-string value.
pub(crate) fn optional_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> PolicyParseResult<Option<String>> {
    match present(object, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(PolicyParseError::InvalidFieldType {
            field,
            expected: "string",
            found: json_type_name(other),
        }),
    }
}

/// Types that can be decoded from a generic JSON tree under the policy grammar.
pub trait JsonDecode: Sized {
    /// Decode and validate `value`.
    fn from_json_value(value: &Value) -> PolicyParseResult<Self>;

    /// Decode and validate raw JSON bytes.
    ///
    /// A top-level `null` is rejected here; use [`JsonDecode::unmarshal_json`]
    /// for the no-op-on-null behaviour.
    fn from_json_slice(data: &[u8]) -> PolicyParseResult<Self> {
        let value = parse_to_value(data)?;
        Self::from_json_value(&value)
    }

    /// Decode raw JSON bytes into `self`.
    ///
    /// By convention a JSON `null` leaves `self` untouched and reports no
    /// error. On any error `self` is left unchanged as well.
    fn unmarshal_json(&mut self, data: &[u8]) -> PolicyParseResult<()> {
        let value = parse_to_value(data)?;
        if value.is_null() {
            return Ok(());
        }
        *self = Self::from_json_value(&value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_to_value_reports_syntax_errors() {
        let err = parse_to_value(b"{invalid").expect_err("should not parse");
        match err {
            PolicyParseError::MalformedInput(message) => {
                assert!(message.contains("line 1"), "message was: {}", message);
            }
            other => panic!("Expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_to_value_rejects_trailing_characters() {
        let err = parse_to_value(br#"{"a": 1} nope"#).expect_err("should not parse");
        assert!(matches!(err, PolicyParseError::MalformedInput(_)));
    }

    #[test]
    fn test_present_skips_null() {
        let value = json!({"a": null, "b": "x"});
        let object = value.as_object().expect("object");
        assert!(present(object, "a").is_none());
        assert!(present(object, "missing").is_none());
        assert_eq!(present(object, "b"), Some(&json!("x")));
    }

    #[test]
    fn test_reject_unknown_keys_reports_first_sorted_key() {
        let value = json!({"Zed": 1, "Beta": 2, "Alpha": 3});
        let object = value.as_object().expect("object");
        assert_eq!(
            reject_unknown_keys(object, &["Alpha"]),
            Err(PolicyParseError::UnknownKey("Beta".to_string()))
        );
        assert!(reject_unknown_keys(object, &["Alpha", "Beta", "Zed"]).is_ok());
    }

    #[test]
    fn test_optional_string_type_mismatch() {
        let value = json!({"Id": [1, 2]});
        let object = value.as_object().expect("object");
        assert_eq!(
            optional_string(object, "Id"),
            Err(PolicyParseError::InvalidFieldType {
                field: "Id",
                expected: "string",
                found: "array",
            })
        );
    }

    #[test]
    fn test_expect_object() {
        assert!(expect_object(&json!({})).is_ok());
        assert_eq!(
            expect_object(&json!(5)),
            Err(PolicyParseError::ExpectedObject { found: "number" })
        );
    }
}
