//! Parser front ends.
//!
//! Parse trees arrive as JSON text produced by an external parser
//! process. Two dialects exist in the wild and both are supported:
//!
//! - [`legacy`]: the dump of the old `compiler` package, discriminated
//!   by a `"class"` key on every node;
//! - [`modern`]: the dump of the `ast` module, discriminated by a
//!   `"_type"` key.
//!
//! [`parse_str`] sniffs the dialect from the root object and dispatches.
//! A malformed document or an unrecognized node kind is a
//! [`BuildError::Parse`]; nothing in here panics on bad input.

use serde_json::{Map, Value};

use crate::error::{BuildError, BuildResult};
use crate::parse::ParseNode;

pub mod legacy;
pub mod modern;

/// Parse a JSON tree dump in either dialect into a [`ParseNode`] module.
pub fn parse_str(text: &str) -> BuildResult<ParseNode> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| BuildError::parse(format!("invalid JSON tree dump: {err}")))?;
    let root = obj(&value, "tree root")?;
    if root.contains_key("_type") {
        modern::from_value(&value)
    } else if root.contains_key("class") {
        legacy::from_value(&value)
    } else {
        Err(BuildError::parse(
            "tree root carries neither a '_type' nor a 'class' discriminator",
        ))
    }
}

// ============================================================================
// Shared JSON Access Helpers
// ============================================================================

pub(crate) fn obj<'a>(value: &'a Value, what: &str) -> BuildResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| BuildError::parse(format!("{what}: expected a JSON object")))
}

pub(crate) fn field<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    what: &str,
) -> BuildResult<&'a Value> {
    map.get(key)
        .ok_or_else(|| BuildError::parse(format!("{what}: missing field '{key}'")))
}

pub(crate) fn str_field<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    what: &str,
) -> BuildResult<&'a str> {
    field(map, key, what)?
        .as_str()
        .ok_or_else(|| BuildError::parse(format!("{what}: field '{key}' is not a string")))
}

pub(crate) fn list_field<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    what: &str,
) -> BuildResult<&'a Vec<Value>> {
    field(map, key, what)?
        .as_array()
        .ok_or_else(|| BuildError::parse(format!("{what}: field '{key}' is not a list")))
}

/// A field that may be absent or JSON `null`.
pub(crate) fn opt_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

/// Line number field; absent or `null` means "unknown" and maps to 0.
pub(crate) fn lineno_field(map: &Map<String, Value>, key: &str) -> u32 {
    opt_field(map, key)
        .and_then(Value::as_u64)
        .map(|n| n as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::ParseKind;

    #[test]
    fn test_sniffs_modern_dialect() {
        let tree = parse_str(r#"{"_type": "Module", "body": []}"#).unwrap();
        assert!(matches!(tree.kind, ParseKind::Module { .. }));
    }

    #[test]
    fn test_sniffs_legacy_dialect() {
        let tree = parse_str(
            r#"{"class": "Module", "doc": null,
                "node": {"class": "Stmt", "nodes": []}}"#,
        )
        .unwrap();
        assert!(matches!(tree.kind, ParseKind::Module { .. }));
    }

    #[test]
    fn test_rejects_unknown_dialect() {
        let err = parse_str(r#"{"kind": "Module"}"#).unwrap_err();
        assert!(err.to_string().contains("discriminator"));
    }

    #[test]
    fn test_rejects_invalid_json() {
        let err = parse_str("not json").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }
}
