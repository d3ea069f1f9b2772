//! Package identity: id extraction and content hashing.
//!
//! A package's id is read from a designated field inside its body and its
//! hash is a SHA-256 digest over the body's canonical JSON form. Both are pure
//! functions of the body, so the two can never drift apart.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

// ─── Id field ────────────────────────────────────────────────────────────────

/// Location of the identifying field inside a package body, expressed as a
/// JSON pointer (RFC 6901).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdField(String);

impl IdField {
  pub fn new(pointer: impl Into<String>) -> Result<Self> {
    let pointer = pointer.into();
    if !pointer.starts_with('/') {
      return Err(Error::MalformedDescriptor(format!(
        "id field {pointer:?} is not a JSON pointer"
      )));
    }
    Ok(Self(pointer))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl Default for IdField {
  fn default() -> Self { Self("/id".to_owned()) }
}

impl fmt::Display for IdField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Read the package id from `body`.
///
/// Fails when the field is absent, is not a string, or is blank.
pub fn extract_id(body: &Value, field: &IdField) -> Result<String> {
  match body.pointer(field.as_str()) {
    Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.clone()),
    Some(Value::String(_)) => Err(Error::MalformedDescriptor(format!(
      "field {field} is blank"
    ))),
    Some(other) => Err(Error::MalformedDescriptor(format!(
      "field {field} must be a string, found {}",
      json_kind(other)
    ))),
    None => Err(Error::MalformedDescriptor(format!(
      "field {field} is required"
    ))),
  }
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

// ─── Content hash ────────────────────────────────────────────────────────────

/// Hex-encoded SHA-256 digest of a canonicalised package body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
  /// Wrap a digest previously produced by [`content_hash`], e.g. when reading
  /// it back from storage.
  pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ContentHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Serialise `value` canonically: object keys sorted, no whitespace.
pub fn canonical_json(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(&mut out, value);
  out
}

fn write_canonical(out: &mut String, value: &Value) {
  match value {
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(out, item);
      }
      out.push(']');
    }
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::from(key.as_str()).to_string());
        out.push(':');
        write_canonical(out, &map[key]);
      }
      out.push('}');
    }
    // Scalars already have a single serde_json rendering.
    scalar => out.push_str(&scalar.to_string()),
  }
}

/// Hash the canonical form of `body`.
pub fn content_hash(body: &Value) -> ContentHash {
  let digest = Sha256::digest(canonical_json(body).as_bytes());
  ContentHash(hex::encode(digest))
}

/// Derive `(id, hash)` for a package body.
pub fn identify(body: &Value, field: &IdField) -> Result<(String, ContentHash)> {
  let id = extract_id(body, field)?;
  Ok((id, content_hash(body)))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn key_order_and_whitespace_do_not_change_the_hash() {
    let a: Value =
      serde_json::from_str(r#"{"id":"p","things":[{"url":"u","name":"n"}]}"#)
        .unwrap();
    let b: Value = serde_json::from_str(
      r#"{ "things": [ { "name": "n", "url": "u" } ],
           "id": "p" }"#,
    )
    .unwrap();

    assert_eq!(content_hash(&a), content_hash(&b));
  }

  #[test]
  fn any_value_change_changes_the_hash() {
    let a = json!({ "id": "p", "things": [{ "url": "u", "name": "n" }] });
    let b = json!({ "id": "p", "things": [{ "url": "u", "name": "N" }] });
    let c = json!({ "id": "p", "things": [] });

    assert_ne!(content_hash(&a), content_hash(&b));
    assert_ne!(content_hash(&a), content_hash(&c));
  }

  #[test]
  fn array_order_is_significant() {
    let a = json!({ "id": "p", "tags": ["a", "b"] });
    let b = json!({ "id": "p", "tags": ["b", "a"] });
    assert_ne!(content_hash(&a), content_hash(&b));
  }

  #[test]
  fn canonical_form_sorts_nested_keys() {
    let v = json!({ "b": { "y": 1, "x": [true, null] }, "a": "s\"q" });
    assert_eq!(canonical_json(&v), r#"{"a":"s\"q","b":{"x":[true,null],"y":1}}"#);
  }

  #[test]
  fn hash_is_hex_sha256() {
    let hash = content_hash(&json!({ "id": "p" }));
    assert_eq!(hash.as_str().len(), 64);
    assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn extract_id_from_default_field() {
    let body = json!({ "id": "pkg1" });
    assert_eq!(extract_id(&body, &IdField::default()).unwrap(), "pkg1");
  }

  #[test]
  fn extract_id_from_nested_pointer() {
    let field = IdField::new("/meta/name").unwrap();
    let body = json!({ "meta": { "name": "awesome-rust" } });
    assert_eq!(extract_id(&body, &field).unwrap(), "awesome-rust");
  }

  #[test]
  fn missing_or_non_string_id_is_malformed() {
    let field = IdField::default();
    for body in [json!({}), json!({ "id": 7 }), json!({ "id": "  " })] {
      assert!(matches!(
        extract_id(&body, &field),
        Err(Error::MalformedDescriptor(_))
      ));
    }
  }

  #[test]
  fn id_field_must_be_a_pointer() {
    assert!(IdField::new("id").is_err());
    assert!(IdField::new("/id").is_ok());
  }
}
