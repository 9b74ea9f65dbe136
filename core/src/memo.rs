//! Content-based memoization.
//!
//! Binders are re-invoked with freshly built configuration on every render.
//! [`Fingerprint`] hashes the *content* of that configuration so that a new
//! but equal value is not treated as a change. Object keys are visited in
//! sorted order and top-level arrays are sorted, so key order and element
//! order of top-level lists do not affect the fingerprint.

use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Incremental content hasher.
#[derive(Debug, Default, Clone)]
pub struct Fingerprint(DefaultHasher);

impl Fingerprint {
    /// Start a fingerprint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an optional JSON value.
    #[must_use]
    pub fn value(mut self, value: Option<&Value>) -> Self {
        match value {
            None => 0u8.hash(&mut self.0),
            Some(value) => {
                1u8.hash(&mut self.0);
                canonical(value, true).hash(&mut self.0);
            }
        }
        self
    }

    /// Add an optional JSON object.
    #[must_use]
    pub fn map(mut self, map: Option<&Map<String, Value>>) -> Self {
        match map {
            None => 0u8.hash(&mut self.0),
            Some(map) => {
                1u8.hash(&mut self.0);
                canonical_object(map).hash(&mut self.0);
            }
        }
        self
    }

    /// Add any hashable field.
    #[must_use]
    pub fn field<H: Hash + ?Sized>(mut self, field: &H) -> Self {
        field.hash(&mut self.0);
        self
    }

    /// Add the identity (address) of a shared handle, such as a closure.
    #[must_use]
    pub fn pointer<T: ?Sized>(mut self, handle: Option<&Arc<T>>) -> Self {
        handle.map(|h| Arc::as_ptr(h).cast::<()>()).hash(&mut self.0);
        self
    }

    /// Finish.
    #[must_use]
    pub fn finish(&self) -> u64 {
        self.0.finish()
    }
}

/// Fingerprint a single value.
#[must_use]
pub fn fingerprint(value: &Value) -> u64 {
    Fingerprint::new().value(Some(value)).finish()
}

fn canonical(value: &Value, top_level: bool) -> String {
    match value {
        Value::Object(map) => canonical_object(map),
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().map(|item| canonical(item, false)).collect();
            if top_level {
                parts.sort();
            }
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

fn canonical_object(map: &Map<String, Value>) -> String {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let parts: Vec<String> = entries
        .into_iter()
        .map(|(key, value)| format!("{}:{}", Value::String(key.clone()), canonical(value, false)))
        .collect();
    format!("{{{}}}", parts.join(","))
}

/// Remembers the last fingerprint seen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ContentMemo {
    last: Option<u64>,
}

impl ContentMemo {
    /// A memo that has seen nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Record `fingerprint`; returns whether it differs from the last one.
    pub fn update(&mut self, fingerprint: u64) -> bool {
        let changed = self.last != Some(fingerprint);
        self.last = Some(fingerprint);
        changed
    }

    /// The last recorded fingerprint.
    #[must_use]
    pub const fn last(&self) -> Option<u64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({ "b": 1, "a": { "y": 2, "x": 1 } });
        let b = json!({ "a": { "x": 1, "y": 2 }, "b": 1 });
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_top_level_arrays_are_sorted() {
        assert_eq!(fingerprint(&json!(["b", "a"])), fingerprint(&json!(["a", "b"])));
        assert_ne!(
            fingerprint(&json!({ "list": ["b", "a"] })),
            fingerprint(&json!({ "list": ["a", "b"] }))
        );
    }

    #[test]
    fn test_content_changes_are_detected() {
        assert_ne!(fingerprint(&json!({ "id": 1 })), fingerprint(&json!({ "id": 2 })));
        assert_ne!(
            Fingerprint::new().value(None).finish(),
            Fingerprint::new().value(Some(&Value::Null)).finish()
        );
    }

    #[test]
    fn test_content_memo() {
        let mut memo = ContentMemo::new();
        assert!(memo.update(1));
        assert!(!memo.update(1));
        assert!(memo.update(2));
        assert_eq!(memo.last(), Some(2));
    }
}
