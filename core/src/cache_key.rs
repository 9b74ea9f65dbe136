//! Cache-key codec.
//!
//! Every endpoint invocation is identified by a dotted key of the form
//! `controller.endpoint[.segment...]`. The first two segments form the
//! *endpoint id*; further segments are derived from call parameters through a
//! [`CacheKeySpec`].
//!
//! Two rules drive the rest of the crate:
//!
//! - Resolution is deterministic: the same endpoint id, spec and parameters
//!   always produce the same key.
//! - A resolved key of `None` means "not ready". Query binders hand no key to
//!   the cache engine, which then never calls the fetcher.
//!
//! Keys are matched for invalidation by prefix through [`KeyMatcher`], so
//! `users.getUser` matches `users.getUser.42` and `users.getUser.42.profile`.
//!
//! # Example
//!
//! ```rust,ignore
//! use api_swr_core::cache_key::{resolve, CacheKeySpec};
//!
//! let params = serde_json::json!({ "id": 42 });
//! let key = resolve("users.getUser", Some(&CacheKeySpec::param("id")), params.as_object());
//! assert_eq!(key.as_deref(), Some("users.getUser.42"));
//! ```

use crate::Params;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Separator between key segments.
pub const SEPARATOR: char = '.';

/// Join key parts with [`SEPARATOR`], skipping empty parts.
///
/// `concat(["user", "123", "", "profile"])` is `"user.123.profile"`; no parts
/// yield an empty string.
pub fn concat<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        let part = part.as_ref();
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(part);
    }
    out
}

/// Like [`concat`], but accepts optional parts and drops the absent ones.
pub fn concat_opt<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    concat(parts.into_iter().flatten())
}

/// Stringify a parameter value for use as a key segment.
///
/// Strings are used verbatim, `null` and missing values become empty, numbers
/// and booleans use their display form, arrays and objects their compact JSON.
#[must_use]
pub fn param_segment(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Custom key derivation from call parameters.
pub type DeriveKeyFn = Arc<dyn Fn(Option<&Params>) -> Option<String> + Send + Sync>;

/// How a call site derives the variable part of its cache key.
///
/// When no spec is given, the key is the bare endpoint id.
#[derive(Clone)]
pub enum CacheKeySpec {
    /// Use the value of one parameter. An empty value suspends the query.
    Param(String),
    /// Use the values of several parameters, in order. Empty values are
    /// dropped; this form never suspends.
    Params(Vec<String>),
    /// Derive the segment from the parameters. `None` or `""` suspends.
    Derive(DeriveKeyFn),
}

impl CacheKeySpec {
    /// Single-parameter spec.
    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    /// Multi-parameter spec.
    pub fn params<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Params(names.into_iter().map(Into::into).collect())
    }

    /// Function spec.
    pub fn derive<F>(f: F) -> Self
    where
        F: Fn(Option<&Params>) -> Option<String> + Send + Sync + 'static,
    {
        Self::Derive(Arc::new(f))
    }

    /// Stable textual identity of the spec, used for content memoization.
    ///
    /// Derive specs are identified by the address of their closure.
    #[must_use]
    pub fn content_id(&self) -> String {
        match self {
            Self::Param(name) => format!("param:{name}"),
            Self::Params(names) => format!("params:{}", names.join(",")),
            Self::Derive(f) => format!("derive:{:p}", Arc::as_ptr(f).cast::<()>()),
        }
    }
}

impl fmt::Debug for CacheKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(name) => f.debug_tuple("Param").field(name).finish(),
            Self::Params(names) => f.debug_tuple("Params").field(names).finish(),
            Self::Derive(_) => f.debug_tuple("Derive").field(&"<fn>").finish(),
        }
    }
}

impl From<&str> for CacheKeySpec {
    fn from(name: &str) -> Self {
        Self::param(name)
    }
}

impl From<String> for CacheKeySpec {
    fn from(name: String) -> Self {
        Self::Param(name)
    }
}

impl From<Vec<&str>> for CacheKeySpec {
    fn from(names: Vec<&str>) -> Self {
        Self::params(names)
    }
}

impl<const N: usize> From<[&str; N]> for CacheKeySpec {
    fn from(names: [&str; N]) -> Self {
        Self::params(names)
    }
}

/// Resolve the cache key for one invocation.
///
/// Returns `None` when the key is not ready: a single-parameter spec whose
/// value is empty, or a derive spec that yields nothing.
#[must_use]
pub fn resolve(
    endpoint_id: &str,
    spec: Option<&CacheKeySpec>,
    params: Option<&Params>,
) -> Option<String> {
    let key = match spec {
        None => Some(endpoint_id.to_string()),
        Some(CacheKeySpec::Param(name)) => {
            let segment = param_segment(params.and_then(|p| p.get(name)));
            (!segment.is_empty()).then(|| concat([endpoint_id, segment.as_str()]))
        }
        Some(CacheKeySpec::Params(names)) => {
            let segments = names
                .iter()
                .map(|name| param_segment(params.and_then(|p| p.get(name))));
            Some(concat(std::iter::once(endpoint_id.to_string()).chain(segments)))
        }
        Some(CacheKeySpec::Derive(derive)) => derive(params)
            .filter(|segment| !segment.is_empty())
            .map(|segment| concat([endpoint_id, segment.as_str()])),
    };

    tracing::trace!(endpoint_id, ?key, "resolved cache key");
    key
}

/// Extra key segments appended to an endpoint id.
///
/// Built from a single string or a list; empty entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySuffix(Vec<String>);

impl KeySuffix {
    /// An empty suffix.
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    /// The non-empty segments of the suffix.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Whether the suffix contributes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            parts
                .into_iter()
                .map(Into::into)
                .filter(|part: &String| !part.is_empty())
                .collect(),
        )
    }
}

impl From<&str> for KeySuffix {
    fn from(part: &str) -> Self {
        Self::from_parts([part])
    }
}

impl From<String> for KeySuffix {
    fn from(part: String) -> Self {
        Self::from_parts([part])
    }
}

impl From<Vec<String>> for KeySuffix {
    fn from(parts: Vec<String>) -> Self {
        Self::from_parts(parts)
    }
}

impl From<Vec<&str>> for KeySuffix {
    fn from(parts: Vec<&str>) -> Self {
        Self::from_parts(parts)
    }
}

impl From<&[&str]> for KeySuffix {
    fn from(parts: &[&str]) -> Self {
        Self::from_parts(parts.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for KeySuffix {
    fn from(parts: [&str; N]) -> Self {
        Self::from_parts(parts)
    }
}

impl<T: Into<Self>> From<Option<T>> for KeySuffix {
    fn from(part: Option<T>) -> Self {
        part.map_or_else(Self::none, Into::into)
    }
}

/// Build `endpoint_id[.suffix...]`.
#[must_use]
pub fn endpoint_key(endpoint_id: &str, suffix: &KeySuffix) -> String {
    concat(std::iter::once(endpoint_id).chain(suffix.parts().iter().map(String::as_str)))
}

/// Key stored in the cache engine.
///
/// Query keys are plain text; infinite-query pages are keyed by the pair
/// `[key, params]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    /// A resolved dotted key.
    Text(String),
    /// A composite page key.
    Composite(Vec<Value>),
}

impl CacheKey {
    /// The dotted key, if this is a text key.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(key) => Some(key),
            Self::Composite(_) => None,
        }
    }

    /// String form used by stores to index entries.
    ///
    /// Composite keys serialize to `@` followed by their JSON array.
    #[must_use]
    pub fn serialized(&self) -> String {
        match self {
            Self::Text(key) => key.clone(),
            Self::Composite(parts) => format!("@{}", Value::Array(parts.clone())),
        }
    }

    /// Whether the serialized form contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            Self::Text(key) => key.contains(needle),
            Self::Composite(_) => self.serialized().contains(needle),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(key) => f.write_str(key),
            Self::Composite(_) => f.write_str(&self.serialized()),
        }
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::Text(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self::Text(key)
    }
}

/// Prefix predicate over cache keys.
///
/// Matches text keys equal to the prefix or extending it by whole segments:
/// `users.getUser` matches `users.getUser.42` but not `users.getUserList`.
/// Composite keys never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatcher {
    prefix: String,
}

impl KeyMatcher {
    /// Matcher for keys starting with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The matched prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Test a cache key.
    #[must_use]
    pub fn matches(&self, key: &CacheKey) -> bool {
        key.as_text().is_some_and(|text| self.matches_str(text))
    }

    /// Test a dotted key string.
    #[must_use]
    pub fn matches_str(&self, key: &str) -> bool {
        if self.prefix.is_empty() {
            return true;
        }
        key.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(SEPARATOR))
    }
}

/// Build a matcher for every key under `endpoint_id[.suffix...]`.
#[must_use]
pub fn matcher(endpoint_id: &str, suffix: &KeySuffix) -> KeyMatcher {
    KeyMatcher::new(endpoint_key(endpoint_id, suffix))
}

/// Identity of one endpoint inside a controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointIdentity {
    controller_key: String,
    endpoint_key: String,
    endpoint_id: String,
}

impl EndpointIdentity {
    /// Create an identity. The endpoint id is computed once.
    pub fn new(controller_key: impl Into<String>, endpoint_key: impl Into<String>) -> Self {
        let controller_key = controller_key.into();
        let endpoint_key = endpoint_key.into();
        let endpoint_id = concat([controller_key.as_str(), endpoint_key.as_str()]);
        Self {
            controller_key,
            endpoint_key,
            endpoint_id,
        }
    }

    /// The owning controller's key.
    #[must_use]
    pub fn controller_key(&self) -> &str {
        &self.controller_key
    }

    /// The endpoint's key in its client map.
    #[must_use]
    pub fn endpoint_key(&self) -> &str {
        &self.endpoint_key
    }

    /// `controller.endpoint`.
    #[must_use]
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    /// `controller.endpoint[.suffix...]`.
    #[must_use]
    pub fn cache_key(&self, suffix: &KeySuffix) -> String {
        endpoint_key(&self.endpoint_id, suffix)
    }

    /// Prefix matcher for `controller.endpoint[.suffix...]`.
    #[must_use]
    pub fn matcher(&self, suffix: &KeySuffix) -> KeyMatcher {
        matcher(&self.endpoint_id, suffix)
    }
}

impl fmt::Display for EndpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    #[test]
    fn test_concat_skips_empty_parts() {
        assert_eq!(concat(["user", "123", "", "profile"]), "user.123.profile");
        assert_eq!(concat_opt([Some("user"), Some("123"), None, Some("profile")]), "user.123.profile");
        assert_eq!(concat(Vec::<&str>::new()), "");
        assert_eq!(concat(["", ""]), "");
    }

    #[test]
    fn test_resolve_without_spec_is_endpoint_id() {
        assert_eq!(resolve("users.list", None, None).as_deref(), Some("users.list"));
    }

    #[test]
    fn test_resolve_single_param() {
        let p = params(json!({ "id": "123" }));
        let key = resolve("users.getUser", Some(&CacheKeySpec::param("id")), Some(&p));
        assert_eq!(key.as_deref(), Some("users.getUser.123"));

        let p = params(json!({ "id": 42 }));
        let key = resolve("users.getUser", Some(&"id".into()), Some(&p));
        assert_eq!(key.as_deref(), Some("users.getUser.42"));
    }

    #[test]
    fn test_resolve_single_param_empty_suspends() {
        let spec = CacheKeySpec::param("id");
        assert_eq!(resolve("users.getUser", Some(&spec), None), None);
        assert_eq!(resolve("users.getUser", Some(&spec), Some(&params(json!({ "id": "" })))), None);
        assert_eq!(resolve("users.getUser", Some(&spec), Some(&params(json!({ "id": null })))), None);
    }

    #[test]
    fn test_resolve_param_list_drops_empty_values() {
        let spec = CacheKeySpec::params(["a", "b"]);
        let p = params(json!({ "a": "x", "b": "" }));
        assert_eq!(resolve("ctrl.ep", Some(&spec), Some(&p)).as_deref(), Some("ctrl.ep.x"));

        let p = params(json!({ "a": "x", "b": false }));
        assert_eq!(resolve("ctrl.ep", Some(&spec), Some(&p)).as_deref(), Some("ctrl.ep.x.false"));

        assert_eq!(resolve("ctrl.ep", Some(&spec), None).as_deref(), Some("ctrl.ep"));
    }

    #[test]
    fn test_resolve_derive() {
        let spec = CacheKeySpec::derive(|p| {
            p.and_then(|p| p.get("slug"))
                .and_then(Value::as_str)
                .map(|slug| format!("by-slug.{slug}"))
        });

        let p = params(json!({ "slug": "intro" }));
        assert_eq!(resolve("posts.get", Some(&spec), Some(&p)).as_deref(), Some("posts.get.by-slug.intro"));
        assert_eq!(resolve("posts.get", Some(&spec), None), None);

        let empty = CacheKeySpec::derive(|_| Some(String::new()));
        assert_eq!(resolve("posts.get", Some(&empty), None), None);
    }

    #[test]
    fn test_param_segment_forms() {
        assert_eq!(param_segment(Some(&json!("abc"))), "abc");
        assert_eq!(param_segment(Some(&json!(1.5))), "1.5");
        assert_eq!(param_segment(Some(&json!(true))), "true");
        assert_eq!(param_segment(Some(&json!([1, 2]))), "[1,2]");
        assert_eq!(param_segment(Some(&json!({ "a": 1 }))), "{\"a\":1}");
        assert_eq!(param_segment(None), "");
    }

    #[test]
    fn test_matcher_prefix_semantics() {
        let m = matcher("users.getUser", &KeySuffix::none());
        assert!(m.matches(&CacheKey::from("users.getUser")));
        assert!(m.matches(&CacheKey::from("users.getUser.42")));
        assert!(m.matches(&CacheKey::from("users.getUser.42.profile")));
        assert!(!m.matches(&CacheKey::from("users.getUsers")));
        assert!(!m.matches(&CacheKey::from("users.getUserList.1")));
        assert!(!m.matches(&CacheKey::from("users.list")));
        assert!(!m.matches(&CacheKey::Composite(vec![json!("users.getUser.42"), Value::Null])));
    }

    #[test]
    fn test_matcher_with_suffix() {
        let m = matcher("users.getUser", &KeySuffix::from(["10", "", "1"]));
        assert_eq!(m.prefix(), "users.getUser.10.1");
        assert!(m.matches(&CacheKey::from("users.getUser.10.1")));
        assert!(m.matches(&CacheKey::from("users.getUser.10.1.extra")));
        assert!(!m.matches(&CacheKey::from("users.getUser.10")));
        assert!(!m.matches(&CacheKey::from("users.getUser.10.10")));

        let single = matcher("users.getUser", &KeySuffix::from("10"));
        assert_eq!(single.prefix(), "users.getUser.10");
    }

    #[test]
    fn test_key_suffix_normalization() {
        assert_eq!(KeySuffix::from(""), KeySuffix::none());
        assert_eq!(KeySuffix::from(vec!["a", "", "b"]).parts(), ["a", "b"]);
        assert_eq!(KeySuffix::from(None::<&str>), KeySuffix::none());
        assert_eq!(KeySuffix::from(Some("x")).parts(), ["x"]);
    }

    #[test]
    fn test_endpoint_identity() {
        let identity = EndpointIdentity::new("users", "getUser");
        assert_eq!(identity.endpoint_id(), "users.getUser");
        assert_eq!(identity.cache_key(&KeySuffix::from("42")), "users.getUser.42");
        assert_eq!(identity.cache_key(&KeySuffix::none()), "users.getUser");
        assert_eq!(identity.to_string(), "users.getUser");
    }

    #[test]
    fn test_composite_key_serialization() {
        let key = CacheKey::Composite(vec![json!("posts.list"), json!({ "page": 2 })]);
        assert_eq!(key.serialized(), "@[\"posts.list\",{\"page\":2}]");
        assert!(key.contains("posts.list"));
        assert_eq!(key.as_text(), None);
    }

    proptest! {
        #[test]
        fn prop_resolve_is_deterministic(
            id in "[a-z]{1,8}",
            value in "[a-z0-9]{0,8}",
            other in proptest::option::of("[a-z0-9]{0,8}"),
        ) {
            let mut p = Params::new();
            p.insert("id".to_string(), Value::String(value.clone()));
            if let Some(other) = &other {
                p.insert("other".to_string(), Value::String(other.clone()));
            }
            let endpoint_id = format!("ctrl.{id}");

            for spec in [CacheKeySpec::param("id"), CacheKeySpec::params(["id", "other"])] {
                let first = resolve(&endpoint_id, Some(&spec), Some(&p));
                let second = resolve(&endpoint_id, Some(&spec), Some(&p.clone()));
                prop_assert_eq!(&first, &second);
                if let Some(key) = first {
                    prop_assert!(key.starts_with(&endpoint_id));
                    prop_assert!(matcher(&endpoint_id, &KeySuffix::none()).matches_str(&key));
                }
            }

            let single = resolve(&endpoint_id, Some(&CacheKeySpec::param("id")), Some(&p));
            prop_assert_eq!(single.is_none(), value.is_empty());
        }
    }
}
