//! Endpoint id dictionary.
//!
//! Builds the `controller.endpoint[.extra]` identifiers for every endpoint
//! of a client map without building any binders. Useful for invalidating
//! another controller's keys from code that has no access to its tools.

use crate::cache_key::{EndpointIdentity, KeyMatcher, KeySuffix};
use crate::client::ClientMap;
use std::collections::BTreeMap;

/// Identifiers for every endpoint of one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointIds {
    controller_key: String,
    identities: BTreeMap<String, EndpointIdentity>,
}

impl EndpointIds {
    /// Build the dictionary for `client` under `controller_key`.
    pub fn new(controller_key: impl Into<String>, client: &ClientMap) -> Self {
        let controller_key = controller_key.into();
        let identities = client
            .keys()
            .map(|key| (key.to_string(), EndpointIdentity::new(controller_key.clone(), key)))
            .collect();
        Self {
            controller_key,
            identities,
        }
    }

    /// The controller key.
    #[must_use]
    pub fn controller_key(&self) -> &str {
        &self.controller_key
    }

    /// `controller.endpoint[.suffix...]`, or `None` for an unknown endpoint.
    pub fn endpoint_id(&self, endpoint_key: &str, suffix: impl Into<KeySuffix>) -> Option<String> {
        self.identities
            .get(endpoint_key)
            .map(|identity| identity.cache_key(&suffix.into()))
    }

    /// Prefix matcher for one endpoint, or `None` for an unknown endpoint.
    pub fn matcher(&self, endpoint_key: &str, suffix: impl Into<KeySuffix>) -> Option<KeyMatcher> {
        self.identities
            .get(endpoint_key)
            .map(|identity| identity.matcher(&suffix.into()))
    }

    /// Iterate identities in endpoint key order.
    pub fn iter(&self) -> impl Iterator<Item = &EndpointIdentity> {
        self.identities.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::remote_fn;
    use serde_json::Value;

    fn client() -> ClientMap {
        ClientMap::new()
            .with("getUser", remote_fn(|_, _| async { Ok(Value::Null) }))
            .with("listUsers", remote_fn(|_, _| async { Ok(Value::Null) }))
    }

    #[test]
    fn test_endpoint_ids() {
        let ids = EndpointIds::new("users", &client());
        assert_eq!(ids.controller_key(), "users");
        assert_eq!(ids.endpoint_id("getUser", None::<&str>).as_deref(), Some("users.getUser"));
        assert_eq!(ids.endpoint_id("getUser", "42").as_deref(), Some("users.getUser.42"));
        assert_eq!(ids.endpoint_id("missing", "42"), None);
        assert_eq!(
            ids.iter().map(EndpointIdentity::endpoint_id).collect::<Vec<_>>(),
            ["users.getUser", "users.listUsers"]
        );
    }

    #[test]
    fn test_endpoint_matcher() {
        let ids = EndpointIds::new("users", &client());
        let matcher = ids.matcher("getUser", ["10", "1"]);
        assert!(matcher.is_some_and(|m| m.matches_str("users.getUser.10.1")));
    }
}
