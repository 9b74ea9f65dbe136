//! Factory settings loaded from JSON or the environment.
//!
//! # Environment variables
//!
//! | variable                 | field            | format              |
//! |--------------------------|------------------|---------------------|
//! | `API_SWR_BASE_PATH`      | `base_path`      | string              |
//! | `API_SWR_ENABLE_MOCKING` | `enable_mocking` | `true`/`false`/`1`/`0` |
//! | `API_SWR_FETCH_CONFIG`   | `fetch_config`   | JSON object         |

use crate::config::{EngineConfig, FetchConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base path variable.
pub const BASE_PATH_VAR: &str = "API_SWR_BASE_PATH";
/// Mocking switch variable.
pub const ENABLE_MOCKING_VAR: &str = "API_SWR_ENABLE_MOCKING";
/// Global fetch config variable.
pub const FETCH_CONFIG_VAR: &str = "API_SWR_FETCH_CONFIG";

/// Errors that can occur while loading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Settings JSON could not be parsed.
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment variable holds an unusable value.
    #[error("Invalid value for {var}: {value}")]
    InvalidVar {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },
}

/// Controller factory settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Base path handed to client constructors.
    pub base_path: Option<String>,
    /// Route every dispatch to registered mocks. Unset leaves the
    /// factory's own setting alone.
    pub enable_mocking: Option<bool>,
    /// Global fetch config layer.
    pub fetch_config: Option<FetchConfig>,
    /// Global engine config for queries.
    pub swr_config: Option<EngineConfig>,
    /// Global engine config for infinite queries.
    pub swr_infinite_config: Option<EngineConfig>,
}

impl Settings {
    /// Parse settings from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] if `json` is not a valid settings
    /// document.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if a variable is set to an unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self {
            base_path: lookup(BASE_PATH_VAR).filter(|path| !path.is_empty()),
            ..Self::default()
        };

        if let Some(value) = lookup(ENABLE_MOCKING_VAR) {
            let flag = parse_flag(&value).ok_or_else(|| SettingsError::InvalidVar {
                var: ENABLE_MOCKING_VAR.to_string(),
                value: value.clone(),
            })?;
            settings.enable_mocking = Some(flag);
        }

        if let Some(value) = lookup(FETCH_CONFIG_VAR) {
            let config = serde_json::from_str::<FetchConfig>(&value).map_err(|_| {
                SettingsError::InvalidVar {
                    var: FETCH_CONFIG_VAR.to_string(),
                    value: value.clone(),
                }
            })?;
            settings.fetch_config = Some(config);
        }

        tracing::debug!(
            base_path = ?settings.base_path,
            enable_mocking = ?settings.enable_mocking,
            "loaded settings from environment"
        );
        Ok(settings)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_from_json() -> anyhow::Result<()> {
        let settings = Settings::from_json(
            r#"{ "basePath": "https://api.example.com", "enableMocking": true, "fetchConfig": { "timeout": 30 } }"#,
        )?;

        assert_eq!(settings.base_path.as_deref(), Some("https://api.example.com"));
        assert_eq!(settings.enable_mocking, Some(true));
        assert_eq!(
            settings.fetch_config.and_then(|c| c.get("timeout").cloned()),
            Some(json!(30))
        );
        assert_eq!(settings.swr_config, None);
        Ok(())
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(Settings::from_json("not json"), Err(SettingsError::Parse(_))));
    }

    #[test]
    fn test_from_lookup() -> anyhow::Result<()> {
        let vars: HashMap<&str, &str> = [
            (BASE_PATH_VAR, "/api"),
            (ENABLE_MOCKING_VAR, "1"),
            (FETCH_CONFIG_VAR, r#"{"withCredentials":true}"#),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_lookup(|var| vars.get(var).map(ToString::to_string))?;
        assert_eq!(settings.base_path.as_deref(), Some("/api"));
        assert_eq!(settings.enable_mocking, Some(true));
        assert_eq!(
            settings.fetch_config.and_then(|c| c.get("withCredentials").cloned()),
            Some(json!(true))
        );
        Ok(())
    }

    #[test]
    fn test_from_lookup_invalid_flag() {
        let result = Settings::from_lookup(|var| (var == ENABLE_MOCKING_VAR).then(|| "maybe".to_string()));
        assert!(matches!(
            result,
            Err(SettingsError::InvalidVar { ref var, ref value }) if var == ENABLE_MOCKING_VAR && value == "maybe"
        ));
    }

    #[test]
    fn test_empty_environment_gives_defaults() -> anyhow::Result<()> {
        let settings = Settings::from_lookup(|_| None)?;
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.enable_mocking, None);
        Ok(())
    }
}
