//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CourierSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `COURIER_*` environment overrides (highest priority)

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CourierSettings;

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON for these settings.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load settings from `path` (defaults if it does not exist) with env overrides.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings, SettingsError> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Load defaults merged with `path`, without consulting the environment.
pub fn load_file(path: &Path) -> Result<CourierSettings, SettingsError> {
    let defaults = serde_json::to_value(CourierSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `COURIER_*` environment variables to loaded settings.
pub fn apply_env_overrides(settings: &mut CourierSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Empty or invalid values are ignored.
pub fn apply_overrides_from(
    settings: &mut CourierSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("COURIER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("COURIER_PORT").and_then(|v| parsed::<u16>("COURIER_PORT", &v)) {
        settings.server.port = v;
    }
    if let Some(v) = read("COURIER_WS_PATH") {
        settings.server.ws_path = v;
    }
    if let Some(v) = read("COURIER_HEARTBEAT_INTERVAL")
        .and_then(|v| parsed::<u64>("COURIER_HEARTBEAT_INTERVAL", &v))
        .filter(|v| *v >= 1)
    {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) =
        read("COURIER_SHUTDOWN_TIMEOUT").and_then(|v| parsed::<u64>("COURIER_SHUTDOWN_TIMEOUT", &v))
    {
        settings.server.shutdown_timeout_secs = v;
    }
    if let Some(v) = read("COURIER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("COURIER_LOG_JSON").and_then(|v| {
        let result = parse_bool(&v);
        if result.is_none() {
            warn!(key = "COURIER_LOG_JSON", value = %v, "invalid boolean env var, ignoring");
        }
        result
    }) {
        settings.logging.json = v;
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parsed<T: std::str::FromStr>(name: &str, val: &str) -> Option<T> {
    let result = val.parse().ok();
    if result.is_none() {
        warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn merge_nested_override() {
        let merged = deep_merge(
            json!({"server": {"port": 8080, "host": "localhost"}}),
            json!({"server": {"port": 9090}}),
        );
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_skips_nulls_and_replaces_arrays() {
        let merged = deep_merge(
            json!({"a": 1, "list": [1, 2, 3]}),
            json!({"a": null, "list": [9]}),
        );
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["list"], json!([9]));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, CourierSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 4242, "announce_server_time": false}, "logging": {"modules": {"courier_server": "debug"}}}"#,
        )
        .unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.server.port, 4242);
        assert!(!settings.server.announce_server_time);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.logging.level, "info");
        assert_eq!(
            settings.logging.modules.get("courier_server").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_file(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = CourierSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("COURIER_HOST", "0.0.0.0"),
                ("COURIER_PORT", "8080"),
                ("COURIER_WS_PATH", "/ws"),
                ("COURIER_HEARTBEAT_INTERVAL", "5"),
                ("COURIER_SHUTDOWN_TIMEOUT", "2"),
                ("COURIER_LOG_LEVEL", "debug"),
                ("COURIER_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.server.heartbeat_interval_secs, 5);
        assert_eq!(settings.server.shutdown_timeout_secs, 2);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = CourierSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("COURIER_HOST", ""),
                ("COURIER_PORT", "99999"),
                ("COURIER_HEARTBEAT_INTERVAL", "0"),
                ("COURIER_LOG_JSON", "maybe"),
            ]),
        );
        assert_eq!(settings, CourierSettings::default());
    }

    #[test]
    fn parse_bool_variants() {
        for yes in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(yes), Some(true));
        }
        for no in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(no), Some(false));
        }
        assert_eq!(parse_bool(""), None);
    }
}
