//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SocksSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `SOCKS_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::SocksSettings;

/// Resolve the settings file path: `$SOCKS_SETTINGS`, else `./socks.json`.
pub fn settings_path() -> PathBuf {
    std::env::var("SOCKS_SETTINGS")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from("socks.json"), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SocksSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SocksSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<SocksSettings> {
    let defaults = serde_json::to_value(SocksSettings::default())?;

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

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut SocksSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Integers must parse and fall within range; invalid values are logged
/// and ignored so the file/default value stays in effect.
pub fn apply_overrides<F>(settings: &mut SocksSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SOCKS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16_in("SOCKS_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u64_in("SOCKS_IDLE_TIMEOUT_SECS", 1, 86_400) {
        settings.server.idle_timeout_secs = v;
    }
    if let Some(v) = env.usize_in("SOCKS_MAX_MESSAGE_SIZE", 1, usize::MAX) {
        settings.server.max_message_size = Some(v);
    }
    if let Some(v) = env.usize_in("SOCKS_SEND_QUEUE", 1, 1_000_000) {
        settings.server.send_queue = v;
    }

    // ── TLS ─────────────────────────────────────────────────────────
    if let Some(v) = env.string("SOCKS_CERT_PATH") {
        settings.tls.cert_path = v;
    }
    if let Some(v) = env.string("SOCKS_KEY_PATH") {
        settings.tls.key_path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SOCKS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("SOCKS_LOG_FILE") {
        settings.logging.file = v;
    }
    if let Some(v) = env.bool("SOCKS_LOG_TO_FILE") {
        settings.logging.log_to_file = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16_in(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize_in(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "server": {"port": 9093, "host": "0.0.0.0"}
        });
        let source = serde_json::json!({
            "server": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── read_settings_file ──────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.port, 9093);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socks.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":7000,"idleTimeoutSecs":60},"logging":{"logToFile":false}}"#,
        )
        .unwrap();
        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.idle_timeout_secs, 60);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(!settings.logging.log_to_file);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socks.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = read_settings_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    // ── apply_overrides ─────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = SocksSettings::default();
        apply_overrides(
            &mut settings,
            lookup_from(&[
                ("SOCKS_HOST", "127.0.0.1"),
                ("SOCKS_PORT", "8443"),
                ("SOCKS_IDLE_TIMEOUT_SECS", "30"),
                ("SOCKS_MAX_MESSAGE_SIZE", "65536"),
                ("SOCKS_CERT_PATH", "/etc/socks/cert.pem"),
                ("SOCKS_LOG_LEVEL", "debug"),
                ("SOCKS_LOG_TO_FILE", "off"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8443);
        assert_eq!(settings.server.idle_timeout_secs, 30);
        assert_eq!(settings.server.max_message_size, Some(65536));
        assert_eq!(settings.tls.cert_path, "/etc/socks/cert.pem");
        assert_eq!(settings.tls.key_path, "key.pem");
        assert_eq!(settings.logging.level, "debug");
        assert!(!settings.logging.log_to_file);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = SocksSettings::default();
        apply_overrides(
            &mut settings,
            lookup_from(&[
                ("SOCKS_PORT", "0"),
                ("SOCKS_IDLE_TIMEOUT_SECS", "soon"),
                ("SOCKS_LOG_TO_FILE", "maybe"),
                ("SOCKS_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 9093);
        assert_eq!(settings.server.idle_timeout_secs, 300);
        assert!(settings.logging.log_to_file);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("5", 10, 20), None);
        assert_eq!(parse_usize_range("-1", 0, 10), None);
    }
}
