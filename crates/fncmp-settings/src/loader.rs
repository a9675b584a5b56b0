//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FncmpSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `FNCMP_*` environment overrides
//! 4. Validate cross-field constraints
//!
//! Merge rules: objects merge per key, arrays and primitives are replaced,
//! `null` in the file leaves the default in place.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::FncmpSettings;

/// Default settings file location (`~/.fncmp/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".fncmp").join("settings.json")
}

/// Load from the default path with env overrides.
pub fn load_settings() -> Result<FncmpSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with env overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<FncmpSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<FncmpSettings> {
    let defaults = serde_json::to_value(FncmpSettings::default())?;
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

/// Recursive deep merge of `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `FNCMP_*` overrides. Unparseable values are logged and ignored.
pub fn apply_env_overrides(settings: &mut FncmpSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Override application against an arbitrary variable source.
fn apply_overrides(settings: &mut FncmpSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.string("FNCMP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("FNCMP_PORT", 0, 65_535) {
        settings.server.port = v as u16;
    }
    if let Some(v) = env.u64_in("FNCMP_HANDLER_QUEUE", 1, 1_000_000) {
        settings.server.handler_queue_capacity = v as usize;
    }
    if let Some(v) = env.u64_in("FNCMP_CONNECTION_QUEUE", 1, 1_000_000) {
        settings.server.connection_queue_capacity = v as usize;
    }
    if let Some(v) = env.u64_in("FNCMP_HEARTBEAT_INTERVAL_MS", 100, 3_600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64_in("FNCMP_HEARTBEAT_TIMEOUT_MS", 100, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(v) = env.u64_in("FNCMP_CALLBACK_TIMEOUT_MS", 1, 3_600_000) {
        settings.server.callback_timeout_ms = v;
    }
    if let Some(v) = env.bool("FNCMP_PUBLISH_ERRORS") {
        settings.server.publish_errors = v;
    }
    if let Some(v) = env.bool("FNCMP_DROP_CACHE_ON_DISCONNECT") {
        settings.server.drop_cache_on_disconnect = v;
    }

    if let Some(v) = env.u64_in("FNCMP_CACHE_TTL_MS", 1, 86_400_000) {
        settings.cache.default_ttl_ms = v;
    }
    if let Some(v) = env.u64_in("FNCMP_CACHE_MAX_TTL_MS", 1, 86_400_000) {
        settings.cache.max_ttl_ms = v;
    }
    if let Some(v) = env.u64_in("FNCMP_CACHE_HISTORY", 0, 10_000) {
        settings.cache.history_limit = v as usize;
    }

    if let Some(v) = env.string("FNCMP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("FNCMP_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off` (case-insensitive).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` within `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let parsed = parse_bool(&val);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        parsed
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let parsed = parse_u64_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, min, max, "out-of-range env var, ignoring");
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn with_vars(pairs: &[(&str, &str)]) -> FncmpSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        let mut s = FncmpSettings::default();
        apply_overrides(&mut s, |name| vars.get(name).cloned());
        s
    }

    #[test]
    fn merge_nested_override_keeps_siblings() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replaces() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let s = read_layered(Path::new("/nonexistent/fncmp/settings.json")).unwrap();
        assert_eq!(s, FncmpSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9191}, "cache": {"defaultTtlMs": 1000}}"#,
        )
        .unwrap();

        let s = read_layered(&path).unwrap();
        assert_eq!(s.server.port, 9191);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.cache.default_ttl_ms, 1000);
        assert_eq!(s.cache.max_ttl_ms, 300_000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(read_layered(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn inconsistent_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"cache": {"defaultTtlMs": 600000}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let s = with_vars(&[
            ("FNCMP_PORT", "3000"),
            ("FNCMP_CACHE_TTL_MS", "1500"),
            ("FNCMP_LOG_JSON", "yes"),
            ("FNCMP_PUBLISH_ERRORS", "off"),
        ]);
        assert_eq!(s.server.port, 3000);
        assert_eq!(s.cache.default_ttl_ms, 1500);
        assert!(s.logging.json);
        assert!(!s.server.publish_errors);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let s = with_vars(&[
            ("FNCMP_PORT", "99999"),
            ("FNCMP_HANDLER_QUEUE", "0"),
            ("FNCMP_LOG_JSON", "maybe"),
            ("FNCMP_HOST", ""),
        ]);
        assert_eq!(s, FncmpSettings::default());
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
        assert_eq!(parse_u64_range(" 42 ", 1, 100), Some(42));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u64_range("-3", 0, 100), None);
    }
}
