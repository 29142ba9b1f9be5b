//! Layered settings: compiled defaults, then the JSON file merged on top,
//! then `VANET_*` environment variables, then validation.
//!
//! File values merge key by key into objects. Arrays and scalars replace
//! what was there, and an explicit `null` leaves the default in place.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{AdvisorSettings, BackendKind};

/// `~/.vanet/settings.json`, or under the temp dir when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".vanet")
        .join("settings.json")
}

pub fn load_settings() -> Result<AdvisorSettings> {
    load_settings_from_path(&settings_path())
}

/// A missing file yields defaults. Unreadable or malformed JSON, and
/// values that fail validation, are errors.
pub fn load_settings_from_path(path: &Path) -> Result<AdvisorSettings> {
    let mut settings = merged_with_file(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn merged_with_file(path: &Path) -> Result<AdvisorSettings> {
    let mut value = serde_json::to_value(AdvisorSettings::default())?;
    match std::fs::read_to_string(path) {
        Ok(text) => {
            debug!(path = %path.display(), "merging settings file");
            merge_into(&mut value, serde_json::from_str(&text)?);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(serde_json::from_value(value)?)
}

/// `overlay` merged over `base`, returned by value.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if let Some(slot) = base.get_mut(&key) {
                    merge_into(slot, value);
                } else if !value.is_null() {
                    base.insert(key, value);
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `VANET_*` overrides read through `lookup`. Unparseable values are
/// logged and skipped.
fn apply_overrides(settings: &mut AdvisorSettings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(raw) = var("VANET_LOG_LEVEL") {
        if let Some(level) = parsed(&raw, "VANET_LOG_LEVEL", log_level) {
            settings.logging.level = level.to_string();
        }
    }
    if let Some(raw) = var("VANET_LOG_JSON") {
        if let Some(json) = parsed(&raw, "VANET_LOG_JSON", flag) {
            settings.logging.json = json;
        }
    }
    if let Some(raw) = var("VANET_BACKEND_KIND") {
        let kind = |s: &str| -> Option<BackendKind> {
            serde_json::from_value(Value::String(s.trim().to_lowercase())).ok()
        };
        if let Some(kind) = parsed(&raw, "VANET_BACKEND_KIND", kind) {
            settings.backend.kind = kind;
        }
    }
    if let Some(url) = var("VANET_BACKEND_URL") {
        settings.backend.endpoint = Some(url);
    }
    if let Some(raw) = var("VANET_BACKEND_TIMEOUT_MS") {
        if let Some(ms) = parsed(&raw, "VANET_BACKEND_TIMEOUT_MS", |s| in_range(s, 1, 600_000)) {
            settings.backend.timeout_ms = ms;
        }
    }
    if let Some(raw) = var("VANET_CONTEXT_MAX_ENTRIES") {
        if let Some(n) = parsed(&raw, "VANET_CONTEXT_MAX_ENTRIES", |s| in_range(s, 1, 1_000_000)) {
            settings.context.max_entries = n;
        }
    }
}

fn parsed<T>(raw: &str, name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let value = parse(raw);
    if value.is_none() {
        warn!(var = name, value = raw, "ignoring unparseable environment override");
    }
    value
}

fn flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn log_level(s: &str) -> Option<&'static str> {
    Some(match s.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => return None,
    })
}

fn in_range<T: FromStr + PartialOrd>(s: &str, min: T, max: T) -> Option<T> {
    s.trim()
        .parse()
        .ok()
        .filter(|n: &T| (min..=max).contains(n))
}
