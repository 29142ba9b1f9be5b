//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may name only the fields it changes.

mod backend;
mod context;

pub use backend::*;
pub use context::*;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the advisor.
///
/// ```json
/// {
///   "urgency": { "voiceThreshold": 85 },
///   "backend": { "kind": "http", "endpoint": "http://localhost:8088/advise" },
///   "context": { "eviction": "maxEntries", "maxEntries": 64 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvisorSettings {
    /// Urgency scoring and delivery-mode thresholds.
    pub urgency: UrgencySettings,
    /// Instruction backend selection and resilience.
    pub backend: BackendSettings,
    /// Temporal context store eviction.
    pub context: ContextSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl AdvisorSettings {
    /// Reject combinations that would make classification meaningless.
    pub fn validate(&self) -> Result<()> {
        let u = &self.urgency;
        if u.visual_threshold >= u.voice_threshold {
            return Err(SettingsError::invalid(
                "urgency.visualThreshold",
                format!("{} is not below voiceThreshold {}", u.visual_threshold, u.voice_threshold),
            ));
        }
        if !(0.0..=1.0).contains(&u.low_pdr_threshold) {
            return Err(SettingsError::invalid(
                "urgency.lowPdrThreshold",
                format!("{} is outside [0, 1]", u.low_pdr_threshold),
            ));
        }
        if !(u.low_pdr_penalty > 0.0 && u.low_pdr_penalty <= 1.0) {
            return Err(SettingsError::invalid(
                "urgency.lowPdrPenalty",
                format!("{} is outside (0, 1]", u.low_pdr_penalty),
            ));
        }
        if u.priority_weight < 0.0 {
            return Err(SettingsError::invalid("urgency.priorityWeight", "must not be negative"));
        }
        if self.backend.kind == BackendKind::Http && self.backend.endpoint.is_none() {
            return Err(SettingsError::invalid(
                "backend.endpoint",
                "required when backend.kind is \"http\"",
            ));
        }
        if self.context.eviction == EvictionKind::MaxEntries && self.context.max_entries == 0 {
            return Err(SettingsError::invalid("context.maxEntries", "must be at least 1"));
        }
        for (target, level) in &self.logging.modules {
            if tracing::Level::from_str(level.trim()).is_err() {
                return Err(SettingsError::invalid(
                    "logging.modules",
                    format!("{target}: unknown level \"{level}\""),
                ));
            }
        }
        Ok(())
    }
}

/// Urgency scoring constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UrgencySettings {
    /// Points per priority level.
    pub priority_weight: f64,
    /// Report count contribution is capped at this value.
    pub report_cap: u32,
    /// Clusters whose average delivery ratio is below this are discounted.
    pub low_pdr_threshold: f64,
    /// Multiplier applied to discounted clusters.
    pub low_pdr_penalty: f64,
    /// Scores strictly above this are spoken.
    pub voice_threshold: f64,
    /// Scores strictly above this (and not spoken) are shown.
    pub visual_threshold: f64,
}

impl Default for UrgencySettings {
    fn default() -> Self {
        Self {
            priority_weight: 18.0,
            report_cap: 10,
            low_pdr_threshold: 0.5,
            low_pdr_penalty: 0.8,
            voice_threshold: 80.0,
            visual_threshold: 40.0,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level: trace, debug, info, warn or error.
    pub level: String,
    /// JSON lines instead of human-readable text.
    pub json: bool,
    /// Per-target levels, e.g. `{"vanet_llm": "debug"}`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            modules: BTreeMap::new(),
        }
    }
}
