//! Instruction backend settings.

use serde::{Deserialize, Serialize};

/// Which backend produces instructions for clusters without a safety override.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Deterministic phrase templates only.
    #[default]
    Template,
    /// External text-generation service over HTTP, with template fallback.
    Http,
}

/// Backend selection, timeout and retry configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// URL the HTTP backend posts requests to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Model name forwarded to the HTTP backend.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Deadline for one backend call, retries included.
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Consecutive failures before the circuit opens.
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Template,
            endpoint: None,
            model: "advisor-default".to_string(),
            api_key_env: "VANET_API_KEY".to_string(),
            timeout_ms: 2000,
            max_retries: 2,
            base_delay_ms: 200,
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown_ms: 30_000,
        }
    }
}
