//! Temporal context store settings.

use serde::{Deserialize, Serialize};

/// How the context store forgets old entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvictionKind {
    /// Keep every entry for the process lifetime.
    #[default]
    Unbounded,
    /// Keep at most `maxEntries`, dropping the least recently emitted.
    MaxEntries,
    /// Drop entries not emitted within `maxAgeSecs`.
    MaxAge,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    pub eviction: EvictionKind,
    pub max_entries: usize,
    pub max_age_secs: u64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            eviction: EvictionKind::Unbounded,
            max_entries: 256,
            max_age_secs: 300,
        }
    }
}
