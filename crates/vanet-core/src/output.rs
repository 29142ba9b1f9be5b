use serde::{Deserialize, Serialize};

use crate::cluster::DeliveryMode;

pub const NO_ALERTS_TEXT: &str = "No active alerts. Drive safely.";
pub const SILENT_LOG_TEXT: &str = "[SILENT] Logged low-priority event.";
pub const SUPPRESSED_TEXT: &str = "[SILENT] (Repeat info suppressed)";

/// Why the orchestrator produced a given output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Empty batch.
    NoAlerts,
    /// Top event was below the visual threshold; only logged.
    Logged,
    /// Top event shown as an icon.
    Icon,
    /// Instruction spoken to the driver.
    Spoken,
    /// Instruction identical to the last one for this event; not repeated.
    Suppressed,
}

/// What reaches the presentation layer for one cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOutput {
    pub mode: DeliveryMode,
    pub text: String,
    pub disposition: Disposition,
}

impl DriverOutput {
    pub fn no_alerts() -> Self {
        Self {
            mode: DeliveryMode::Voice,
            text: NO_ALERTS_TEXT.into(),
            disposition: Disposition::NoAlerts,
        }
    }

    pub fn logged() -> Self {
        Self {
            mode: DeliveryMode::Silent,
            text: SILENT_LOG_TEXT.into(),
            disposition: Disposition::Logged,
        }
    }

    pub fn icon(event_label: impl std::fmt::Display) -> Self {
        Self {
            mode: DeliveryMode::Visual,
            text: format!("[VISUAL ICON] {event_label} ahead."),
            disposition: Disposition::Icon,
        }
    }

    pub fn spoken(text: impl Into<String>) -> Self {
        Self {
            mode: DeliveryMode::Voice,
            text: text.into(),
            disposition: Disposition::Spoken,
        }
    }

    pub fn suppressed() -> Self {
        Self {
            mode: DeliveryMode::Silent,
            text: SUPPRESSED_TEXT.into(),
            disposition: Disposition::Suppressed,
        }
    }

    /// Whether anything is spoken to the driver.
    pub fn is_spoken(&self) -> bool {
        self.disposition == Disposition::Spoken || self.disposition == Disposition::NoAlerts
    }
}
