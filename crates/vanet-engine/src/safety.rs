//! Deterministic safety overrides.
//!
//! Rules are checked in order and the first match wins. A matching rule
//! replaces whatever a backend would have produced for the cluster.
//!
//! - `safety.emergency-yield`: any emergency vehicle, yield right of way
//! - `safety.severe-accident-stop`: accident at critical priority, stop

use serde::Serialize;

use vanet_core::cluster::EventCluster;
use vanet_core::message::{EventType, Priority};

pub const EMERGENCY_YIELD: &str = "safety.emergency-yield";
pub const SEVERE_ACCIDENT_STOP: &str = "safety.severe-accident-stop";

/// Fixed instruction chosen by a safety rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyOverride {
    pub rule_id: &'static str,
    pub text: String,
}

struct SafetyRule {
    id: &'static str,
    applies: fn(&EventCluster) -> bool,
    directive: fn(&EventCluster) -> String,
}

fn emergency_yield() -> SafetyRule {
    SafetyRule {
        id: EMERGENCY_YIELD,
        applies: |c| c.event_type().is_emergency_vehicle(),
        directive: |c| {
            format!(
                "PRIORITY: Emergency vehicle approaching at {}. Yield right of way immediately.",
                c.location()
            )
        },
    }
}

fn severe_accident_stop() -> SafetyRule {
    SafetyRule {
        id: SEVERE_ACCIDENT_STOP,
        applies: |c| *c.event_type() == EventType::Accident && c.priority() >= Priority::CRITICAL,
        directive: |c| {
            format!(
                "CRITICAL OVERRIDE: SEVERE ACCIDENT at {}. HOST VEHICLE STOP REQUIRED.",
                c.location()
            )
        },
    }
}

/// Ordered rule table. Pure: no state, no I/O.
pub struct SafetyVerifier {
    rules: Vec<SafetyRule>,
}

impl Default for SafetyVerifier {
    fn default() -> Self {
        Self {
            rules: vec![emergency_yield(), severe_accident_stop()],
        }
    }
}

impl SafetyVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify(&self, cluster: &EventCluster) -> Option<SafetyOverride> {
        self.rules
            .iter()
            .find(|rule| (rule.applies)(cluster))
            .map(|rule| SafetyOverride {
                rule_id: rule.id,
                text: (rule.directive)(cluster),
            })
    }

    /// Rule ids in evaluation order.
    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id).collect()
    }
}
