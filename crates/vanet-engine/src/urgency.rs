use vanet_core::cluster::DeliveryMode;
use vanet_core::message::Priority;
use vanet_settings::UrgencySettings;

/// Scoring constants and delivery-mode thresholds.
///
/// `score = priority * priority_weight + min(report_count, report_cap)`,
/// multiplied by `low_pdr_penalty` when the average delivery ratio is below
/// `low_pdr_threshold`, then rounded to one decimal.
#[derive(Clone, Debug, PartialEq)]
pub struct UrgencyPolicy {
    pub priority_weight: f64,
    pub report_cap: u32,
    pub low_pdr_threshold: f64,
    pub low_pdr_penalty: f64,
    pub voice_threshold: f64,
    pub visual_threshold: f64,
}

impl Default for UrgencyPolicy {
    fn default() -> Self {
        Self::from(&UrgencySettings::default())
    }
}

impl From<&UrgencySettings> for UrgencyPolicy {
    fn from(s: &UrgencySettings) -> Self {
        Self {
            priority_weight: s.priority_weight,
            report_cap: s.report_cap,
            low_pdr_threshold: s.low_pdr_threshold,
            low_pdr_penalty: s.low_pdr_penalty,
            voice_threshold: s.voice_threshold,
            visual_threshold: s.visual_threshold,
        }
    }
}

impl UrgencyPolicy {
    pub fn score(&self, priority: Priority, report_count: usize, average_pdr: f64) -> f64 {
        let reports = report_count.min(self.report_cap as usize) as f64;
        let mut score = f64::from(priority.get()) * self.priority_weight + reports;
        if average_pdr < self.low_pdr_threshold {
            score *= self.low_pdr_penalty;
        }
        round_tenth(score)
    }

    /// Thresholds are exclusive: a score equal to a threshold falls to the lower mode.
    pub fn classify(&self, score: f64) -> DeliveryMode {
        if score > self.voice_threshold {
            DeliveryMode::Voice
        } else if score > self.visual_threshold {
            DeliveryMode::Visual
        } else {
            DeliveryMode::Silent
        }
    }
}

/// Round half away from zero to one decimal.
fn round_tenth(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
