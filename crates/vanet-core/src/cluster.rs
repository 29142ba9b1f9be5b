use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ClusterError;
use crate::ids::MessageId;
use crate::message::{EventType, MessageRecord, Priority};

/// How an alert reaches the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Spoken instruction.
    Voice,
    /// Icon or text on the display.
    Visual,
    /// Logged only.
    Silent,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Visual => "visual",
            Self::Silent => "silent",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Voice => write!(f, "Voice"),
            Self::Visual => write!(f, "Visual"),
            Self::Silent => write!(f, "Silent"),
        }
    }
}

/// Identity of an event within a cycle and across cycles: event type plus location.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterKey {
    pub event_type: EventType,
    pub location: String,
}

impl ClusterKey {
    pub fn new(event_type: EventType, location: impl Into<String>) -> Self {
        Self {
            event_type,
            location: location.into(),
        }
    }

    pub fn of(message: &MessageRecord) -> Self {
        Self::new(message.event_type().clone(), message.location())
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.event_type, self.location)
    }
}

/// Aggregate of all messages sharing one [`ClusterKey`] in a processing cycle.
///
/// The first member is the representative: it supplies `timestamp`,
/// `priority` and `raw_content_sample`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCluster {
    event_type: EventType,
    location: String,
    report_count: usize,
    timestamp: String,
    priority: Priority,
    raw_content_sample: String,
    message_ids: Vec<MessageId>,
    average_pdr: f64,
    urgency_score: f64,
    delivery_mode: DeliveryMode,
}

impl EventCluster {
    /// Build a cluster from its members in arrival order.
    ///
    /// Fails when `members` is empty or mixes keys; both are caller bugs.
    pub fn from_members(
        members: &[&MessageRecord],
        urgency_score: f64,
        delivery_mode: DeliveryMode,
    ) -> Result<Self, ClusterError> {
        let Some(first) = members.first() else {
            return Err(ClusterError::EmptyGroup {
                key: "<none>".into(),
            });
        };
        let key = ClusterKey::of(first);
        if let Some(stray) = members.iter().find(|m| ClusterKey::of(m) != key) {
            return Err(ClusterError::ForeignMember {
                key: key.to_string(),
                id: stray.id().to_string(),
            });
        }

        let report_count = members.len();
        let average_pdr =
            members.iter().map(|m| m.packet_delivery_ratio()).sum::<f64>() / report_count as f64;

        Ok(Self {
            event_type: key.event_type,
            location: key.location,
            report_count,
            timestamp: first.timestamp().to_string(),
            priority: first.priority(),
            raw_content_sample: first.content().to_string(),
            message_ids: members.iter().map(|m| m.id().clone()).collect(),
            average_pdr,
            urgency_score,
            delivery_mode,
        })
    }

    pub fn key(&self) -> ClusterKey {
        ClusterKey::new(self.event_type.clone(), self.location.clone())
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn report_count(&self) -> usize {
        self.report_count
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn raw_content_sample(&self) -> &str {
        &self.raw_content_sample
    }

    pub fn message_ids(&self) -> &[MessageId] {
        &self.message_ids
    }

    pub fn average_pdr(&self) -> f64 {
        self.average_pdr
    }

    pub fn urgency_score(&self) -> f64 {
        self.urgency_score
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, event: EventType, location: &str, priority: u8, pdr: f64) -> MessageRecord {
        MessageRecord::new(
            MessageId::from_raw(id),
            format!("2026-10-19T08:00:0{}", id.len()),
            event,
            location,
            Priority::new(priority).unwrap(),
        )
        .with_content(format!("content of {id}"))
        .with_packet_delivery_ratio(pdr)
        .unwrap()
    }

    #[test]
    fn key_display_joins_with_underscore() {
        let key = ClusterKey::new(EventType::Accident, "KM_20");
        assert_eq!(key.to_string(), "Accident_KM_20");
        let key = ClusterKey::new(EventType::SlipperyRoad, "KM_35");
        assert_eq!(key.to_string(), "Slippery Road_KM_35");
    }

    #[test]
    fn representative_is_first_member() {
        let a = msg("a", EventType::Accident, "KM_20", 3, 1.0);
        let b = msg("bb", EventType::Accident, "KM_20", 5, 0.5);
        let cluster = EventCluster::from_members(&[&a, &b], 56.0, DeliveryMode::Visual).unwrap();
        assert_eq!(cluster.priority().get(), 3);
        assert_eq!(cluster.timestamp(), a.timestamp());
        assert_eq!(cluster.raw_content_sample(), "content of a");
        assert_eq!(cluster.report_count(), 2);
        assert_eq!(cluster.message_ids().len(), cluster.report_count());
        assert_eq!(cluster.message_ids()[1].as_str(), "bb");
        assert!((cluster.average_pdr() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn empty_group_is_a_contract_violation() {
        let err = EventCluster::from_members(&[], 0.0, DeliveryMode::Silent).unwrap_err();
        assert!(matches!(err, ClusterError::EmptyGroup { .. }));
    }

    #[test]
    fn mixed_keys_are_rejected() {
        let a = msg("a", EventType::Accident, "KM_20", 3, 1.0);
        let b = msg("b", EventType::Accident, "KM_25", 3, 1.0);
        let err = EventCluster::from_members(&[&a, &b], 55.0, DeliveryMode::Visual).unwrap_err();
        assert_eq!(
            err,
            ClusterError::ForeignMember {
                key: "Accident_KM_20".into(),
                id: "b".into()
            }
        );
    }

    #[test]
    fn serializes_camel_case() {
        let a = msg("a", EventType::Congestion, "KM_10", 2, 1.0);
        let cluster = EventCluster::from_members(&[&a], 37.0, DeliveryMode::Silent).unwrap();
        let json = serde_json::to_value(&cluster).unwrap();
        assert_eq!(json["eventType"], "Congestion");
        assert_eq!(json["reportCount"], 1);
        assert_eq!(json["deliveryMode"], "Silent");
        assert_eq!(json["messageIds"][0], "a");
    }

    #[test]
    fn delivery_mode_strings() {
        assert_eq!(DeliveryMode::Voice.as_str(), "voice");
        assert_eq!(DeliveryMode::Visual.to_string(), "Visual");
    }
}
