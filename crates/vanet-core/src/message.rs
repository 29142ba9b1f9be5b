use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MessageError;
use crate::ids::MessageId;

/// Placeholder used in errors for records that arrive without an id.
const UNKNOWN_ID: &str = "<unknown>";

/// Message standard: periodic BSM status vs. event-triggered DENM notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "BSM", alias = "StatusUpdate", alias = "status_update")]
    StatusUpdate,
    #[serde(rename = "DENM", alias = "EventNotification", alias = "event_notification")]
    EventNotification,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusUpdate => write!(f, "BSM"),
            Self::EventNotification => write!(f, "DENM"),
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "BSM" | "StatusUpdate" | "status_update" => Ok(Self::StatusUpdate),
            "DENM" | "EventNotification" | "event_notification" => Ok(Self::EventNotification),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// Road event reported by a message. Unknown labels are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Accident,
    Congestion,
    SlipperyRoad,
    RoadWorks,
    Normal,
    EmergencyVehicle,
    Other(String),
}

impl EventType {
    pub fn is_emergency_vehicle(&self) -> bool {
        matches!(self, Self::EmergencyVehicle)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accident => write!(f, "Accident"),
            Self::Congestion => write!(f, "Congestion"),
            Self::SlipperyRoad => write!(f, "Slippery Road"),
            Self::RoadWorks => write!(f, "Road Works"),
            Self::Normal => write!(f, "Normal"),
            Self::EmergencyVehicle => write!(f, "Emergency Vehicle"),
            Self::Other(label) => f.write_str(label),
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        let folded: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "accident" => Self::Accident,
            "congestion" => Self::Congestion,
            "slipperyroad" => Self::SlipperyRoad,
            "roadworks" => Self::RoadWorks,
            "normal" => Self::Normal,
            "emergencyvehicle" => Self::EmergencyVehicle,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EventType> for String {
    fn from(e: EventType) -> Self {
        e.to_string()
    }
}

/// Message priority, 1 (low) to 5 (critical).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const CRITICAL: Priority = Priority(5);

    pub fn new(value: u8) -> Option<Self> {
        (1..=5).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Priority {
    type Error = String;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("priority {value} outside 1..=5"))
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Loosely-typed message as handed over by the generator. Every field is
/// optional here; [`MessageRecord::try_from`] decides what is acceptable.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(alias = "message_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(alias = "msg_type", alias = "message_kind", skip_serializing_if = "Option::is_none")]
    pub message_kind: Option<String>,
    #[serde(alias = "event", alias = "event_type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<i64>,
    #[serde(alias = "packet_delivery_ratio", skip_serializing_if = "Option::is_none")]
    pub packet_delivery_ratio: Option<f64>,
}

impl RawMessage {
    /// Decode one JSON value. A type mismatch in any field is reported as
    /// [`MessageError::Malformed`] so the rest of the batch survives.
    pub fn from_value(value: serde_json::Value) -> Result<Self, MessageError> {
        let id = value
            .get("id")
            .or_else(|| value.get("message_id"))
            .and_then(|v| v.as_str())
            .unwrap_or(UNKNOWN_ID)
            .to_string();
        serde_json::from_value(value).map_err(|e| MessageError::Malformed {
            id,
            reason: e.to_string(),
        })
    }
}

/// One received V2V/V2I message. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawMessage")]
pub struct MessageRecord {
    id: MessageId,
    timestamp: String,
    message_kind: MessageKind,
    event_type: EventType,
    location: String,
    content: String,
    priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<u32>,
    packet_delivery_ratio: f64,
}

impl MessageRecord {
    /// Create a record with defaults for the optional fields: empty content,
    /// no speed, a delivery ratio of 1.0, and a kind derived from the event.
    pub fn new(
        id: MessageId,
        timestamp: impl Into<String>,
        event_type: EventType,
        location: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id,
            timestamp: timestamp.into(),
            message_kind: default_kind(&event_type),
            event_type,
            location: location.into(),
            content: String::new(),
            priority,
            speed: None,
            packet_delivery_ratio: 1.0,
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.message_kind = kind;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_speed(mut self, speed: u32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_packet_delivery_ratio(mut self, pdr: f64) -> Result<Self, MessageError> {
        self.packet_delivery_ratio = normalize_pdr(self.id.as_str(), pdr)?;
        Ok(self)
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn message_kind(&self) -> MessageKind {
        self.message_kind
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn speed(&self) -> Option<u32> {
        self.speed
    }

    pub fn packet_delivery_ratio(&self) -> f64 {
        self.packet_delivery_ratio
    }
}

impl TryFrom<RawMessage> for MessageRecord {
    type Error = MessageError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let id = required(raw.id, UNKNOWN_ID, "id")?;
        let timestamp = required(raw.timestamp, &id, "timestamp")?;
        let event_type = EventType::from(required(raw.event_type, &id, "eventType")?);
        let location = required(raw.location, &id, "location")?;
        let priority_value = raw.priority.ok_or_else(|| MessageError::MissingField {
            id: id.clone(),
            field: "priority",
        })?;
        let priority = Priority::try_from(priority_value).map_err(|_| {
            MessageError::PriorityOutOfRange {
                id: id.clone(),
                value: priority_value,
            }
        })?;

        let message_kind = match raw.message_kind.as_deref() {
            Some(label) => label
                .parse::<MessageKind>()
                .map_err(|reason| MessageError::Malformed {
                    id: id.clone(),
                    reason,
                })?,
            None => default_kind(&event_type),
        };

        let speed = match raw.speed {
            Some(v) => Some(u32::try_from(v).map_err(|_| MessageError::NegativeSpeed {
                id: id.clone(),
                value: v,
            })?),
            None => None,
        };

        let packet_delivery_ratio = match raw.packet_delivery_ratio {
            Some(v) => normalize_pdr(&id, v)?,
            None => 1.0,
        };

        Ok(Self {
            id: MessageId::from_raw(id),
            timestamp,
            message_kind,
            event_type,
            location,
            content: raw.content.unwrap_or_default(),
            priority,
            speed,
            packet_delivery_ratio,
        })
    }
}

fn required(value: Option<String>, id: &str, field: &'static str) -> Result<String, MessageError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MessageError::MissingField {
            id: id.to_string(),
            field,
        })
}

fn default_kind(event_type: &EventType) -> MessageKind {
    if *event_type == EventType::Normal {
        MessageKind::StatusUpdate
    } else {
        MessageKind::EventNotification
    }
}

/// Clamp a finite delivery ratio into [0, 1]; reject NaN and infinities.
fn normalize_pdr(id: &str, pdr: f64) -> Result<f64, MessageError> {
    if !pdr.is_finite() {
        return Err(MessageError::InvalidPdr { id: id.to_string() });
    }
    let clamped = pdr.clamp(0.0, 1.0);
    if clamped != pdr {
        tracing::debug!(message_id = id, raw = pdr, clamped, "packet delivery ratio clamped");
    }
    Ok(clamped)
}
