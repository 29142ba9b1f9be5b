//! Synthetic V2V/V2I traffic for exercising the advisor without a radio.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use vanet_core::message::{MessageKind, RawMessage};

const EVENTS: &[&str] = &[
    "Accident",
    "Congestion",
    "Slippery Road",
    "Road Works",
    "Normal",
    "Emergency Vehicle",
];
/// Re-roll pool for notifications that drew "Normal".
const HAZARDS: &[&str] = &["Accident", "Congestion", "Slippery Road", "Road Works"];
const BURST_SIZE: usize = 10;
const BURST_SOURCE: usize = 5;

#[derive(Clone, Debug)]
pub struct TrafficConfig {
    /// Messages attempted per batch before loss and bursts.
    pub messages: usize,
    /// Probability in [0, 1] that a message is lost.
    pub loss: f64,
}

pub struct TrafficGenerator {
    config: TrafficConfig,
    rng: StdRng,
    locations: Vec<String>,
}

impl TrafficGenerator {
    pub fn new(config: TrafficConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            locations: (10..50).step_by(5).map(|km| format!("KM_{km}")).collect(),
        }
    }

    /// One message, or `None` when it is lost in transit.
    pub fn message(&mut self) -> Option<RawMessage> {
        if self.rng.gen::<f64>() < self.config.loss {
            return None;
        }

        let kind = if self.rng.gen_bool(0.5) {
            MessageKind::StatusUpdate
        } else {
            MessageKind::EventNotification
        };
        let (event, content, priority) = match kind {
            MessageKind::StatusUpdate => ("Normal", "Vehicle status normal".to_string(), 1),
            MessageKind::EventNotification => {
                let mut event = self.pick(EVENTS);
                if event == "Normal" {
                    event = self.pick(HAZARDS);
                }
                (event, format!("Alert: {event} detected"), self.rng.gen_range(2..=5))
            }
        };
        let pdr = (self.rng.gen_range(0.4..=1.0_f64) * 100.0).round() / 100.0;
        let location = self.locations[self.rng.gen_range(0..self.locations.len())].clone();

        Some(RawMessage {
            id: Some(self.message_id()),
            timestamp: Some(Utc::now().to_rfc3339()),
            message_kind: Some(kind.to_string()),
            event_type: Some(event.to_string()),
            location: Some(location),
            content: Some(content),
            priority: Some(priority),
            speed: Some(self.rng.gen_range(0..=120)),
            packet_delivery_ratio: Some(pdr),
        })
    }

    /// A shuffled batch. Batches larger than the burst size also carry a
    /// flood of copies of one message under fresh ids.
    pub fn batch(&mut self) -> Vec<RawMessage> {
        let mut batch: Vec<RawMessage> = (0..self.config.messages)
            .filter_map(|_| self.message())
            .collect();

        if batch.len() > BURST_SIZE {
            let source = batch[BURST_SOURCE].clone();
            for _ in 0..BURST_SIZE {
                let mut copy = source.clone();
                copy.id = Some(self.message_id());
                copy.timestamp = Some(Utc::now().to_rfc3339());
                batch.push(copy);
            }
        }

        batch.shuffle(&mut self.rng);
        batch
    }

    fn pick(&mut self, pool: &[&'static str]) -> &'static str {
        pool.choose(&mut self.rng).copied().unwrap_or("Normal")
    }

    fn message_id(&mut self) -> String {
        format!("msg_{}", self.rng.gen_range(1000..=9999))
    }
}
