use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use vanet_core::backend::{InstructionBackend, InstructionRequest};
use vanet_core::cluster::EventCluster;
use vanet_core::errors::BackendError;
use vanet_llm::template_instruction;
use vanet_telemetry::MetricsRecorder;

use crate::safety::SafetyVerifier;

const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Where an instruction's text came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum InstructionSource {
    /// Fixed text from the named safety rule.
    SafetyOverride(&'static str),
    /// Text from the named backend.
    Backend(String),
    /// Deterministic phrase template.
    Template,
}

impl fmt::Display for InstructionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SafetyOverride(rule) => write!(f, "safety_override:{rule}"),
            Self::Backend(name) => write!(f, "backend:{name}"),
            Self::Template => write!(f, "template"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub text: String,
    pub source: InstructionSource,
}

/// Produces the instruction for one cluster.
///
/// Order: safety override, then the configured backend (bounded by a
/// timeout), then the phrase templates. Never fails.
pub struct InstructionGenerator {
    verifier: SafetyVerifier,
    backend: Option<Arc<dyn InstructionBackend>>,
    timeout: Duration,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl Default for InstructionGenerator {
    fn default() -> Self {
        Self::new(SafetyVerifier::default())
    }
}

impl InstructionGenerator {
    pub fn new(verifier: SafetyVerifier) -> Self {
        Self {
            verifier,
            backend: None,
            timeout: DEFAULT_BACKEND_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn InstructionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn set_metrics(&mut self, metrics: Arc<MetricsRecorder>) {
        self.metrics = Some(metrics);
    }

    pub fn verifier(&self) -> &SafetyVerifier {
        &self.verifier
    }

    pub async fn generate(&self, cluster: &EventCluster, context_hint: Option<String>) -> Instruction {
        if let Some(o) = self.verifier.verify(cluster) {
            info!(rule = o.rule_id, key = %cluster.key(), "safety override applied");
            if let Some(m) = &self.metrics {
                m.counter_inc("safety_overrides", &[("rule", o.rule_id)], 1);
            }
            return Instruction {
                text: o.text,
                source: InstructionSource::SafetyOverride(o.rule_id),
            };
        }

        if let Some(backend) = &self.backend {
            let mut request = InstructionRequest::new(cluster.clone());
            if let Some(hint) = context_hint {
                request = request.with_hint(hint);
            }
            match self.call_backend(backend.as_ref(), &request).await {
                Ok(text) => {
                    debug!(backend = backend.name(), key = %cluster.key(), "backend instruction");
                    return Instruction {
                        text,
                        source: InstructionSource::Backend(backend.name().to_string()),
                    };
                }
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        key = %cluster.key(),
                        error = %e,
                        kind = e.error_kind(),
                        "backend failed, using template"
                    );
                    if let Some(m) = &self.metrics {
                        m.counter_inc("backend_fallbacks", &[("kind", e.error_kind())], 1);
                    }
                }
            }
        }

        Instruction {
            text: template_instruction(cluster),
            source: InstructionSource::Template,
        }
    }

    async fn call_backend(
        &self,
        backend: &dyn InstructionBackend,
        request: &InstructionRequest,
    ) -> Result<String, BackendError> {
        let text = tokio::time::timeout(self.timeout, backend.generate(request))
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))??;
        let text = text.trim();
        if text.is_empty() {
            return Err(BackendError::InvalidResponse("empty instruction".into()));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{EMERGENCY_YIELD, SEVERE_ACCIDENT_STOP};
    use vanet_core::cluster::DeliveryMode;
    use vanet_core::ids::MessageId;
    use vanet_core::message::{EventType, MessageRecord, Priority};
    use vanet_llm::{MockBackend, MockResponse, ReliableBackend, ReliableConfig};

    fn cluster(event: EventType, priority: u8, reports: usize) -> EventCluster {
        let members: Vec<MessageRecord> = (0..reports)
            .map(|i| {
                MessageRecord::new(
                    MessageId::from_raw(format!("m{i}")),
                    "t",
                    event.clone(),
                    "KM_20",
                    Priority::new(priority).unwrap(),
                )
            })
            .collect();
        let refs: Vec<&MessageRecord> = members.iter().collect();
        EventCluster::from_members(&refs, 90.0, DeliveryMode::Voice).unwrap()
    }

    #[tokio::test]
    async fn template_when_no_backend() {
        let out = InstructionGenerator::default()
            .generate(&cluster(EventType::Accident, 4, 3), None)
            .await;
        assert_eq!(out.source, InstructionSource::Template);
        assert_eq!(out.text, "Caution: Accident reported at KM_20. Please slow down.");
    }

    #[tokio::test]
    async fn safety_override_beats_backend() {
        let mock = Arc::new(MockBackend::always(MockResponse::text(
            "Speed up and overtake the ambulance.",
        )));
        let metrics = Arc::new(MetricsRecorder::new());
        let generator = InstructionGenerator::default()
            .with_backend(mock.clone())
            .with_metrics(metrics.clone());

        for priority in 1..=5 {
            let out = generator
                .generate(&cluster(EventType::EmergencyVehicle, priority, 1), None)
                .await;
            assert!(out.text.contains("Yield right of way"));
            assert_eq!(out.source, InstructionSource::SafetyOverride(EMERGENCY_YIELD));
        }
        let out = generator.generate(&cluster(EventType::Accident, 5, 1), None).await;
        assert_eq!(out.source, InstructionSource::SafetyOverride(SEVERE_ACCIDENT_STOP));

        assert_eq!(mock.call_count(), 0);
        assert_eq!(
            metrics.counter_get("safety_overrides", &[("rule", EMERGENCY_YIELD)]),
            5
        );
    }

    #[tokio::test]
    async fn backend_text_used_and_hint_forwarded() {
        let mock = Arc::new(MockBackend::always(MockResponse::text(
            "  Heavy traffic near KM_20, keep distance.  ",
        )));
        let generator = InstructionGenerator::default().with_backend(mock.clone());
        let out = generator
            .generate(&cluster(EventType::Congestion, 4, 6), Some("(Context: seen)".into()))
            .await;
        assert_eq!(out.text, "Heavy traffic near KM_20, keep distance.");
        assert_eq!(out.source, InstructionSource::Backend("mock".into()));
        assert_eq!(
            mock.requests()[0].context_hint.as_deref(),
            Some("(Context: seen)")
        );
    }

    #[tokio::test]
    async fn backend_error_falls_back_to_template() {
        let mock = Arc::new(MockBackend::always(MockResponse::Error(
            BackendError::Unavailable,
        )));
        let metrics = Arc::new(MetricsRecorder::new());
        let generator = InstructionGenerator::default()
            .with_backend(mock)
            .with_metrics(metrics.clone());
        let out = generator.generate(&cluster(EventType::Congestion, 4, 1), None).await;
        assert_eq!(out.source, InstructionSource::Template);
        assert_eq!(
            out.text,
            "Traffic: Congestion at KM_20. (Data unverified, exercise caution.)"
        );
        assert_eq!(
            metrics.counter_get("backend_fallbacks", &[("kind", "unavailable")]),
            1
        );
    }

    #[tokio::test]
    async fn empty_reply_falls_back() {
        let mock = Arc::new(MockBackend::always(MockResponse::text("   ")));
        let generator = InstructionGenerator::default().with_backend(mock);
        let out = generator.generate(&cluster(EventType::SlipperyRoad, 2, 1), None).await;
        assert_eq!(out.source, InstructionSource::Template);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let mock = Arc::new(MockBackend::always(MockResponse::delayed(
            Duration::from_secs(10),
            MockResponse::text("too late"),
        )));
        let metrics = Arc::new(MetricsRecorder::new());
        let generator = InstructionGenerator::default()
            .with_backend(mock)
            .with_timeout(Duration::from_millis(500))
            .with_metrics(metrics.clone());

        let out = generator.generate(&cluster(EventType::RoadWorks, 3, 2), None).await;
        assert_eq!(out.source, InstructionSource::Template);
        assert_eq!(out.text, "Notice: Road Works at KM_20.");
        assert_eq!(metrics.counter_get("backend_fallbacks", &[("kind", "timeout")]), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_backend_trips_the_breaker() {
        let reliable = Arc::new(ReliableBackend::new(
            MockBackend::always(MockResponse::delayed(
                Duration::from_secs(60),
                MockResponse::text("too late"),
            )),
            ReliableConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(30),
                ..ReliableConfig::default()
            },
        ));
        let metrics = Arc::new(MetricsRecorder::new());
        let generator = InstructionGenerator::default()
            .with_backend(reliable.clone())
            .with_timeout(Duration::from_millis(500))
            .with_metrics(metrics.clone());

        for _ in 0..5 {
            let out = generator.generate(&cluster(EventType::Congestion, 3, 2), None).await;
            assert_eq!(out.source, InstructionSource::Template);
        }
        assert_eq!(reliable.circuit_state_name(), "open");
        assert_eq!(reliable.inner().call_count(), 1);
        assert_eq!(metrics.counter_get("backend_fallbacks", &[("kind", "timeout")]), 1);
        assert_eq!(metrics.counter_get("backend_fallbacks", &[("kind", "unavailable")]), 4);
    }

    #[test]
    fn source_display_and_serde() {
        assert_eq!(
            InstructionSource::SafetyOverride(EMERGENCY_YIELD).to_string(),
            "safety_override:safety.emergency-yield"
        );
        let json = serde_json::to_value(InstructionSource::Backend("http".into())).unwrap();
        assert_eq!(json["kind"], "backend");
        assert_eq!(json["name"], "http");
        let json = serde_json::to_value(InstructionSource::Template).unwrap();
        assert_eq!(json["kind"], "template");
    }
}
