use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use vanet_core::backend::InstructionBackend;
use vanet_core::cluster::{DeliveryMode, EventCluster};
use vanet_core::ids::CycleId;
use vanet_core::message::RawMessage;
use vanet_core::output::DriverOutput;
use vanet_settings::AdvisorSettings;
use vanet_telemetry::MetricsRecorder;

use crate::clustering::{ClusteringEngine, IngestReport};
use crate::context_store::{ContextStore, EvictionPolicy};
use crate::error::EngineError;
use crate::instruction::InstructionGenerator;
use crate::safety::SafetyVerifier;
use crate::urgency::UrgencyPolicy;

/// Result of one processing cycle.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub received: usize,
    pub dropped: usize,
    pub clusters: Vec<EventCluster>,
    pub output: DriverOutput,
}

/// Turns a batch of clusters into the single output presented to the driver.
pub struct ScenarioOrchestrator {
    clustering: ClusteringEngine,
    generator: InstructionGenerator,
    store: Arc<ContextStore>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl Default for ScenarioOrchestrator {
    fn default() -> Self {
        Self::new(
            ClusteringEngine::default(),
            InstructionGenerator::default(),
            Arc::new(ContextStore::default()),
        )
    }
}

impl ScenarioOrchestrator {
    pub fn new(
        clustering: ClusteringEngine,
        generator: InstructionGenerator,
        store: Arc<ContextStore>,
    ) -> Self {
        Self {
            clustering,
            generator,
            store,
            metrics: None,
        }
    }

    /// Wire every component from settings. `backend` is the primary
    /// instruction backend, if any.
    pub fn from_settings(
        settings: &AdvisorSettings,
        backend: Option<Arc<dyn InstructionBackend>>,
    ) -> Self {
        let clustering = ClusteringEngine::new(UrgencyPolicy::from(&settings.urgency));
        let mut generator = InstructionGenerator::new(SafetyVerifier::default())
            .with_timeout(Duration::from_millis(settings.backend.timeout_ms));
        if let Some(backend) = backend {
            generator = generator.with_backend(backend);
        }
        let store = Arc::new(ContextStore::new(EvictionPolicy::from(&settings.context)));
        Self::new(clustering, generator, store)
    }

    /// Record metrics here and in the owned components.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.clustering.set_metrics(metrics.clone());
        self.generator.set_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn clustering(&self) -> &ClusteringEngine {
        &self.clustering
    }

    /// Pick the most urgent cluster and decide what, if anything, to say.
    ///
    /// `clusters` must already be sorted by descending urgency.
    pub async fn decide(&self, clusters: &[EventCluster]) -> DriverOutput {
        let output = match clusters.first() {
            None => DriverOutput::no_alerts(),
            Some(top) => match top.delivery_mode() {
                DeliveryMode::Silent => {
                    debug!(key = %top.key(), score = top.urgency_score(), "below visual threshold, logging only");
                    DriverOutput::logged()
                }
                DeliveryMode::Visual => DriverOutput::icon(top.event_type()),
                DeliveryMode::Voice => self.speak(top).await,
            },
        };

        if let Some(m) = &self.metrics {
            m.counter_inc("driver_outputs", &[("mode", output.mode.as_str())], 1);
            m.gauge_set("context_store_entries", &[], self.store.len() as f64);
        }
        output
    }

    async fn speak(&self, top: &EventCluster) -> DriverOutput {
        let key = top.key();
        let hint = self.store.context_hint(&key);
        let instruction = self
            .generator
            .generate(top, (!hint.is_empty()).then_some(hint))
            .await;

        if self.store.check_and_update(&key, &instruction.text) {
            info!(key = %key, source = %instruction.source, "repeat instruction suppressed");
            if let Some(m) = &self.metrics {
                m.counter_inc("instructions_suppressed", &[], 1);
            }
            return DriverOutput::suppressed();
        }

        info!(key = %key, source = %instruction.source, text = %instruction.text, "instruction spoken");
        DriverOutput::spoken(instruction.text)
    }

    /// Ingest, cluster and decide for one batch.
    #[instrument(skip_all, fields(batch = raws.len()))]
    pub async fn run_cycle(&self, raws: Vec<RawMessage>) -> Result<CycleReport, EngineError> {
        let ingest = self.clustering.ingest(raws);
        self.finish_cycle(ingest).await
    }

    /// [`run_cycle`](Self::run_cycle) for undecoded JSON messages.
    #[instrument(skip_all, fields(batch = values.len()))]
    pub async fn run_cycle_values(&self, values: Vec<Value>) -> Result<CycleReport, EngineError> {
        let ingest = self.clustering.ingest_values(values);
        self.finish_cycle(ingest).await
    }

    async fn finish_cycle(&self, ingest: IngestReport) -> Result<CycleReport, EngineError> {
        let cycle_id = CycleId::new();
        let clusters = self.clustering.cluster(&ingest.records)?;
        let output = self.decide(&clusters).await;
        debug!(
            cycle = %cycle_id,
            received = ingest.received,
            dropped = ingest.dropped,
            clusters = clusters.len(),
            mode = %output.mode,
            "cycle complete"
        );
        Ok(CycleReport {
            cycle_id,
            received: ingest.received,
            dropped: ingest.dropped,
            clusters,
            output,
        })
    }
}
