use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use vanet_core::cluster::{ClusterKey, EventCluster};
use vanet_core::errors::{ClusterError, MessageError};
use vanet_core::message::{MessageRecord, RawMessage};
use vanet_telemetry::MetricsRecorder;

use crate::urgency::UrgencyPolicy;

/// Outcome of turning one raw batch into validated records.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub records: Vec<MessageRecord>,
    pub received: usize,
    pub dropped: usize,
}

/// Groups messages by (event type, location) and scores each group.
pub struct ClusteringEngine {
    policy: UrgencyPolicy,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl Default for ClusteringEngine {
    fn default() -> Self {
        Self::new(UrgencyPolicy::default())
    }
}

impl ClusteringEngine {
    pub fn new(policy: UrgencyPolicy) -> Self {
        Self {
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn set_metrics(&mut self, metrics: Arc<MetricsRecorder>) {
        self.metrics = Some(metrics);
    }

    pub fn policy(&self) -> &UrgencyPolicy {
        &self.policy
    }

    /// Validate raw messages, dropping the malformed ones.
    pub fn ingest(&self, raws: Vec<RawMessage>) -> IngestReport {
        self.ingest_results(raws.into_iter().map(MessageRecord::try_from))
    }

    /// Like [`ingest`](Self::ingest), for undecoded JSON values. A value whose
    /// fields have the wrong types is dropped on its own.
    pub fn ingest_values(&self, values: Vec<Value>) -> IngestReport {
        self.ingest_results(
            values
                .into_iter()
                .map(|v| RawMessage::from_value(v).and_then(MessageRecord::try_from)),
        )
    }

    fn ingest_results(
        &self,
        results: impl Iterator<Item = Result<MessageRecord, MessageError>>,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        for result in results {
            report.received += 1;
            match result {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    report.dropped += 1;
                    warn!(error = %e, kind = e.error_kind(), "dropping malformed message");
                    self.count("messages_dropped", &[("reason", e.error_kind())], 1);
                }
            }
        }
        self.count("messages_received", &[], report.received as u64);
        report
    }

    /// One cluster per distinct key, sorted by descending urgency.
    ///
    /// Members keep input order and the first member represents the group.
    /// Equal scores keep the order in which their keys first appeared.
    pub fn cluster(&self, messages: &[MessageRecord]) -> Result<Vec<EventCluster>, ClusterError> {
        let mut index: HashMap<ClusterKey, usize> = HashMap::new();
        let mut groups: Vec<Vec<&MessageRecord>> = Vec::new();
        for message in messages {
            let slot = *index.entry(ClusterKey::of(message)).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(message);
        }

        let mut clusters = Vec::with_capacity(groups.len());
        for members in &groups {
            let Some(first) = members.first() else {
                continue;
            };
            let average_pdr = members.iter().map(|m| m.packet_delivery_ratio()).sum::<f64>()
                / members.len() as f64;
            let score = self.policy.score(first.priority(), members.len(), average_pdr);
            let mode = self.policy.classify(score);
            let cluster = EventCluster::from_members(members, score, mode)?;

            debug!(
                key = %cluster.key(),
                reports = cluster.report_count(),
                average_pdr,
                score,
                mode = %mode,
                "cluster formed"
            );
            if let Some(m) = &self.metrics {
                m.histogram_observe("urgency_score", &[], score);
            }
            clusters.push(cluster);
        }

        // stable: ties keep first-appearance order
        clusters.sort_by(|a, b| b.urgency_score().total_cmp(&a.urgency_score()));
        self.count("clusters_formed", &[], clusters.len() as u64);
        Ok(clusters)
    }

    fn count(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        if let Some(m) = &self.metrics {
            m.counter_inc(name, labels, n);
        }
    }
}
