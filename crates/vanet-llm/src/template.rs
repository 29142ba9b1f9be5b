use async_trait::async_trait;

use vanet_core::backend::{InstructionBackend, InstructionRequest};
use vanet_core::cluster::EventCluster;
use vanet_core::errors::BackendError;
use vanet_core::message::EventType;

const UNVERIFIED_QUALIFIER: &str = " (Data unverified, exercise caution.)";

/// Fewer reports than this on a high-priority event marks the data unverified.
const CORROBORATION_REPORTS: usize = 3;

/// Fixed phrase for a cluster, with an uncertainty qualifier on thinly
/// corroborated high-priority events.
pub fn template_instruction(cluster: &EventCluster) -> String {
    let loc = cluster.location();
    let q = if cluster.report_count() < CORROBORATION_REPORTS && cluster.priority().get() > 3 {
        UNVERIFIED_QUALIFIER
    } else {
        ""
    };

    match cluster.event_type() {
        EventType::Accident => format!("Caution: Accident reported at {loc}.{q} Please slow down."),
        EventType::SlipperyRoad => format!("Advisory: Slippery road conditions at {loc}.{q}"),
        EventType::Congestion => format!("Traffic: Congestion at {loc}.{q}"),
        EventType::Normal => "System: nominal.".to_string(),
        other => format!("Notice: {other} at {loc}.{q}"),
    }
}

/// Deterministic backend that never fails. Ignores the context hint.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateBackend;

#[async_trait]
impl InstructionBackend for TemplateBackend {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, request: &InstructionRequest) -> Result<String, BackendError> {
        Ok(template_instruction(&request.cluster))
    }
}
