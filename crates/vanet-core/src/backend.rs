use async_trait::async_trait;

use crate::cluster::EventCluster;
use crate::errors::BackendError;

/// Input to a text-generation backend for one cluster.
#[derive(Clone, Debug)]
pub struct InstructionRequest {
    pub cluster: EventCluster,
    /// Advisory from the context store, when this event was recently announced.
    pub context_hint: Option<String>,
}

impl InstructionRequest {
    pub fn new(cluster: EventCluster) -> Self {
        Self {
            cluster,
            context_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        self.context_hint = (!hint.is_empty()).then_some(hint);
        self
    }
}

/// Trait implemented by each instruction source (template policy, HTTP model, mocks).
#[async_trait]
pub trait InstructionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &InstructionRequest) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::DeliveryMode;
    use crate::ids::MessageId;
    use crate::message::{EventType, MessageRecord, Priority};

    struct Echo;

    #[async_trait]
    impl InstructionBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: &InstructionRequest) -> Result<String, BackendError> {
            Ok(format!(
                "{} {}",
                request.cluster.location(),
                request.context_hint.as_deref().unwrap_or("-")
            ))
        }
    }

    fn cluster() -> EventCluster {
        let m = MessageRecord::new(
            MessageId::from_raw("m1"),
            "t",
            EventType::Congestion,
            "KM_15",
            Priority::new(2).unwrap(),
        );
        EventCluster::from_members(&[&m], 37.0, DeliveryMode::Silent).unwrap()
    }

    #[test]
    fn empty_hint_is_dropped() {
        let req = InstructionRequest::new(cluster()).with_hint("");
        assert!(req.context_hint.is_none());
        let req = InstructionRequest::new(cluster()).with_hint("recently warned");
        assert_eq!(req.context_hint.as_deref(), Some("recently warned"));
    }

    #[tokio::test]
    async fn trait_object_dispatch() {
        let backend: Box<dyn InstructionBackend> = Box::new(Echo);
        let out = backend
            .generate(&InstructionRequest::new(cluster()).with_hint("seen"))
            .await
            .unwrap();
        assert_eq!(out, "KM_15 seen");
        assert_eq!(backend.name(), "echo");
    }
}
