pub mod clustering;
pub mod context_store;
pub mod error;
pub mod instruction;
pub mod orchestrator;
pub mod safety;
pub mod urgency;

pub use clustering::{ClusteringEngine, IngestReport};
pub use context_store::{ContextEntry, ContextStore, EvictionPolicy};
pub use error::EngineError;
pub use instruction::{Instruction, InstructionGenerator, InstructionSource};
pub use orchestrator::{CycleReport, ScenarioOrchestrator};
pub use safety::{SafetyOverride, SafetyVerifier};
pub use urgency::UrgencyPolicy;
