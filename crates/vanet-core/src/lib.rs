pub mod backend;
pub mod cluster;
pub mod errors;
pub mod ids;
pub mod message;
pub mod output;

pub use backend::{InstructionBackend, InstructionRequest};
pub use cluster::{ClusterKey, DeliveryMode, EventCluster};
pub use errors::{BackendError, ClusterError, MessageError};
pub use ids::{CycleId, MessageId};
pub use message::{EventType, MessageKind, MessageRecord, Priority, RawMessage};
pub use output::{Disposition, DriverOutput};
