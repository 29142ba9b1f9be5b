use vanet_core::errors::ClusterError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}
