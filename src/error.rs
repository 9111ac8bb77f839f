use std::time::Duration;

use thiserror::Error;

use crate::types::NodeId;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Annotation not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("Annotation {node_id} points at missing parent {parent_id}")]
    DanglingParent { node_id: NodeId, parent_id: NodeId },

    #[error("Cycle detected in parent relation at node {node_id}")]
    CycleDetected { node_id: NodeId },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid environment variable value: {0}")]
    InvalidEnvVar(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TreeError {
    /// Errors caused by the caller's input rather than by the backing store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TreeError::NodeNotFound(_) | TreeError::MalformedIdentifier(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
