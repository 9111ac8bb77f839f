//! Storage collaborator interface.
//!
//! A traversal opens one [`AnnotationSnapshot`] through
//! [`AnnotationStore::snapshot`] and performs every read of the request against
//! it, so concurrent writes can never tear a single result.

pub mod memory;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::{
    error::{Result, TreeError},
    types::{AnnotationFilter, AnnotationRecord, NodeId, RawNode, UserId},
};

pub use self::memory::{MemorySnapshot, MemoryStore};

/// Initial row set of a recursive fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    /// Start from the direct children of this node; the node itself is not returned
    ChildrenOf(NodeId),
    /// Start from this node itself
    Node(NodeId),
}

impl Seed {
    pub fn node_id(&self) -> NodeId {
        match self {
            Seed::ChildrenOf(id) | Seed::Node(id) => *id,
        }
    }
}

/// Consistent read-only view of the annotation population.
/// All reads through one snapshot observe the same state.
#[async_trait]
pub trait AnnotationSnapshot: Send + Sync {
    /// Fetches a single node, `None` when it does not exist
    async fn fetch_node(&self, id: NodeId) -> Result<Option<RawNode>>;

    /// Fetches the direct children of every id in `parent_ids` in one batch
    async fn fetch_children(&self, parent_ids: &[NodeId]) -> Result<Vec<RawNode>>;

    /// Fetches the seed rows and, recursively, every row whose `parent_id`
    /// equals the id of a row already fetched.
    ///
    /// The default expands one layer per [`fetch_children`](Self::fetch_children)
    /// call. Stores able to run the recursion server-side should override this
    /// with a single round trip.
    async fn recursive_fetch(&self, seed: Seed) -> Result<Vec<RawNode>> {
        let mut seen = HashSet::from([seed.node_id()]);
        let mut fetched = Vec::new();

        if let Seed::Node(id) = seed {
            match self.fetch_node(id).await? {
                Some(node) => fetched.push(node),
                None => return Ok(fetched),
            }
        }

        let mut frontier = vec![seed.node_id()];
        while !frontier.is_empty() {
            let layer = self.fetch_children(&frontier).await?;
            frontier = Vec::with_capacity(layer.len());
            for node in layer {
                if !seen.insert(node.id) {
                    return Err(TreeError::CycleDetected { node_id: node.id });
                }
                frontier.push(node.id);
                fetched.push(node);
            }
        }

        Ok(fetched)
    }
}

/// Access to the annotation population.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Opens a read snapshot that stays consistent for as long as it is held
    async fn snapshot(&self) -> Result<Box<dyn AnnotationSnapshot + '_>>;

    /// Lists the annotations of a document that match `filter` and are visible to `user`,
    /// ordered by ascending id
    async fn annotations_for_document(
        &self,
        document_id: NodeId,
        filter: &AnnotationFilter,
        user: Option<UserId>,
    ) -> Result<Vec<AnnotationRecord>>;
}
