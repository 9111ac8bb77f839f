//! Ancestor, descendant and whole-tree queries over the annotation hierarchy.
//!
//! Every request runs against a single store snapshot. Downward expansion is
//! delegated to [`AnnotationSnapshot::recursive_fetch`] so a store can answer it
//! in one round trip. The upward walk to the true root is a plain loop bounded
//! by the depth of the tree.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use tracing::debug;

use crate::{
    error::{Result, TreeError},
    store::{AnnotationSnapshot, AnnotationStore, Seed},
    types::{NodeId, RawNode, TraversalMode, TraversalRequest},
};

/// Runs traversals against a store. Holds no state between calls.
pub struct TraversalEngine<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AnnotationStore + ?Sized> TraversalEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Runs the traversal described by `request`
    ///
    /// # Returns
    /// * `Result<Vec<RawNode>>` - The nodes in ascending id order, or `NodeNotFound`
    ///   if `request.root` does not exist
    pub async fn traverse(&self, request: TraversalRequest) -> Result<Vec<RawNode>> {
        let snapshot = self.store.snapshot().await?;
        let start = load(&*snapshot, request.root).await?;
        in_mode(&*snapshot, start, request.mode).await
    }

    /// Runs a traversal starting from a node the caller already holds, without looking it up again
    pub async fn traverse_from(&self, start: &RawNode, mode: TraversalMode) -> Result<Vec<RawNode>> {
        let snapshot = self.store.snapshot().await?;
        in_mode(&*snapshot, start.clone(), mode).await
    }

    /// Every node below `root_id`, excluding `root_id` itself, in ascending id order.
    pub async fn descendants(&self, root_id: NodeId) -> Result<Vec<RawNode>> {
        self.traverse(TraversalRequest {
            root: root_id,
            mode: TraversalMode::Descendants,
        })
        .await
    }

    /// The whole tree containing `node_id`, starting from its true root, in ascending id order.
    pub async fn full_tree(&self, node_id: NodeId) -> Result<Vec<RawNode>> {
        self.traverse(TraversalRequest {
            root: node_id,
            mode: TraversalMode::FullTree,
        })
        .await
    }

    /// The path from the true root down to `node_id`, plus every descendant of `node_id`,
    /// deduplicated and in ascending id order.
    pub async fn subtree(&self, node_id: NodeId) -> Result<Vec<RawNode>> {
        self.traverse(TraversalRequest {
            root: node_id,
            mode: TraversalMode::Subtree,
        })
        .await
    }

    /// Walks `parent_id` links upward from `node_id`.
    ///
    /// # Returns
    /// * `Result<Vec<RawNode>>` - `node_id` first and the true root last
    pub async fn ancestor_path(&self, node_id: NodeId) -> Result<Vec<RawNode>> {
        let snapshot = self.store.snapshot().await?;
        let start = load(&*snapshot, node_id).await?;
        walk_up(&*snapshot, start).await
    }

    /// The node reached by following `parent_id` upward from `node_id` until it is null
    pub async fn find_true_root(&self, node_id: NodeId) -> Result<RawNode> {
        let mut path = self.ancestor_path(node_id).await?;
        path.pop().ok_or(TreeError::NodeNotFound(node_id))
    }
}

async fn in_mode(
    snapshot: &dyn AnnotationSnapshot,
    start: RawNode,
    mode: TraversalMode,
) -> Result<Vec<RawNode>> {
    let node_id = start.id;
    match mode {
        TraversalMode::Descendants => {
            let nodes = snapshot.recursive_fetch(Seed::ChildrenOf(node_id)).await?;
            debug!(node_id, count = nodes.len(), "Fetched descendants");
            Ok(sorted_unique(nodes))
        }
        TraversalMode::FullTree => {
            let root_id = match walk_up(snapshot, start).await?.last() {
                Some(root) => root.id,
                None => node_id,
            };
            let nodes = snapshot.recursive_fetch(Seed::Node(root_id)).await?;
            debug!(node_id, root_id, count = nodes.len(), "Fetched full tree");
            Ok(sorted_unique(nodes))
        }
        TraversalMode::Subtree => {
            let ancestors = walk_up(snapshot, start).await?;
            let descendants = snapshot.recursive_fetch(Seed::ChildrenOf(node_id)).await?;
            debug!(
                node_id,
                ancestors = ancestors.len(),
                descendants = descendants.len(),
                "Fetched subtree"
            );
            Ok(sorted_unique(ancestors.into_iter().chain(descendants)))
        }
    }
}

/// Follows parent links from `start`, which is included, up to the true root
async fn walk_up(snapshot: &dyn AnnotationSnapshot, start: RawNode) -> Result<Vec<RawNode>> {
    let mut current = start;
    let mut visited = HashSet::from([current.id]);
    let mut path = Vec::new();

    while let Some(parent_id) = current.parent_id {
        if !visited.insert(parent_id) {
            return Err(TreeError::CycleDetected { node_id: parent_id });
        }
        let parent = snapshot
            .fetch_node(parent_id)
            .await?
            .ok_or(TreeError::DanglingParent {
                node_id: current.id,
                parent_id,
            })?;
        path.push(std::mem::replace(&mut current, parent));
    }
    path.push(current);

    Ok(path)
}

async fn load(snapshot: &dyn AnnotationSnapshot, id: NodeId) -> Result<RawNode> {
    snapshot
        .fetch_node(id)
        .await?
        .ok_or(TreeError::NodeNotFound(id))
}

/// Collapses duplicate ids and orders the result by ascending id
fn sorted_unique(nodes: impl IntoIterator<Item = RawNode>) -> Vec<RawNode> {
    nodes
        .into_iter()
        .map(|node| (node.id, node))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect()
}
