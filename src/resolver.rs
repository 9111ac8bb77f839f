//! Field resolvers for annotation trees and document annotation listings.
//!
//! Client input errors are returned to the caller. Any other failure is logged
//! and the field resolves to an empty list, so one broken field never fails a
//! whole response.

use std::{future::Future, sync::Arc};

use tracing::{debug, info_span, warn, Instrument};

use crate::{
    codec,
    config::Config,
    error::{Result, TreeError},
    store::AnnotationStore,
    traversal::TraversalEngine,
    tree,
    types::{
        AnalysisFilter, AnnotationFilter, AnnotationNode, AnnotationRecord, NodeId, RawNode,
        TraversalMode, TraversalRequest, UserId,
    },
};

/// Tag of external corpus ids
pub const CORPUS_TAG: &str = "Corpus";
/// Tag of external analysis ids
pub const ANALYSIS_TAG: &str = "Analysis";
/// Analysis argument selecting annotations that belong to no analysis
pub const NO_ANALYSIS: &str = "__none__";

/// Resolves tree-shaped fields of annotations
pub struct AnnotationResolver<S: ?Sized> {
    store: Arc<S>,
    engine: TraversalEngine<S>,
    config: Config,
}

impl<S: AnnotationStore + ?Sized> AnnotationResolver<S> {
    pub fn new(store: Arc<S>, config: Config) -> Self {
        Self {
            engine: TraversalEngine::new(store.clone()),
            store,
            config,
        }
    }

    /// Descendants of an already loaded annotation, each with its direct children's ids
    pub async fn descendants_tree(&self, annotation: &RawNode) -> Result<Vec<AnnotationNode>> {
        self.resolve_from(annotation, TraversalMode::Descendants).await
    }

    /// Whole tree an annotation belongs to, from its root ancestor down
    pub async fn full_tree(&self, annotation: &RawNode) -> Result<Vec<AnnotationNode>> {
        self.resolve_from(annotation, TraversalMode::FullTree).await
    }

    /// Path from the root ancestor to an annotation, plus the annotation's descendants
    pub async fn subtree(&self, annotation: &RawNode) -> Result<Vec<AnnotationNode>> {
        self.resolve_from(annotation, TraversalMode::Subtree).await
    }

    /// Resolves a tree for an annotation addressed by its external id
    pub async fn resolve_tree(
        &self,
        external_id: &str,
        mode: TraversalMode,
    ) -> Result<Vec<AnnotationNode>> {
        let root_id = codec::decode_as(external_id, &self.config.type_tag)?;
        self.resolve(root_id, mode).await
    }

    /// Runs one traversal from a stored node and flattens it.
    ///
    /// # Returns
    /// * `Result<Vec<AnnotationNode>>` - The flattened tree; empty if the store failed,
    ///   `NodeNotFound` if `root_id` does not exist
    pub async fn resolve(&self, root_id: NodeId, mode: TraversalMode) -> Result<Vec<AnnotationNode>> {
        let request = TraversalRequest { root: root_id, mode };
        self.flatten_or_empty(root_id, mode, self.engine.traverse(request))
            .await
    }

    /// Same as [`resolve`](Self::resolve), starting from a node the caller already loaded
    pub async fn resolve_from(
        &self,
        annotation: &RawNode,
        mode: TraversalMode,
    ) -> Result<Vec<AnnotationNode>> {
        self.flatten_or_empty(annotation.id, mode, self.engine.traverse_from(annotation, mode))
            .await
    }

    async fn flatten_or_empty(
        &self,
        root_id: NodeId,
        mode: TraversalMode,
        traversal: impl Future<Output = Result<Vec<RawNode>>>,
    ) -> Result<Vec<AnnotationNode>> {
        let span = info_span!("resolve_tree", root_id, mode = %mode);

        async move {
            match self.bounded(traversal).await {
                Ok(nodes) => {
                    debug!(count = nodes.len(), "Traversal complete");
                    Ok(tree::flatten(&nodes, &self.config.type_tag))
                }
                Err(e) if e.is_client_error() => Err(e),
                Err(e) => {
                    warn!(
                        root_id,
                        mode = %mode,
                        timeout = ?self.config.query_timeout,
                        error = %e,
                        "Failed resolving tree, returning empty list"
                    );
                    Ok(Vec::new())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn bounded(
        &self,
        traversal: impl Future<Output = Result<Vec<RawNode>>>,
    ) -> Result<Vec<RawNode>> {
        match self.config.query_timeout {
            Some(limit) => tokio::time::timeout(limit, traversal)
                .await
                .map_err(|_| TreeError::Timeout(limit))?,
            None => traversal.await,
        }
    }

    /// Annotations of a document within a corpus, optionally narrowed by analysis and
    /// structural flag, limited to what `user` can see.
    ///
    /// Never fails: bad input or store errors are logged and yield an empty list.
    pub async fn all_annotations(
        &self,
        document_id: NodeId,
        corpus_id: &str,
        analysis_id: Option<&str>,
        is_structural: Option<bool>,
        user: Option<UserId>,
    ) -> Vec<AnnotationRecord> {
        let result = match build_filter(corpus_id, analysis_id, is_structural) {
            Ok(filter) => {
                self.store
                    .annotations_for_document(document_id, &filter, user)
                    .await
            }
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            warn!(
                document_id,
                corpus_id,
                analysis_id = ?analysis_id,
                is_structural = ?is_structural,
                error = %e,
                "Failed resolving annotations for document"
            );
            Vec::new()
        })
    }
}

/// Turns the external listing arguments into a store filter
pub fn build_filter(
    corpus_id: &str,
    analysis_id: Option<&str>,
    is_structural: Option<bool>,
) -> Result<AnnotationFilter> {
    let analysis = match analysis_id {
        None => AnalysisFilter::Any,
        Some(NO_ANALYSIS) => AnalysisFilter::Unset,
        Some(id) => AnalysisFilter::Id(codec::decode_as(id, ANALYSIS_TAG)?),
    };

    Ok(AnnotationFilter {
        corpus_id: codec::decode_as(corpus_id, CORPUS_TAG)?,
        analysis,
        structural: is_structural,
    })
}
